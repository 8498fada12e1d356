//! Compiled contract artifacts.
//!
//! Artifacts are read from a Hardhat `artifacts/` tree. Bytecode that links
//! against external libraries contains `__$<34 hex>$__` placeholders whose
//! byte ranges are listed under `linkReferences`.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use alloy_core::primitives::keccak256;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::DeployError;

/// Byte range of a library placeholder inside creation bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOffset {
    pub start: usize,
    pub length: usize,
}

/// A compiled contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    /// Hex creation bytecode, possibly containing library placeholders.
    pub bytecode: String,
    /// Source file -> library name -> placeholder offsets.
    #[serde(default)]
    pub link_references: BTreeMap<String, BTreeMap<String, Vec<LinkOffset>>>,
}

impl Artifact {
    /// Library names the bytecode has to be linked against.
    pub fn required_libraries(&self) -> impl Iterator<Item = &str> {
        self.link_references
            .values()
            .flat_map(|libraries| libraries.keys().map(String::as_str))
    }

    /// Placeholder offsets for `library`, across all source files.
    pub fn offsets(&self, library: &str) -> Vec<LinkOffset> {
        self.link_references
            .values()
            .filter_map(|libraries| libraries.get(library))
            .flatten()
            .copied()
            .collect()
    }

    /// A stand-in artifact: a short prefix followed by one placeholder per
    /// library, laid out the way the compiler lays them out.
    pub fn placeholder(contract: &str, libraries: &[&str]) -> Self {
        const PREFIX: &str = "6080604052";

        let mut bytecode = format!("0x{PREFIX}");
        let mut references = BTreeMap::new();
        for (i, library) in libraries.iter().enumerate() {
            let hash = hex::encode(&keccak256(format!("contracts/{library}.sol:{library}"))[..17]);
            bytecode.push_str(&format!("__${hash}$__"));
            references.insert(
                library.to_string(),
                vec![LinkOffset {
                    start: PREFIX.len() / 2 + i * 20,
                    length: 20,
                }],
            );
        }
        // Trailing STOP so the code is never empty.
        bytecode.push_str("00");

        let mut link_references = BTreeMap::new();
        if !references.is_empty() {
            link_references.insert(format!("contracts/{contract}.sol"), references);
        }

        Self {
            contract_name: contract.to_string(),
            bytecode,
            link_references,
        }
    }
}

/// Artifacts indexed by contract name.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    artifacts: HashMap<String, Artifact>,
}

impl ArtifactStore {
    /// Load every artifact below `root`. Debug files (`*.dbg.json`) and JSON
    /// files that are not artifacts are skipped.
    pub fn load_dir(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("Artifacts directory not found: {}", root.display());
        }

        let mut store = Self::default();
        store.load_recursive(root)?;
        tracing::info!(
            path = %root.display(),
            count = store.len(),
            "Loaded contract artifacts"
        );
        Ok(store)
    }

    fn load_recursive(&mut self, dir: &Path) -> Result<()> {
        let entries =
            std::fs::read_dir(dir).context(format!("Failed to read {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                self.load_recursive(&path)?;
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !file_name.ends_with(".json") || file_name.ends_with(".dbg.json") {
                continue;
            }

            let content = std::fs::read_to_string(&path)
                .context(format!("Failed to read {}", path.display()))?;
            let Ok(artifact) = serde_json::from_str::<Artifact>(&content) else {
                tracing::debug!(path = %path.display(), "Skipping non-artifact JSON file");
                continue;
            };

            if self.artifacts.contains_key(&artifact.contract_name) {
                tracing::warn!(
                    contract = %artifact.contract_name,
                    path = %path.display(),
                    "Duplicate artifact name, keeping the first one"
                );
                continue;
            }
            self.insert(artifact);
        }
        Ok(())
    }

    /// Placeholder artifacts for every contract name, for dry runs.
    pub fn placeholders<'a>(contracts: impl IntoIterator<Item = (&'a str, Vec<&'a str>)>) -> Self {
        let mut store = Self::default();
        for (contract, libraries) in contracts {
            store.insert(Artifact::placeholder(contract, &libraries));
        }
        store
    }

    pub fn insert(&mut self, artifact: Artifact) {
        self.artifacts
            .insert(artifact.contract_name.clone(), artifact);
    }

    pub fn get(&self, contract: &str) -> Result<&Artifact, DeployError> {
        self.artifacts
            .get(contract)
            .ok_or_else(|| DeployError::MissingArtifact(contract.to_string()))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const VALIDATION_LOGIC: &str = r#"{
        "_format": "hh-sol-artifact-1",
        "contractName": "ValidationLogic",
        "sourceName": "contracts/protocol/libraries/logic/ValidationLogic.sol",
        "abi": [],
        "bytecode": "0x6080__$2a8a5d3d7e1a3a0b9b1c1f4c9d8f7e6a5b$__00",
        "deployedBytecode": "0x",
        "linkReferences": {
            "contracts/protocol/libraries/logic/GenericLogic.sol": {
                "GenericLogic": [{ "length": 20, "start": 2 }]
            }
        },
        "deployedLinkReferences": {}
    }"#;

    #[test]
    fn test_parse_hardhat_artifact() {
        let artifact: Artifact = serde_json::from_str(VALIDATION_LOGIC).unwrap();
        assert_eq!(artifact.contract_name, "ValidationLogic");
        assert_eq!(
            artifact.required_libraries().collect::<Vec<_>>(),
            vec!["GenericLogic"]
        );
        assert_eq!(
            artifact.offsets("GenericLogic"),
            vec![LinkOffset {
                start: 2,
                length: 20
            }]
        );
    }

    #[test]
    fn test_load_dir_skips_debug_files() {
        let dir = TempDir::new("artifacts").unwrap();
        let nested = dir.path().join("contracts/ValidationLogic.sol");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("ValidationLogic.json"), VALIDATION_LOGIC).unwrap();
        std::fs::write(
            nested.join("ValidationLogic.dbg.json"),
            r#"{"_format":"hh-sol-dbg-1","buildInfo":"../../build-info/x.json"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.json"), r#"{"hello":"world"}"#).unwrap();

        let store = ArtifactStore::load_dir(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("ValidationLogic").is_ok());
        assert!(matches!(
            store.get("GenericLogic"),
            Err(DeployError::MissingArtifact(_))
        ));
    }

    #[test]
    fn test_load_missing_dir_fails() {
        assert!(ArtifactStore::load_dir(Path::new("/definitely/not/here")).is_err());
    }

    #[test]
    fn test_placeholder_layout() {
        let artifact = Artifact::placeholder("LendingPool", &["ValidationLogic", "ReserveLogic"]);
        let hex = artifact.bytecode.trim_start_matches("0x");

        for library in ["ValidationLogic", "ReserveLogic"] {
            let offsets = artifact.offsets(library);
            assert_eq!(offsets.len(), 1);
            let LinkOffset { start, length } = offsets[0];
            let slot = &hex[start * 2..(start + length) * 2];
            assert!(slot.starts_with("__$") && slot.ends_with("$__"), "slot: {slot}");
        }
    }
}
