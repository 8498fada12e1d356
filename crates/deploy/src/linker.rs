//! Library linking.
//!
//! Libraries are resolved through the [`AddressRegistry`], so a library can
//! only be linked once the step that deployed it has completed.

use std::collections::{BTreeMap, BTreeSet};

use alloy_core::primitives::{Address, Bytes};

use crate::{AddressRegistry, artifacts::Artifact, error::DeployError};

/// Creation bytecode with every library placeholder filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedBytecode {
    pub bytecode: Bytes,
    pub libraries: BTreeMap<String, Address>,
}

pub struct LibraryLinker<'a> {
    registry: &'a AddressRegistry,
}

impl<'a> LibraryLinker<'a> {
    pub fn new(registry: &'a AddressRegistry) -> Self {
        Self { registry }
    }

    /// Map each required library of `contract` to its deployed address.
    pub fn resolve_libraries<'n>(
        &self,
        contract: &str,
        required: impl IntoIterator<Item = &'n str>,
    ) -> Result<BTreeMap<String, Address>, DeployError> {
        required
            .into_iter()
            .map(|library| {
                self.registry
                    .address(library)
                    .map(|address| (library.to_string(), address))
                    .map_err(|_| DeployError::UnresolvedLibrary {
                        contract: contract.to_string(),
                        library: library.to_string(),
                    })
            })
            .collect()
    }

    /// Link `artifact` for the deployment named `contract`.
    ///
    /// `declared` lists libraries the plan expects; the artifact's own link
    /// references are always honoured as well.
    pub fn link(
        &self,
        contract: &str,
        artifact: &Artifact,
        declared: &[String],
    ) -> Result<LinkedBytecode, DeployError> {
        let required: BTreeSet<&str> = declared
            .iter()
            .map(String::as_str)
            .chain(artifact.required_libraries())
            .collect();
        let libraries = self.resolve_libraries(contract, required)?;

        let malformed = |reason: String| DeployError::InvalidArguments {
            signature: format!("bytecode of {}", artifact.contract_name),
            reason,
        };

        let mut code = artifact
            .bytecode
            .trim_start_matches("0x")
            .as_bytes()
            .to_vec();
        for (library, address) in &libraries {
            let replacement = hex::encode(address);
            for offset in artifact.offsets(library) {
                let start = offset.start * 2;
                let end = (offset.start + offset.length) * 2;
                if end > code.len() || offset.length != 20 {
                    return Err(malformed(format!(
                        "link reference for {library} at byte {} is out of range",
                        offset.start
                    )));
                }
                code[start..end].copy_from_slice(replacement.as_bytes());
            }
        }

        let code = String::from_utf8(code).map_err(|e| malformed(e.to_string()))?;
        if let Some(position) = code.find("__$") {
            return Err(malformed(format!(
                "unlinked placeholder left at byte {}",
                position / 2
            )));
        }
        let bytecode = hex::decode(&code).map_err(|e| malformed(e.to_string()))?;

        Ok(LinkedBytecode {
            bytecode: bytecode.into(),
            libraries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeploymentRecord;

    fn registry_with(names: &[&str]) -> AddressRegistry {
        let mut registry = AddressRegistry::default();
        for (i, name) in names.iter().enumerate() {
            registry
                .register(DeploymentRecord::plain(*name, *name, Address::with_last_byte(0x10 + i as u8)))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_link_fills_placeholders() {
        let registry = registry_with(&["ReserveLogic", "GenericLogic", "ValidationLogic"]);
        let artifact = Artifact::placeholder("LendingPool", &["ValidationLogic", "ReserveLogic"]);

        let linked = LibraryLinker::new(&registry)
            .link("LendingPoolImpl", &artifact, &[])
            .unwrap();

        assert_eq!(linked.libraries.len(), 2);
        let validation = registry.address("ValidationLogic").unwrap();
        let reserve = registry.address("ReserveLogic").unwrap();
        assert_eq!(&linked.bytecode[5..25], validation.as_slice());
        assert_eq!(&linked.bytecode[25..45], reserve.as_slice());
    }

    #[test]
    fn test_unresolved_library_before_deployment() {
        let registry = registry_with(&["ReserveLogic"]);
        let artifact = Artifact::placeholder("ValidationLogic", &["GenericLogic"]);

        let err = LibraryLinker::new(&registry)
            .link("ValidationLogic", &artifact, &[])
            .unwrap_err();
        assert!(
            matches!(&err, DeployError::UnresolvedLibrary { contract, library }
                if contract == "ValidationLogic" && library == "GenericLogic"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_resolution_is_monotonic() {
        let mut registry = registry_with(&["GenericLogic"]);
        let linker_before = LibraryLinker::new(&registry)
            .resolve_libraries("ValidationLogic", ["GenericLogic"])
            .unwrap();

        registry
            .register(DeploymentRecord::plain("ReserveLogic", "ReserveLogic", Address::with_last_byte(0x99)))
            .unwrap();
        let linker_after = LibraryLinker::new(&registry)
            .resolve_libraries("ValidationLogic", ["GenericLogic"])
            .unwrap();

        assert_eq!(
            linker_before, linker_after,
            "later registrations must not change earlier resolutions"
        );
    }

    #[test]
    fn test_declared_library_must_exist_even_without_reference() {
        let registry = registry_with(&[]);
        let artifact = Artifact::placeholder("LendingPool", &[]);

        let err = LibraryLinker::new(&registry)
            .link("LendingPoolImpl", &artifact, &["ReserveLogic".to_string()])
            .unwrap_err();
        assert!(matches!(err, DeployError::UnresolvedLibrary { .. }));
    }

    #[test]
    fn test_plain_contract_links_unchanged() {
        let registry = registry_with(&[]);
        let artifact = Artifact::placeholder("MFDstats", &[]);
        let linked = LibraryLinker::new(&registry)
            .link("MFDstats", &artifact, &[])
            .unwrap();
        assert_eq!(linked.bytecode.to_vec(), hex::decode("608060405200").unwrap());
        assert!(linked.libraries.is_empty());
    }
}
