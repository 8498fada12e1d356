//! Typed call arguments and calldata encoding.
//!
//! Plan steps describe arguments symbolically ([`Arg::Contract`],
//! [`Arg::Deployer`], [`Arg::Treasury`]); they are bound to concrete addresses
//! right before the transaction that needs them, once the referenced contract
//! has been registered.

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue},
    primitives::{Address, Bytes, I256, U256, keccak256},
};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::{AddressRegistry, error::DeployError, network::Accounts};

/// One ether (10^18) in wei.
pub fn wad() -> U256 {
    U256::from(10u64).pow(U256::from(18))
}

/// One ray (10^27), the fixed-point unit of interest rates.
pub fn ray() -> U256 {
    U256::from(10u64).pow(U256::from(27))
}

/// `amount` whole tokens with 18 decimals.
pub fn ether(amount: u64) -> U256 {
    U256::from(amount) * wad()
}

/// `percent`% of one ray, e.g. `ray_percent(90)` is 0.9 ray.
pub fn ray_percent(percent: u64) -> U256 {
    U256::from(percent) * U256::from(10u64).pow(U256::from(25))
}

/// An ABI value as written in a deployment plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    Address(Address),
    /// Address of a contract registered earlier in the run.
    Contract(String),
    /// The deploying account.
    Deployer,
    /// The account receiving liquidation fees.
    Treasury,
    Uint { value: U256, bits: usize },
    Int { value: I256, bits: usize },
    Bool(bool),
    String(String),
    Bytes(Bytes),
    Array(Vec<Arg>),
    Tuple(Vec<Arg>),
}

impl Arg {
    pub fn contract(name: impl Into<String>) -> Self {
        Self::Contract(name.into())
    }

    pub fn uint(value: U256) -> Self {
        Self::Uint { value, bits: 256 }
    }

    pub fn u64(value: u64) -> Self {
        Self::uint(U256::from(value))
    }

    pub fn uint8(value: u8) -> Self {
        Self::Uint {
            value: U256::from(value),
            bits: 8,
        }
    }

    pub fn int(value: i64) -> Self {
        let magnitude = I256::from_raw(U256::from(value.unsigned_abs()));
        Self::Int {
            value: if value < 0 { -magnitude } else { magnitude },
            bits: 256,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// An `address[]` of registered contracts.
    pub fn contracts<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(names.into_iter().map(Self::contract).collect())
    }

    pub fn empty_array() -> Self {
        Self::Array(Vec::new())
    }

    /// Names of the contracts this argument refers to, in order of appearance.
    pub fn references(&self) -> Vec<&str> {
        match self {
            Self::Contract(name) => vec![name.as_str()],
            Self::Array(items) | Self::Tuple(items) => {
                items.iter().flat_map(Self::references).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Replace every symbolic reference with a concrete address.
    pub fn bind(&self, bindings: &Bindings<'_>) -> Result<Self, DeployError> {
        Ok(match self {
            Self::Contract(name) => Self::Address(bindings.registry.address(name)?),
            Self::Deployer => Self::Address(bindings.accounts.deployer),
            Self::Treasury => Self::Address(bindings.accounts.treasury),
            Self::Array(items) => Self::Array(bind_all(items, bindings)?),
            Self::Tuple(items) => Self::Tuple(bind_all(items, bindings)?),
            other => other.clone(),
        })
    }

    /// Convert a bound argument to its ABI value.
    pub fn to_sol_value(&self) -> Result<DynSolValue, DeployError> {
        Ok(match self {
            Self::Address(address) => DynSolValue::Address(*address),
            Self::Uint { value, bits } => DynSolValue::Uint(*value, *bits),
            Self::Int { value, bits } => DynSolValue::Int(*value, *bits),
            Self::Bool(value) => DynSolValue::Bool(*value),
            Self::String(value) => DynSolValue::String(value.clone()),
            Self::Bytes(value) => DynSolValue::Bytes(value.to_vec()),
            Self::Array(items) => DynSolValue::Array(to_sol_values(items)?),
            Self::Tuple(items) => DynSolValue::Tuple(to_sol_values(items)?),
            Self::Contract(_) | Self::Deployer | Self::Treasury => {
                return Err(DeployError::InvalidArguments {
                    signature: String::new(),
                    reason: format!("unbound symbolic argument {self:?}"),
                });
            }
        })
    }
}

/// What symbolic arguments are bound against.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub registry: &'a AddressRegistry,
    pub accounts: &'a Accounts,
}

pub fn bind_all(args: &[Arg], bindings: &Bindings<'_>) -> Result<Vec<Arg>, DeployError> {
    args.iter().map(|arg| arg.bind(bindings)).collect()
}

fn to_sol_values(args: &[Arg]) -> Result<Vec<DynSolValue>, DeployError> {
    args.iter().map(Arg::to_sol_value).collect()
}

/// The 4-byte selector of a canonical function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encode a call to `signature` with already bound arguments.
///
/// The arguments are checked against the parameter list of the signature.
pub fn encode_call(signature: &str, args: &[Arg]) -> Result<Bytes, DeployError> {
    let invalid = |reason: String| DeployError::InvalidArguments {
        signature: signature.to_string(),
        reason,
    };

    let params = signature
        .find('(')
        .map(|open| &signature[open..])
        .filter(|params| params.ends_with(')'))
        .ok_or_else(|| invalid("not a canonical function signature".to_string()))?;

    let mut data = selector(signature).to_vec();
    if params == "()" {
        if !args.is_empty() {
            return Err(invalid(format!("expected no arguments, got {}", args.len())));
        }
        return Ok(data.into());
    }

    let expected = DynSolType::parse(params).map_err(|e| invalid(e.to_string()))?;
    let values = DynSolValue::Tuple(
        args.iter()
            .map(Arg::to_sol_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.to_string()))?,
    );
    if !expected.matches(&values) {
        return Err(invalid(format!("arguments do not match {params}")));
    }

    data.extend(values.abi_encode_params());
    Ok(data.into())
}

/// ABI-encode constructor arguments, to be appended to the creation bytecode.
pub fn encode_constructor(args: &[Arg]) -> Result<Bytes, DeployError> {
    if args.is_empty() {
        return Ok(Bytes::new());
    }
    Ok(DynSolValue::Tuple(to_sol_values(args)?)
        .abi_encode_params()
        .into())
}

/// Decode a single `address` return value.
pub fn decode_address(data: &[u8]) -> Result<Address, String> {
    DynSolType::Address
        .abi_decode(data)
        .map_err(|e| e.to_string())?
        .as_address()
        .ok_or_else(|| "return value is not an address".to_string())
}

/// A state-mutating call on a registered contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSpec {
    /// Logical name of the contract receiving the call.
    pub target: String,
    /// Canonical signature, e.g. `setPoolAdmin(address)`.
    pub method: String,
    pub args: Vec<Arg>,
}

impl CallSpec {
    pub fn new(target: impl Into<String>, method: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            args,
        }
    }

    /// A call whose signature is taken from a `sol!` binding.
    pub fn of<C: SolCall>(target: impl Into<String>, args: Vec<Arg>) -> Self {
        Self::new(target, C::SIGNATURE, args)
    }

    /// Every contract name this call depends on, target included.
    pub fn references(&self) -> Vec<&str> {
        std::iter::once(self.target.as_str())
            .chain(self.args.iter().flat_map(Arg::references))
            .collect()
    }

    /// Resolve the target address and encode the calldata.
    pub fn encode(&self, bindings: &Bindings<'_>) -> Result<(Address, Bytes), DeployError> {
        let to = bindings.registry.address(&self.target)?;
        let data = encode_call(&self.method, &bind_all(&self.args, bindings)?)?;
        Ok((to, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_selector_matches_known_value() {
        assert_eq!(
            selector("transfer(address,uint256)"),
            [0xa9, 0x05, 0x9c, 0xbb]
        );
    }

    #[test]
    fn test_fixed_point_values_are_exact() {
        assert_eq!(
            ray_percent(90),
            U256::from_str("900000000000000000000000000").unwrap()
        );
        assert_eq!(
            ray_percent(4),
            U256::from_str("40000000000000000000000000").unwrap()
        );
        assert_eq!(ray_percent(100), ray());
        assert_eq!(
            ether(2000),
            U256::from_str("2000000000000000000000").unwrap()
        );
    }

    #[test]
    fn test_encode_call_layout() {
        let owner = Address::with_last_byte(7);
        let data = encode_call("transferOwnership(address)", &[Arg::Address(owner)]).unwrap();

        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &selector("transferOwnership(address)"));
        assert_eq!(&data[16..], owner.as_slice());
    }

    #[test]
    fn test_encode_call_without_parameters() {
        let data = encode_call("mint()", &[]).unwrap();
        assert_eq!(data.len(), 4);

        let err = encode_call("mint()", &[Arg::u64(1)]).unwrap_err();
        assert!(matches!(err, DeployError::InvalidArguments { .. }));
    }

    #[test]
    fn test_encode_call_rejects_mismatched_arguments() {
        let err = encode_call("setPoolAdmin(address)", &[Arg::u64(1)]).unwrap_err();
        assert!(
            matches!(err, DeployError::InvalidArguments { ref signature, .. } if signature == "setPoolAdmin(address)"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_encode_call_accepts_empty_arrays() {
        let oracle = Address::with_last_byte(3);
        let data = encode_call(
            "setOracleBorrowRates(address[],uint256[],address)",
            &[Arg::empty_array(), Arg::empty_array(), Arg::Address(oracle)],
        )
        .unwrap();
        // Two offsets, the address, then two zero lengths.
        assert_eq!(data.len(), 4 + 5 * 32);
    }

    #[test]
    fn test_unbound_argument_cannot_be_encoded() {
        let err = encode_call("setPoolAdmin(address)", &[Arg::Deployer]).unwrap_err();
        assert!(matches!(err, DeployError::InvalidArguments { .. }));
    }

    #[test]
    fn test_bind_resolves_symbols() {
        let mut registry = AddressRegistry::default();
        let oracle = Address::with_last_byte(9);
        registry
            .register(crate::DeploymentRecord::plain("AaveOracle", "AaveOracle", oracle))
            .unwrap();
        let accounts = Accounts {
            deployer: Address::with_last_byte(1),
            treasury: Address::with_last_byte(2),
        };
        let bindings = Bindings {
            registry: &registry,
            accounts: &accounts,
        };

        let bound = Arg::Array(vec![Arg::contract("AaveOracle"), Arg::Deployer, Arg::Treasury])
            .bind(&bindings)
            .unwrap();
        assert_eq!(
            bound,
            Arg::Array(vec![
                Arg::Address(oracle),
                Arg::Address(accounts.deployer),
                Arg::Address(accounts.treasury),
            ])
        );

        let err = Arg::contract("LendingRateOracle").bind(&bindings).unwrap_err();
        assert!(matches!(err, DeployError::UnknownName(name) if name == "LendingRateOracle"));
    }

    #[test]
    fn test_negative_int() {
        assert_eq!(
            Arg::int(-5),
            Arg::Int {
                value: -I256::from_raw(U256::from(5u64)),
                bits: 256
            }
        );
    }

    #[test]
    fn test_references_are_collected_recursively() {
        let call = CallSpec::new(
            "MiddleFeeDistribution",
            "setMinters(address[])",
            vec![Arg::contracts(["ChefIncentivesController", "MerkleDistributor"])],
        );
        assert_eq!(
            call.references(),
            vec![
                "MiddleFeeDistribution",
                "ChefIncentivesController",
                "MerkleDistributor"
            ]
        );
    }
}
