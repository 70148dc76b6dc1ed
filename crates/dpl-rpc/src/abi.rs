//! Constructor argument encoding.
//!
//! Values arrive as JSON (step-file literals plus resolved reference addresses)
//! and are coerced against the constructor inputs of the artifact's ABI.

use alloy_dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy_json_abi::JsonAbi;
use alloy_primitives::Address;
use dpl_core::CompiledContract;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AbiError {
    #[error("malformed abi: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("constructor takes {expected} argument(s), got {got}")]
    ArityMismatch { expected: usize, got: usize },
    #[error("invalid value for `{ty}`: {value} ({reason})")]
    InvalidValue { ty: String, value: String, reason: String },
    #[error(transparent)]
    Encode(#[from] alloy_dyn_abi::Error),
}

/// ABI-encoded constructor arguments, without the creation code.
pub fn encode_constructor(abi: &Value, args: &[Value]) -> Result<Vec<u8>, AbiError> {
    let abi: JsonAbi = serde_json::from_value(abi.clone())?;
    let Some(constructor) = abi.constructor() else {
        if args.is_empty() {
            return Ok(Vec::new());
        }
        return Err(AbiError::ArityMismatch { expected: 0, got: args.len() });
    };
    if constructor.inputs.len() != args.len() {
        return Err(AbiError::ArityMismatch { expected: constructor.inputs.len(), got: args.len() });
    }
    let values = constructor
        .inputs
        .iter()
        .zip(args)
        .map(|(param, arg)| coerce(&param.resolve()?, arg))
        .collect::<Result<Vec<_>, AbiError>>()?;
    Ok(constructor.abi_encode_input(&values)?)
}

/// Creation code followed by the encoded constructor arguments.
pub fn deploy_data(contract: &CompiledContract, args: &[Value]) -> Result<Vec<u8>, AbiError> {
    let mut data = contract.bytecode.clone();
    data.extend(encode_constructor(&contract.abi, args)?);
    Ok(data)
}

fn coerce(ty: &DynSolType, value: &Value) -> Result<DynSolValue, AbiError> {
    let invalid = |reason: String| AbiError::InvalidValue {
        ty: ty.sol_type_name().into_owned(),
        value: value.to_string(),
        reason,
    };

    match (ty, value) {
        (DynSolType::Array(inner), Value::Array(items)) => {
            Ok(DynSolValue::Array(coerce_all(std::iter::repeat(inner.as_ref()), items)?))
        }
        (DynSolType::FixedArray(inner, len), Value::Array(items)) => {
            if items.len() != *len {
                return Err(invalid(format!("expected {len} element(s), got {}", items.len())));
            }
            Ok(DynSolValue::FixedArray(coerce_all(std::iter::repeat(inner.as_ref()), items)?))
        }
        (DynSolType::Tuple(types), Value::Array(items)) => {
            if items.len() != types.len() {
                return Err(invalid(format!("expected {} component(s), got {}", types.len(), items.len())));
            }
            Ok(DynSolValue::Tuple(coerce_all(types.iter(), items)?))
        }
        (DynSolType::Address, Value::String(s)) => {
            s.parse::<Address>().map(DynSolValue::Address).map_err(|e| invalid(e.to_string()))
        }
        (DynSolType::String, Value::String(s)) => Ok(DynSolValue::String(s.clone())),
        (DynSolType::Bool, Value::Bool(b)) => Ok(DynSolValue::Bool(*b)),
        (DynSolType::Int(_) | DynSolType::Uint(_), Value::Number(n)) => coerce_str(ty, &n.to_string(), invalid),
        (_, Value::String(s)) => coerce_str(ty, s, invalid),
        _ => Err(invalid("unsupported JSON value for this type".to_string())),
    }
}

fn coerce_all<'a>(types: impl Iterator<Item = &'a DynSolType>, items: &[Value]) -> Result<Vec<DynSolValue>, AbiError> {
    types.zip(items).map(|(t, v)| coerce(t, v)).collect()
}

fn coerce_str(ty: &DynSolType, s: &str, invalid: impl Fn(String) -> AbiError) -> Result<DynSolValue, AbiError> {
    // `-0` is plain zero.
    let s = match s.trim() {
        "-0" => "0",
        other => other,
    };
    ty.coerce_str(s).map_err(|e| invalid(e.to_string()))
}
