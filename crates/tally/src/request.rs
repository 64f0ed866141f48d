//! Untyped call → typed ledger request.
//!
//! This is the validation boundary. The language model hands us a name and
//! a JSON object; everything past this point works with typed requests.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::catalog::{
    Catalog, GET_BALANCE, GET_CURRENT_FEE_PERCENTILES, GET_P2PKH_ADDRESS, GET_UTXOS, SEND,
};
use crate::types::OperationCall;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgumentError {
    #[error("unsupported operation")]
    UnknownOperation,

    #[error("missing required argument '{0}'")]
    Missing(&'static str),

    #[error("unexpected argument '{0}'")]
    Unexpected(String),

    #[error("argument '{field}' must be {expected}")]
    Invalid {
        field: &'static str,
        expected: &'static str,
    },
}

/// A validated request against one ledger endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerRequest {
    FeePercentiles,
    Balance {
        address: String,
    },
    Utxos {
        address: String,
    },
    P2pkhAddress,
    Send {
        destination_address: String,
        amount_in_satoshi: u64,
    },
}

impl LedgerRequest {
    /// Coerce an untyped call into a typed request.
    ///
    /// Argument keys not declared for the operation are rejected.
    pub fn from_call(catalog: &Catalog, call: &OperationCall) -> Result<Self, ArgumentError> {
        let spec = catalog
            .lookup(&call.name)
            .ok_or(ArgumentError::UnknownOperation)?;

        if let Some(extra) = call.arguments.keys().find(|k| spec.param(k).is_none()) {
            return Err(ArgumentError::Unexpected(extra.clone()));
        }

        let args = &call.arguments;
        match spec.name {
            GET_CURRENT_FEE_PERCENTILES => Ok(Self::FeePercentiles),
            GET_BALANCE => Ok(Self::Balance {
                address: address_arg(args, "address")?,
            }),
            GET_UTXOS => Ok(Self::Utxos {
                address: address_arg(args, "address")?,
            }),
            GET_P2PKH_ADDRESS => Ok(Self::P2pkhAddress),
            SEND => Ok(Self::Send {
                destination_address: address_arg(args, "destinationAddress")?,
                amount_in_satoshi: satoshi_arg(args, "amountInSatoshi")?,
            }),
            // In the catalog but without an endpoint mapping
            _ => Err(ArgumentError::UnknownOperation),
        }
    }

    /// Catalog name of the operation
    pub fn operation(&self) -> &'static str {
        match self {
            Self::FeePercentiles => GET_CURRENT_FEE_PERCENTILES,
            Self::Balance { .. } => GET_BALANCE,
            Self::Utxos { .. } => GET_UTXOS,
            Self::P2pkhAddress => GET_P2PKH_ADDRESS,
            Self::Send { .. } => SEND,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::FeePercentiles => "/get-current-fee-percentiles",
            Self::Balance { .. } => "/get-balance",
            Self::Utxos { .. } => "/get-utxos",
            Self::P2pkhAddress => "/get-p2pkh-address",
            Self::Send { .. } => "/send",
        }
    }

    pub fn body(&self) -> Value {
        match self {
            Self::FeePercentiles | Self::P2pkhAddress => json!({}),
            Self::Balance { address } | Self::Utxos { address } => json!({ "address": address }),
            Self::Send {
                destination_address,
                amount_in_satoshi,
            } => json!({
                "destinationAddress": destination_address,
                "amountInSatoshi": amount_in_satoshi,
            }),
        }
    }

    /// Safe to replay. Only transfers move value.
    pub fn is_read_only(&self) -> bool {
        !matches!(self, Self::Send { .. })
    }
}

fn address_arg(args: &Map<String, Value>, field: &'static str) -> Result<String, ArgumentError> {
    match args.get(field) {
        None | Some(Value::Null) => Err(ArgumentError::Missing(field)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(_) => Err(ArgumentError::Invalid {
            field,
            expected: "a non-empty address string",
        }),
    }
}

fn satoshi_arg(args: &Map<String, Value>, field: &'static str) -> Result<u64, ArgumentError> {
    let invalid = ArgumentError::Invalid {
        field,
        expected: "a positive whole number of satoshis",
    };

    let value = match args.get(field) {
        None | Some(Value::Null) => return Err(ArgumentError::Missing(field)),
        Some(Value::Number(n)) => n,
        Some(_) => return Err(invalid),
    };

    let amount = match value.as_u64() {
        Some(v) => v,
        // Models like to write 10000.0
        None => match value.as_f64() {
            Some(f) if f.fract() == 0.0 && f > 0.0 && f < u64::MAX as f64 => f as u64,
            _ => return Err(invalid),
        },
    };

    if amount == 0 {
        return Err(invalid);
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Value) -> OperationCall {
        OperationCall::from_json(name, args)
    }

    #[test]
    fn test_balance_request() {
        let catalog = Catalog::ledger();
        let req =
            LedgerRequest::from_call(&catalog, &call(GET_BALANCE, json!({"address": "tb1qexample"})))
                .unwrap();
        assert_eq!(
            req,
            LedgerRequest::Balance {
                address: "tb1qexample".into()
            }
        );
        assert_eq!(req.path(), "/get-balance");
        assert_eq!(req.body(), json!({"address": "tb1qexample"}));
        assert!(req.is_read_only());
    }

    #[test]
    fn test_send_request_accepts_integral_float() {
        let catalog = Catalog::ledger();
        let req = LedgerRequest::from_call(
            &catalog,
            &call(
                SEND,
                json!({"destinationAddress": "tb1qreceiver", "amountInSatoshi": 10000.0}),
            ),
        )
        .unwrap();
        assert_eq!(
            req.body(),
            json!({"destinationAddress": "tb1qreceiver", "amountInSatoshi": 10000})
        );
        assert!(!req.is_read_only());
    }

    #[test]
    fn test_send_rejects_fractional_and_zero_amounts() {
        let catalog = Catalog::ledger();
        for amount in [json!(0.5), json!(0), json!(-10), json!("10000")] {
            let err = LedgerRequest::from_call(
                &catalog,
                &call(SEND, json!({"destinationAddress": "tb1q", "amountInSatoshi": amount})),
            )
            .unwrap_err();
            assert!(
                matches!(err, ArgumentError::Invalid { field: "amountInSatoshi", .. }),
                "amount {:?} gave {:?}",
                amount,
                err
            );
        }
    }

    #[test]
    fn test_send_rejects_amounts_past_u64() {
        let catalog = Catalog::ledger();
        for amount in [json!(2f64.powi(64)), json!(1e20)] {
            let err = LedgerRequest::from_call(
                &catalog,
                &call(SEND, json!({"destinationAddress": "tb1q", "amountInSatoshi": amount})),
            )
            .unwrap_err();
            assert!(
                matches!(err, ArgumentError::Invalid { field: "amountInSatoshi", .. }),
                "amount {:?} gave {:?}",
                amount,
                err
            );
        }
    }

    #[test]
    fn test_missing_and_empty_address() {
        let catalog = Catalog::ledger();
        assert_eq!(
            LedgerRequest::from_call(&catalog, &call(GET_UTXOS, json!({}))).unwrap_err(),
            ArgumentError::Missing("address")
        );
        assert!(matches!(
            LedgerRequest::from_call(&catalog, &call(GET_UTXOS, json!({"address": "  "}))),
            Err(ArgumentError::Invalid { field: "address", .. })
        ));
    }

    #[test]
    fn test_unexpected_argument() {
        let catalog = Catalog::ledger();
        let err = LedgerRequest::from_call(
            &catalog,
            &call(GET_CURRENT_FEE_PERCENTILES, json!({"network": "testnet"})),
        )
        .unwrap_err();
        assert_eq!(err, ArgumentError::Unexpected("network".into()));
    }

    #[test]
    fn test_unknown_operation() {
        let catalog = Catalog::ledger();
        let err = LedgerRequest::from_call(&catalog, &call("get_block", json!({}))).unwrap_err();
        assert_eq!(err.to_string(), "unsupported operation");
    }

    #[test]
    fn test_every_catalog_entry_maps_to_an_endpoint() {
        let catalog = Catalog::ledger();
        for op in catalog.list() {
            let mut args = Map::new();
            for p in &op.parameters {
                let v = match p.param_type {
                    crate::catalog::ParamType::String => json!("tb1qexample"),
                    crate::catalog::ParamType::Number => json!(1),
                };
                args.insert(p.name.to_string(), v);
            }
            let req = LedgerRequest::from_call(&catalog, &OperationCall::new(op.name, args))
                .unwrap_or_else(|e| panic!("{} failed: {}", op.name, e));
            assert_eq!(req.operation(), op.name);
        }
    }
}
