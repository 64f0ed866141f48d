//! The fixed set of ledger operations the agent can perform.
//!
//! Each entry carries the parameter schema handed to the language model.
//! Names match the tool names the model is asked to call; the mapping to
//! HTTP endpoints lives in [`crate::request`].

use serde::Serialize;
use serde_json::{json, Map, Value};

pub const GET_CURRENT_FEE_PERCENTILES: &str = "get_current_fee_percentiles";
pub const GET_BALANCE: &str = "get_balance";
pub const GET_UTXOS: &str = "get_utxos";
pub const GET_P2PKH_ADDRESS: &str = "get_p2pkh_address";
pub const SEND: &str = "send";

/// JSON schema type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub param_type: ParamType,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParamSpec>,
}

impl OperationSpec {
    /// Strict object schema for the parameters
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            properties.insert(
                param.name.to_string(),
                json!({
                    "type": param.param_type.as_str(),
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(param.name);
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Read-only registry, built once and shared as `Arc<Catalog>`.
#[derive(Debug, Clone)]
pub struct Catalog {
    operations: Vec<OperationSpec>,
}

impl Catalog {
    pub fn new(operations: Vec<OperationSpec>) -> Self {
        Self { operations }
    }

    /// The Bitcoin ledger operations
    pub fn ledger() -> Self {
        Self::new(vec![
            OperationSpec {
                name: GET_CURRENT_FEE_PERCENTILES,
                description: "Gets the 100 fee percentiles measured in millisatoshi/byte.",
                parameters: vec![],
            },
            OperationSpec {
                name: GET_BALANCE,
                description: "Returns the balance of a given Bitcoin address.",
                parameters: vec![ParamSpec {
                    name: "address",
                    param_type: ParamType::String,
                    description: "The Bitcoin address to check.",
                    required: true,
                }],
            },
            OperationSpec {
                name: GET_UTXOS,
                description: "Returns the UTXOs of a given Bitcoin address.",
                parameters: vec![ParamSpec {
                    name: "address",
                    param_type: ParamType::String,
                    description: "The Bitcoin address to fetch UTXOs for.",
                    required: true,
                }],
            },
            OperationSpec {
                name: GET_P2PKH_ADDRESS,
                description: "Returns the P2PKH address of this canister, usable to receive bitcoin.",
                parameters: vec![],
            },
            OperationSpec {
                name: SEND,
                description: "Sends satoshis from this canister to a specified address.",
                parameters: vec![
                    ParamSpec {
                        name: "destinationAddress",
                        param_type: ParamType::String,
                        description: "The destination Bitcoin address.",
                        required: true,
                    },
                    ParamSpec {
                        name: "amountInSatoshi",
                        param_type: ParamType::Number,
                        description: "Amount to send in satoshis.",
                        required: true,
                    },
                ],
            },
        ])
    }

    pub fn list(&self) -> &[OperationSpec] {
        &self.operations
    }

    pub fn lookup(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::ledger()
    }
}
