//! Machine-readable contract interface descriptor.
//!
//! Emitted by the router build so off-ledger tooling can discover callable
//! methods. The schema version is pinned in `slate-contracts`.

use serde::Serialize;

use crate::method::MethodDescriptor;
use crate::abi::TypeSpec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractDoc {
    pub schema_version: String,
    pub name: String,
    pub methods: Vec<MethodDoc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDoc {
    pub name: String,
    pub args: Vec<ArgDoc>,
    pub returns: ReturnDoc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgDoc {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnDoc {
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ContractDoc {
    pub fn new(name: impl Into<String>, methods: Vec<MethodDoc>) -> ContractDoc {
        ContractDoc {
            schema_version: slate_contracts::CONTRACT_DOC_SCHEMA_VERSION.to_string(),
            name: name.into(),
            methods,
        }
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("contract doc serializes")
    }
}

impl From<&MethodDescriptor> for MethodDoc {
    fn from(descriptor: &MethodDescriptor) -> MethodDoc {
        MethodDoc {
            name: descriptor.name().to_string(),
            // The descriptor lists the original ungrouped signature;
            // call-data grouping is a transport detail.
            args: descriptor
                .arg_types()
                .iter()
                .map(|t| ArgDoc {
                    type_name: t.canonical(),
                    name: None,
                })
                .collect(),
            returns: ReturnDoc {
                type_name: descriptor
                    .return_type()
                    .map_or_else(|| "void".to_string(), TypeSpec::canonical),
            },
        }
    }
}
