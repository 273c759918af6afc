//! Typed operations and their replies
//!
//! Each callable function is one variant carrying its arguments, so an
//! unsupported call is caught when the call is parsed rather than half-way
//! through handling it.

use serde::{Deserialize, Serialize};

use crate::container::Container;
use crate::custody::{ScalarField, Transfer};
use crate::error::{CustodyError, Result};

/// Fixed reply to a liveness probe
pub const PING_REPLY: &str = "Hello, world!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "snake_case")]
pub enum Operation {
    CreateContainer { v5c_id: String },
    SenderToShipper { v5c_id: String, recipient: String },
    ShipperToReceiver { v5c_id: String, recipient: String },
    UpdateTemperature { v5c_id: String, value: String },
    UpdateId { v5c_id: String, value: String },
    UpdateWeight { v5c_id: String, value: String },
    Ping,
    GetContainerDetails { v5c_id: String },
    CheckUniqueV5c { v5c_id: String },
    GetContainers,
    GetEcert { name: String },
}

fn arg(function: &str, args: &[String], index: usize, expected: usize) -> Result<String> {
    args.get(index)
        .cloned()
        .ok_or_else(|| CustodyError::MissingArgument {
            function: function.to_string(),
            expected,
            actual: args.len(),
        })
}

impl Operation {
    /// Build an operation from a function name and positional arguments.
    ///
    /// Transfers take `[recipient, v5cID]`; scalar updates take
    /// `[v5cID, value]`.
    pub fn parse(function: &str, args: &[String]) -> Result<Self> {
        let op = match function {
            "create_container" => Self::CreateContainer {
                v5c_id: arg(function, args, 0, 1)?,
            },
            "sender_to_shipper" => Self::SenderToShipper {
                recipient: arg(function, args, 0, 2)?,
                v5c_id: arg(function, args, 1, 2)?,
            },
            "shipper_to_receiver" => Self::ShipperToReceiver {
                recipient: arg(function, args, 0, 2)?,
                v5c_id: arg(function, args, 1, 2)?,
            },
            "update_temperature" => Self::UpdateTemperature {
                v5c_id: arg(function, args, 0, 2)?,
                value: arg(function, args, 1, 2)?,
            },
            "update_id" => Self::UpdateId {
                v5c_id: arg(function, args, 0, 2)?,
                value: arg(function, args, 1, 2)?,
            },
            "update_weight" => Self::UpdateWeight {
                v5c_id: arg(function, args, 0, 2)?,
                value: arg(function, args, 1, 2)?,
            },
            "ping" => Self::Ping,
            "get_container_details" => Self::GetContainerDetails {
                v5c_id: arg(function, args, 0, 1)?,
            },
            "check_unique_v5c" => Self::CheckUniqueV5c {
                v5c_id: arg(function, args, 0, 1)?,
            },
            "get_containers" => Self::GetContainers,
            "get_ecert" => Self::GetEcert {
                name: arg(function, args, 0, 1)?,
            },
            other => {
                return Err(CustodyError::UnknownFunction {
                    function: other.to_string(),
                })
            }
        };
        Ok(op)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateContainer { .. } => "create_container",
            Self::SenderToShipper { .. } => Transfer::SenderToShipper.name(),
            Self::ShipperToReceiver { .. } => Transfer::ShipperToReceiver.name(),
            Self::UpdateTemperature { .. } => ScalarField::Temperature.operation(),
            Self::UpdateId { .. } => ScalarField::Id.operation(),
            Self::UpdateWeight { .. } => ScalarField::Weight.operation(),
            Self::Ping => "ping",
            Self::GetContainerDetails { .. } => "get_container_details",
            Self::CheckUniqueV5c { .. } => "check_unique_v5c",
            Self::GetContainers => "get_containers",
            Self::GetEcert { .. } => "get_ecert",
        }
    }

    /// Read-only operations never write to the ledger
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Self::Ping
                | Self::GetContainerDetails { .. }
                | Self::CheckUniqueV5c { .. }
                | Self::GetContainers
                | Self::GetEcert { .. }
        )
    }
}

/// Result of a successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Response {
    Ack(String),
    Container(Container),
    Containers(Vec<Container>),
    Unique(bool),
    Ecert(String),
}

impl Response {
    /// Reply body as the original wire format: plain text for acks, flags
    /// and certificates, JSON for records.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Self::Ack(text) | Self::Ecert(text) => text.clone().into_bytes(),
            Self::Unique(flag) => flag.to_string().into_bytes(),
            Self::Container(container) => serde_json::to_vec(container)
                .map_err(|e| CustodyError::encode(&container.v5c_id, e))?,
            Self::Containers(containers) => {
                serde_json::to_vec(containers).map_err(|e| CustodyError::encode("containers", e))?
            }
        };
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_positional_arguments() {
        assert_eq!(
            Operation::parse("sender_to_shipper", &args(&["bob", "AB1234567"])).unwrap(),
            Operation::SenderToShipper {
                v5c_id: "AB1234567".into(),
                recipient: "bob".into(),
            }
        );
        assert_eq!(
            Operation::parse("update_weight", &args(&["AB1234567", "1200"])).unwrap(),
            Operation::UpdateWeight {
                v5c_id: "AB1234567".into(),
                value: "1200".into(),
            }
        );
        assert_eq!(Operation::parse("ping", &[]).unwrap(), Operation::Ping);
    }

    #[test]
    fn test_parse_rejects_unknown_function() {
        let err = Operation::parse("scrap_vehicle", &args(&["AB1234567"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dispatch);
        assert_eq!(err.to_string(), "Received unknown function invocation scrap_vehicle");
    }

    #[test]
    fn test_parse_reports_missing_argument() {
        let err = Operation::parse("shipper_to_receiver", &args(&["carol"])).unwrap_err();
        assert!(matches!(
            err,
            CustodyError::MissingArgument { expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn test_name_matches_parse() {
        for function in [
            "create_container",
            "sender_to_shipper",
            "shipper_to_receiver",
            "update_temperature",
            "update_id",
            "update_weight",
            "ping",
            "get_container_details",
            "check_unique_v5c",
            "get_containers",
            "get_ecert",
        ] {
            let op = Operation::parse(function, &args(&["AB1234567", "x"])).unwrap();
            assert_eq!(op.name(), function);
        }
    }

    #[test]
    fn test_tagged_json_form() {
        let op: Operation =
            serde_json::from_str(r#"{"function":"create_container","v5c_id":"AB1234567"}"#)
                .unwrap();
        assert_eq!(op, Operation::CreateContainer { v5c_id: "AB1234567".into() });
        assert!(!op.is_query());

        let op: Operation = serde_json::from_str(r#"{"function":"get_containers"}"#).unwrap();
        assert!(op.is_query());
    }

    #[test]
    fn test_wire_bytes() {
        assert_eq!(Response::Ack(PING_REPLY.into()).to_bytes().unwrap(), b"Hello, world!");
        assert_eq!(Response::Unique(true).to_bytes().unwrap(), b"true");
        assert_eq!(Response::Containers(vec![]).to_bytes().unwrap(), b"[]");
    }
}
