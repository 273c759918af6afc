//! Entry point the runtime binding drives, one call per transaction

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CustodyConfig;
use crate::custody::{self, ScalarField, Transfer};
use crate::error::{CustodyError, Result};
use crate::identity::{CallerContext, IdentityResolver};
use crate::ledger::Ledger;
use crate::operation::{Operation, Response, PING_REPLY};
use crate::{query, registry};

/// Certificate to store at initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcertSeed {
    pub name: String,
    pub ecert: String,
}

impl EcertSeed {
    /// Pair up `[name, ecert, name, ecert, ...]`. A trailing unpaired name is
    /// ignored.
    pub fn from_pairs(args: &[String]) -> Vec<Self> {
        args.chunks_exact(2)
            .map(|pair| Self {
                name: pair[0].clone(),
                ecert: pair[1].clone(),
            })
            .collect()
    }
}

pub struct CustodyProgram<L: Ledger> {
    ledger: L,
    config: CustodyConfig,
}

impl<L: Ledger> CustodyProgram<L> {
    pub fn new(ledger: L, config: CustodyConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &CustodyConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn into_ledger(self) -> L {
        self.ledger
    }

    /// Create the registry if missing and store seeded certificates.
    pub fn init(&mut self, ecerts: &[EcertSeed]) -> Result<()> {
        registry::initialize(&mut self.ledger, &self.config)?;
        for seed in ecerts {
            query::add_ecert(&mut self.ledger, &self.config, &seed.name, &seed.ecert)?;
        }
        debug!(ecerts = ecerts.len(), "custody program initialized");
        Ok(())
    }

    /// Resolve the caller, then run `op`. `ping` skips resolution.
    pub fn invoke<R: IdentityResolver + ?Sized>(
        &mut self,
        resolver: &R,
        op: Operation,
    ) -> Result<Response> {
        if op == Operation::Ping {
            return Ok(ping());
        }
        let caller = resolver.resolve()?;
        self.execute(&caller, op)
    }

    pub fn execute(&mut self, caller: &CallerContext, op: Operation) -> Result<Response> {
        debug!(function = op.name(), caller = %caller.name, affiliation = %caller.affiliation, "invoke");

        let ledger = &mut self.ledger;
        let config = &self.config;
        let response = match op {
            Operation::CreateContainer { v5c_id } => {
                Response::Container(custody::create_container(ledger, config, caller, &v5c_id)?)
            }
            Operation::SenderToShipper { v5c_id, recipient } => Response::Container(
                custody::transfer(ledger, caller, Transfer::SenderToShipper, &v5c_id, &recipient)?,
            ),
            Operation::ShipperToReceiver { v5c_id, recipient } => Response::Container(
                custody::transfer(ledger, caller, Transfer::ShipperToReceiver, &v5c_id, &recipient)?,
            ),
            Operation::UpdateTemperature { v5c_id, value } => Response::Container(
                custody::update_scalar(ledger, config, caller, &v5c_id, ScalarField::Temperature, &value)?,
            ),
            Operation::UpdateId { v5c_id, value } => Response::Container(custody::update_scalar(
                ledger,
                config,
                caller,
                &v5c_id,
                ScalarField::Id,
                &value,
            )?),
            Operation::UpdateWeight { v5c_id, value } => Response::Container(
                custody::update_scalar(ledger, config, caller, &v5c_id, ScalarField::Weight, &value)?,
            ),
            query_op => return self.query(caller, query_op),
        };
        Ok(response)
    }

    /// Run a read-only operation. Write operations are rejected by type: the
    /// ledger is only borrowed shared here.
    pub fn query(&self, caller: &CallerContext, op: Operation) -> Result<Response> {
        debug!(function = op.name(), caller = %caller.name, "query");

        let ledger = &self.ledger;
        let config = &self.config;
        match op {
            Operation::Ping => Ok(ping()),
            Operation::GetContainerDetails { v5c_id } => Ok(Response::Container(
                query::get_container_details(ledger, caller, &v5c_id)?,
            )),
            Operation::CheckUniqueV5c { v5c_id } => {
                Ok(Response::Unique(query::check_unique_v5c(ledger, &v5c_id)?))
            }
            Operation::GetContainers => Ok(Response::Containers(query::get_containers(
                ledger, config, caller,
            )?)),
            Operation::GetEcert { name } => Ok(Response::Ecert(query::get_ecert(ledger, config, &name)?)),
            write_op => Err(CustodyError::UnknownFunction {
                function: format!("{} (not a query)", write_op.name()),
            }),
        }
    }
}

pub fn ping() -> Response {
    Response::Ack(PING_REPLY.to_string())
}
