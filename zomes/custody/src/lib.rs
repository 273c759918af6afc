//! Custody Coordinator Zome
//!
//! Container custody over the DHT: a sender creates a container record,
//! hands it to a shipper, who hands it to a receiver.
//!
//! Key functions:
//! - create_container / sender_to_shipper / shipper_to_receiver
//! - update_temperature / update_id / update_weight
//! - get_container_details / check_unique_v5c / get_containers / get_ecert
//! - register_participant: bind the calling agent to a name and affiliation
//!
//! Callers are identified by their agent key; owners and recipients are
//! agent keys. A profile name is only a display label.
//! - invoke / invoke_query: positional-argument calls returning wire bytes

use custody_core::{
    program, register_participant as store_participant, Container, CustodyError, CustodyProgram,
    DirectoryResolver, IdentityResolver, Operation, ParticipantProfile, Response, PING_REPLY,
};
use custody_integrity::*;
use hdk::prelude::*;

pub mod ledger;

use ledger::HdkLedger;

// =============================================================================
// Input/Output Types
// =============================================================================

/// Input for a custody hand-over
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferInput {
    pub v5c_id: String,
    /// Agent key of the new owner
    pub recipient: String,
}

/// Input for a weight, temperature or id update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateInput {
    pub v5c_id: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEcertInput {
    pub name: String,
    pub ecert: String,
}

/// Function name plus positional arguments, as a chaincode client sends them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInput {
    pub function: String,
    #[serde(default)]
    pub args: Vec<String>,
}

// =============================================================================
// Signals for Projection
// =============================================================================

/// Signal types emitted after commits for real-time projection.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", content = "payload")]
pub enum CustodySignal {
    /// A ledger key received a new value
    StateCommitted {
        action_hash: ActionHash,
        key: String,
        author: AgentPubKey,
    },
}

#[hdk_extern]
pub fn post_commit(committed_actions: Vec<SignedActionHashed>) -> ExternResult<()> {
    for signed_action in committed_actions {
        let action = signed_action.hashed.content.clone();
        let action_hash = signed_action.hashed.hash.clone();

        if !matches!(action, Action::Create(_)) {
            continue;
        }

        let record = match get(action_hash.clone(), GetOptions::default())? {
            Some(r) => r,
            None => continue,
        };

        if let Some(state) = record.entry().to_app_option::<LedgerState>().ok().flatten() {
            emit_signal(CustodySignal::StateCommitted {
                action_hash,
                key: state.key,
                author: action.author().clone(),
            })?;
        }
    }

    Ok(())
}

// =============================================================================
// Program Plumbing
// =============================================================================

fn guest_error(err: CustodyError) -> WasmError {
    wasm_error!(WasmErrorInner::Guest(err.to_string()))
}

fn load_program() -> ExternResult<CustodyProgram<HdkLedger>> {
    let properties = custody_properties()?;
    Ok(CustodyProgram::new(HdkLedger, properties.custody))
}

fn calling_agent() -> ExternResult<String> {
    Ok(agent_info()?.agent_initial_pubkey.to_string())
}

/// Run any operation on behalf of the calling agent.
fn run(op: Operation) -> ExternResult<Response> {
    if op == Operation::Ping {
        return Ok(program::ping());
    }

    let mut program = load_program()?;
    let config = program.config().clone();
    let directory = HdkLedger;
    let resolver = DirectoryResolver::new(&directory, &config, Some(calling_agent()?));

    program.invoke(&resolver, op).map_err(|err| {
        debug!(error = %err, kind = ?err.kind(), "custody operation failed");
        guest_error(err)
    })
}

/// Run a read-only operation; nothing is committed.
fn run_query(op: Operation) -> ExternResult<Response> {
    if op == Operation::Ping {
        return Ok(program::ping());
    }

    let program = load_program()?;
    let resolver = DirectoryResolver::new(program.ledger(), program.config(), Some(calling_agent()?));
    let caller = resolver
        .resolve()
        .map_err(|err| guest_error(CustodyError::from(err)))?;

    program.query(&caller, op).map_err(guest_error)
}

fn unexpected(response: Response) -> WasmError {
    wasm_error!(WasmErrorInner::Guest(format!(
        "Unexpected response: {:?}",
        response
    )))
}

fn into_container(response: Response) -> ExternResult<Container> {
    match response {
        Response::Container(container) => Ok(container),
        other => Err(unexpected(other)),
    }
}

// =============================================================================
// Custody Functions
// =============================================================================

#[hdk_extern]
pub fn create_container(v5c_id: String) -> ExternResult<Container> {
    into_container(run(Operation::CreateContainer { v5c_id })?)
}

#[hdk_extern]
pub fn sender_to_shipper(input: TransferInput) -> ExternResult<Container> {
    into_container(run(Operation::SenderToShipper {
        v5c_id: input.v5c_id,
        recipient: input.recipient,
    })?)
}

#[hdk_extern]
pub fn shipper_to_receiver(input: TransferInput) -> ExternResult<Container> {
    into_container(run(Operation::ShipperToReceiver {
        v5c_id: input.v5c_id,
        recipient: input.recipient,
    })?)
}

#[hdk_extern]
pub fn update_temperature(input: UpdateInput) -> ExternResult<Container> {
    into_container(run(Operation::UpdateTemperature {
        v5c_id: input.v5c_id,
        value: input.value,
    })?)
}

#[hdk_extern]
pub fn update_id(input: UpdateInput) -> ExternResult<Container> {
    into_container(run(Operation::UpdateId {
        v5c_id: input.v5c_id,
        value: input.value,
    })?)
}

#[hdk_extern]
pub fn update_weight(input: UpdateInput) -> ExternResult<Container> {
    into_container(run(Operation::UpdateWeight {
        v5c_id: input.v5c_id,
        value: input.value,
    })?)
}

// =============================================================================
// Query Functions
// =============================================================================

#[hdk_extern]
pub fn ping(_: ()) -> ExternResult<String> {
    Ok(PING_REPLY.to_string())
}

#[hdk_extern]
pub fn get_container_details(v5c_id: String) -> ExternResult<Container> {
    into_container(run_query(Operation::GetContainerDetails { v5c_id })?)
}

#[hdk_extern]
pub fn check_unique_v5c(v5c_id: String) -> ExternResult<bool> {
    match run_query(Operation::CheckUniqueV5c { v5c_id })? {
        Response::Unique(unique) => Ok(unique),
        other => Err(unexpected(other)),
    }
}

#[hdk_extern]
pub fn get_containers(_: ()) -> ExternResult<Vec<Container>> {
    match run_query(Operation::GetContainers)? {
        Response::Containers(containers) => Ok(containers),
        other => Err(unexpected(other)),
    }
}

#[hdk_extern]
pub fn get_ecert(name: String) -> ExternResult<String> {
    match run_query(Operation::GetEcert { name })? {
        Response::Ecert(ecert) => Ok(ecert),
        other => Err(unexpected(other)),
    }
}

// =============================================================================
// Directory and Certificates
// =============================================================================

/// Bind the calling agent to a name and affiliation, replacing any earlier
/// profile. The integrity zome rejects profiles written for another agent.
#[hdk_extern]
pub fn register_participant(profile: ParticipantProfile) -> ExternResult<()> {
    let config = custody_properties()?.custody;
    let agent = calling_agent()?;
    store_participant(&mut HdkLedger, &config, &agent, &profile)
        .map_err(|err| guest_error(CustodyError::from(err)))
}

/// Profile the calling agent is registered under, if any
#[hdk_extern]
pub fn get_my_profile(_: ()) -> ExternResult<Option<ParticipantProfile>> {
    let config = custody_properties()?.custody;
    let agent = calling_agent()?;
    DirectoryResolver::new(&HdkLedger, &config, None)
        .profile(&agent)
        .map_err(|err| guest_error(CustodyError::from(err)))
}

#[hdk_extern]
pub fn add_ecert(input: AddEcertInput) -> ExternResult<()> {
    let mut program = load_program()?;
    let config = program.config().clone();
    custody_core::query::add_ecert(program.ledger_mut(), &config, &input.name, &input.ecert).map_err(guest_error)
}

// =============================================================================
// Positional Calls
// =============================================================================

/// Parse and run any function; the reply body is in wire form.
#[hdk_extern]
pub fn invoke(input: CallInput) -> ExternResult<Vec<u8>> {
    let op = Operation::parse(&input.function, &input.args).map_err(guest_error)?;
    run(op)?.to_bytes().map_err(guest_error)
}

/// Like `invoke`, but refuses anything that would write.
#[hdk_extern]
pub fn invoke_query(input: CallInput) -> ExternResult<Vec<u8>> {
    let op = Operation::parse(&input.function, &input.args).map_err(guest_error)?;
    if !op.is_query() {
        return Err(wasm_error!(WasmErrorInner::Guest(format!(
            "{} is not a query; use invoke",
            op.name()
        ))));
    }
    run_query(op)?.to_bytes().map_err(guest_error)
}

// =============================================================================
// Init
// =============================================================================

/// Store seeded certificates from DNA properties. The v5cID registry is a
/// link index here, so there is nothing to create for it.
#[hdk_extern]
pub fn init(_: ()) -> ExternResult<InitCallbackResult> {
    let properties = custody_properties()?;
    let mut program = CustodyProgram::new(HdkLedger, properties.custody);

    if let Err(err) = program.init(&properties.ecerts) {
        return Ok(InitCallbackResult::Fail(err.to_string()));
    }

    Ok(InitCallbackResult::Pass)
}
