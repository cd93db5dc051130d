//! Sui JSON-RPC wire types and their normalization into [`TransactionReceipt`]

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::chains::traits::{
    BalanceChange, ChainEvent, ExecutionStatus, MoveCall, TransactionReceipt,
};

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: JsonValue,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(method: &'a str, params: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Options for `sui_getTransactionBlock`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBlockResponseOptions {
    pub show_input: bool,
    pub show_effects: bool,
    pub show_events: bool,
    pub show_balance_changes: bool,
}

impl TransactionBlockResponseOptions {
    pub fn for_verification() -> Self {
        Self {
            show_input: true,
            show_effects: true,
            show_events: true,
            show_balance_changes: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiTransactionBlockResponse {
    pub digest: String,
    pub transaction: Option<SuiTransactionBlock>,
    pub effects: Option<SuiEffects>,
    #[serde(default)]
    pub events: Vec<SuiEvent>,
    #[serde(default)]
    pub balance_changes: Vec<SuiBalanceChange>,
    pub timestamp_ms: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuiTransactionBlock {
    pub data: SuiTransactionData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuiTransactionData {
    /// Transaction kind; left untyped since only MoveCalls are inspected
    pub transaction: JsonValue,
    pub sender: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuiEffects {
    pub status: SuiExecutionStatus,
    /// Older nodes inline events in the effects
    #[serde(default)]
    pub events: Vec<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuiExecutionStatus {
    pub status: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub sender: Option<String>,
    pub parsed_json: Option<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiBalanceChange {
    pub owner: JsonValue,
    pub coin_type: String,
    /// Decimal string, signed
    pub amount: String,
}

/// `{"AddressOwner": "0x.."}` or a bare address string
pub fn owner_address(owner: &JsonValue) -> Option<String> {
    match owner {
        JsonValue::String(address) => Some(address.clone()),
        JsonValue::Object(map) => map
            .get("AddressOwner")
            .and_then(JsonValue::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// MoveCalls of a programmable transaction, in either of the layouts nodes emit
pub fn extract_move_calls(kind: &JsonValue) -> Vec<MoveCall> {
    let commands = kind
        .get("ProgrammableTransaction")
        .and_then(|ptb| ptb.get("transactions"))
        .or_else(|| kind.get("transactions"))
        .and_then(JsonValue::as_array);

    commands
        .map(|commands| {
            commands
                .iter()
                .filter_map(|command| command.get("MoveCall"))
                .filter_map(|call| {
                    Some(MoveCall {
                        package: call.get("package")?.as_str()?.to_string(),
                        module: call.get("module")?.as_str()?.to_string(),
                        function: call.get("function")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Recipient of an effect-level event; Move payloads are not trusted here
fn event_recipient(value: &JsonValue) -> Option<String> {
    value.get("recipient").and_then(owner_address)
}

impl From<SuiEvent> for ChainEvent {
    fn from(event: SuiEvent) -> Self {
        let recipient = event
            .parsed_json
            .as_ref()
            .and_then(|parsed| parsed.get("recipient"))
            .and_then(owner_address);

        Self {
            event_type: event.event_type,
            sender: event.sender,
            recipient,
            parsed_json: event.parsed_json,
        }
    }
}

impl From<SuiTransactionBlockResponse> for TransactionReceipt {
    fn from(response: SuiTransactionBlockResponse) -> Self {
        let (status, legacy_events) = match response.effects {
            Some(effects) => {
                let status = if effects.status.status == "success" {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Failure {
                        error: effects
                            .status
                            .error
                            .unwrap_or_else(|| effects.status.status.clone()),
                    }
                };
                (status, effects.events)
            }
            None => (
                ExecutionStatus::Failure {
                    error: "transaction effects missing".to_string(),
                },
                Vec::new(),
            ),
        };

        let move_calls = response
            .transaction
            .as_ref()
            .map(|tx| extract_move_calls(&tx.data.transaction))
            .unwrap_or_default();

        // Unparsable amounts drop out instead of failing the whole receipt
        let balance_changes = response
            .balance_changes
            .into_iter()
            .filter_map(|change| {
                Some(BalanceChange {
                    owner: owner_address(&change.owner),
                    coin_type: change.coin_type,
                    amount: change.amount.parse().ok()?,
                })
            })
            .collect();

        let events: Vec<ChainEvent> = response.events.into_iter().map(Into::into).collect();
        let effect_events = legacy_events
            .iter()
            .filter_map(|value| {
                Some(ChainEvent {
                    event_type: value.get("type")?.as_str()?.to_string(),
                    sender: value
                        .get("sender")
                        .and_then(JsonValue::as_str)
                        .map(str::to_string),
                    recipient: event_recipient(value),
                    parsed_json: value.get("parsedJson").cloned(),
                })
            })
            .collect();

        TransactionReceipt {
            digest: response.digest,
            status,
            balance_changes,
            move_calls,
            events,
            effect_events,
            timestamp_ms: response.timestamp_ms.and_then(|ts| ts.parse().ok()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub rpc_url: String,
    pub response_time_ms: u64,
    pub last_check: String,
    pub checkpoint: Option<String>,
    pub error_message: Option<String>,
}
