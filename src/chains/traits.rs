use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chains::sui::errors::SuiResult;

/// Execution outcome reported in the transaction effects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failure { error: String },
}

/// Net coin movement for one owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Address owner; `None` for object or shared owners
    pub owner: Option<String>,
    pub coin_type: String,
    /// Signed, in the coin's smallest unit
    pub amount: i128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCall {
    pub package: String,
    pub module: String,
    pub function: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub event_type: String,
    pub sender: Option<String>,
    /// Recipient, when the event names one
    pub recipient: Option<String>,
    pub parsed_json: Option<serde_json::Value>,
}

impl ChainEvent {
    /// Native transfer emitted by the effects, not a Move event
    pub fn is_transfer(&self) -> bool {
        self.event_type == "transfer"
    }
}

/// Sui addresses are hex; nodes report them lowercase
pub fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Chain-agnostic view of an executed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub digest: String,
    pub status: ExecutionStatus,
    pub balance_changes: Vec<BalanceChange>,
    pub move_calls: Vec<MoveCall>,
    /// Move events emitted by the transaction's calls
    pub events: Vec<ChainEvent>,
    /// Events inlined in the effects by older nodes
    pub effect_events: Vec<ChainEvent>,
    pub timestamp_ms: Option<u64>,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// First positive credit of `coin_type` to `owner`
    pub fn credit_to(&self, owner: &str, coin_type: &str) -> Option<&BalanceChange> {
        self.balance_changes.iter().find(|change| {
            change
                .owner
                .as_deref()
                .is_some_and(|address| same_address(address, owner))
                && change.coin_type == coin_type
                && change.amount > 0
        })
    }

    pub fn calls_package(&self, package: &str) -> bool {
        self.move_calls.iter().any(|call| call.package == package)
    }

    /// Effect-level transfers to `recipient`.
    ///
    /// Move events are never consulted: any package can emit one naming any
    /// recipient.
    pub fn transfer_events_to<'a>(
        &'a self,
        recipient: &'a str,
    ) -> impl Iterator<Item = &'a ChainEvent> + 'a {
        self.effect_events.iter().filter(move |event| {
            event.is_transfer()
                && event
                    .recipient
                    .as_deref()
                    .is_some_and(|address| same_address(address, recipient))
        })
    }
}

/// Read access to a chain's executed transactions.
///
/// `Ok(None)` means the node answered but has no such transaction.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_transaction(&self, digest: &str) -> SuiResult<Option<TransactionReceipt>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt() -> TransactionReceipt {
        TransactionReceipt {
            digest: "digest".to_string(),
            status: ExecutionStatus::Success,
            balance_changes: vec![
                BalanceChange {
                    owner: Some("0xpayer".to_string()),
                    coin_type: "0x2::sui::SUI".to_string(),
                    amount: -1_001_000_000,
                },
                BalanceChange {
                    owner: Some("0xmerchant".to_string()),
                    coin_type: "0x2::sui::SUI".to_string(),
                    amount: 1_000_000_000,
                },
            ],
            move_calls: vec![MoveCall {
                package: "0xpkg".to_string(),
                module: "payment".to_string(),
                function: "pay".to_string(),
            }],
            events: vec![ChainEvent {
                event_type: "0xpkg::payment::TransferEvent".to_string(),
                sender: Some("0xpayer".to_string()),
                recipient: Some("0xpayer".to_string()),
                parsed_json: None,
            }],
            effect_events: vec![ChainEvent {
                event_type: "transfer".to_string(),
                sender: Some("0xpayer".to_string()),
                recipient: Some("0xmerchant".to_string()),
                parsed_json: None,
            }],
            timestamp_ms: None,
        }
    }

    #[test]
    fn test_credit_to_ignores_debits() {
        let receipt = receipt();
        assert!(receipt.credit_to("0xpayer", "0x2::sui::SUI").is_none());
        assert_eq!(
            receipt.credit_to("0xmerchant", "0x2::sui::SUI").map(|c| c.amount),
            Some(1_000_000_000)
        );
        assert!(receipt.credit_to("0xmerchant", "0xother::coin::X").is_none());
    }

    #[test]
    fn test_package_and_event_lookup() {
        let receipt = receipt();
        assert!(receipt.calls_package("0xpkg"));
        assert!(!receipt.calls_package("0xother"));
        assert_eq!(receipt.transfer_events_to("0xmerchant").count(), 1);
        assert_eq!(receipt.transfer_events_to("0xpayer").count(), 0);
    }

    #[test]
    fn test_move_events_never_count_as_transfers() {
        let mut receipt = receipt();
        receipt.effect_events.clear();
        receipt.events.push(ChainEvent {
            event_type: "0xattacker::fake::TransferEvent".to_string(),
            sender: None,
            recipient: Some("0xmerchant".to_string()),
            parsed_json: None,
        });
        assert_eq!(receipt.transfer_events_to("0xmerchant").count(), 0);

        receipt.effect_events.push(ChainEvent {
            event_type: "TransferObject".to_string(),
            sender: None,
            recipient: Some("0xmerchant".to_string()),
            parsed_json: None,
        });
        assert_eq!(receipt.transfer_events_to("0xmerchant").count(), 0);
    }

    #[test]
    fn test_address_comparison_ignores_case() {
        let receipt = receipt();
        assert!(receipt.credit_to("0xMERCHANT", "0x2::sui::SUI").is_some());
        assert_eq!(receipt.transfer_events_to("0xMerchant").count(), 1);
    }
}
