//! Decoded contract events as delivered by the upstream indexing host.
//!
//! The host owns log retrieval, ABI decoding, and block ordering. What
//! arrives here is a [`DecodedEvent`]: the domain payload plus the
//! position of its log in the chain.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "context": {"blockNumber": 1, "logIndex": 0, "txHash": "0xab", "blockTimestamp": 1700000000},
//!   "event": {"kind": "ChestOpened", "user": "0xAb", "timestamp": 1700000000}
//! }
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::entities::ChestKind;
use crate::ids::{Address, TxHash};

/// The four contract events the aggregator consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind")]
#[ts(export, export_to = "bindings/")]
pub enum ChestEvent {
    /// A regular chest was opened.
    ChestOpened {
        /// Opening wallet.
        user: Address,
        /// Unix seconds as emitted by the contract.
        timestamp: u64,
    },
    /// A premium chest was opened.
    PremiumChestOpened {
        /// Opening wallet.
        user: Address,
        /// Unix seconds as emitted by the contract.
        timestamp: u64,
    },
    /// An address became premium.
    PremiumUserAdded {
        /// Flagged wallet.
        user: Address,
    },
    /// An address lost premium status.
    PremiumUserRemoved {
        /// Unflagged wallet.
        user: Address,
    },
}

impl ChestEvent {
    /// The wallet every event references.
    pub const fn user(&self) -> &Address {
        match self {
            Self::ChestOpened { user, .. }
            | Self::PremiumChestOpened { user, .. }
            | Self::PremiumUserAdded { user }
            | Self::PremiumUserRemoved { user } => user,
        }
    }

    /// Chest tier for the two opening events, `None` for flag changes.
    pub const fn chest_kind(&self) -> Option<ChestKind> {
        match self {
            Self::ChestOpened { .. } => Some(ChestKind::Regular),
            Self::PremiumChestOpened { .. } => Some(ChestKind::Premium),
            Self::PremiumUserAdded { .. } | Self::PremiumUserRemoved { .. } => None,
        }
    }

    /// Short name used in log fields.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ChestOpened { .. } => "ChestOpened",
            Self::PremiumChestOpened { .. } => "PremiumChestOpened",
            Self::PremiumUserAdded { .. } => "PremiumUserAdded",
            Self::PremiumUserRemoved { .. } => "PremiumUserRemoved",
        }
    }
}

/// Position of a log in the chain plus its enclosing transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct EventContext {
    /// Block height.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u32,
    /// Enclosing transaction hash.
    pub tx_hash: TxHash,
    /// Block timestamp in unix seconds.
    pub block_timestamp: u64,
}

impl EventContext {
    /// Idempotency key of this log.
    pub fn key(&self) -> EventKey {
        EventKey {
            tx_hash: self.tx_hash.clone(),
            log_index: self.log_index,
        }
    }

    /// Chain position of this log.
    pub const fn cursor(&self) -> EventCursor {
        EventCursor {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }
}

/// One decoded log as handed to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DecodedEvent {
    /// Chain position and transaction.
    pub context: EventContext,
    /// Domain payload.
    pub event: ChestEvent,
}

/// Identifies a single log for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventKey {
    /// Enclosing transaction hash.
    pub tx_hash: TxHash,
    /// Log index within the block.
    pub log_index: u32,
}

/// Total order over logs: block height, then log index.
///
/// Derived `Ord` compares fields in declaration order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct EventCursor {
    /// Block height.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u32,
}

impl core::fmt::Display for EventCursor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.block_number, self.log_index)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const WIRE: &str = r#"{
        "context": {"blockNumber": 7, "logIndex": 2, "txHash": "0xAB", "blockTimestamp": 1700000000},
        "event": {"kind": "PremiumChestOpened", "user": "0xCafe", "timestamp": 1700000001}
    }"#;

    #[test]
    fn decodes_wire_format() {
        let decoded: DecodedEvent = serde_json::from_str(WIRE).unwrap();
        assert_eq!(decoded.context.block_number, 7);
        assert_eq!(decoded.context.tx_hash.as_str(), "0xab");
        assert_eq!(decoded.event.user().as_str(), "0xcafe");
        assert_eq!(decoded.event.chest_kind(), Some(ChestKind::Premium));
    }

    #[test]
    fn flag_events_have_no_chest_kind() {
        let event = ChestEvent::PremiumUserAdded {
            user: Address::new("0x1"),
        };
        assert_eq!(event.chest_kind(), None);
        assert_eq!(event.name(), "PremiumUserAdded");
    }

    #[test]
    fn cursor_orders_by_block_then_log() {
        let a = EventCursor { block_number: 1, log_index: 9 };
        let b = EventCursor { block_number: 2, log_index: 0 };
        let c = EventCursor { block_number: 2, log_index: 1 };
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn key_combines_hash_and_log_index() {
        let context = EventContext {
            block_number: 1,
            log_index: 3,
            tx_hash: TxHash::new("0xff"),
            block_timestamp: 0,
        };
        assert_eq!(
            context.key(),
            EventKey {
                tx_hash: TxHash::new("0xFF"),
                log_index: 3,
            }
        );
    }
}
