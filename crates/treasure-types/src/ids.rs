//! Type-safe key wrappers for the indexed collections.
//!
//! Users are keyed by wallet address and chest records by transaction hash.
//! Both arrive as hex strings from the event decoder; they are normalised to
//! lowercase on construction so that `0xAB..` and `0xab..` name the same
//! entity. No other validation is performed: the event source is trusted.

use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

/// Generates a lowercase hex string newtype with standard derives.
macro_rules! define_hex_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(String);

        impl $name {
            /// Build a key from a hex string, lowercasing it.
            pub fn new(raw: &str) -> Self {
                Self(raw.to_ascii_lowercase())
            }

            /// Borrow the normalised hex string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the key and return the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::new(raw)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self::new(&raw)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                String::deserialize(deserializer).map(|raw| Self::new(&raw))
            }
        }
    };
}

define_hex_key! {
    /// Wallet address identifying a [`User`](crate::User).
    Address
}

define_hex_key! {
    /// Transaction hash identifying a [`ChestOpened`](crate::ChestOpened) record.
    TxHash
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn address_is_lowercased() {
        let address = Address::new("0xAbCdEF0123");
        assert_eq!(address.as_str(), "0xabcdef0123");
        assert_eq!(address, Address::from("0xabcdef0123"));
    }

    #[test]
    fn deserialize_normalises_case() {
        let hash: TxHash = serde_json::from_str("\"0xDEADBEEF\"").unwrap();
        assert_eq!(hash.as_str(), "0xdeadbeef");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Address::new("0xAA")).unwrap();
        assert_eq!(json, "\"0xaa\"");
    }
}
