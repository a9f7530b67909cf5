//! Identifiers carried in inventory payloads.
//!
//! The inventory backend is not consistent about id encoding (database keys
//! arrive as integers, imported records as strings), so both forms are
//! accepted and normalized to their string form.

use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EnvelopeError;

/// Identifier of an inventory item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

/// Identifier of a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct WarehouseId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
}

macro_rules! impl_string_id {
    ($t:ident, $name:literal) => {
        impl $t {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value.to_string())
            }
        }

        impl FromStr for $t {
            type Err = EnvelopeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(EnvelopeError::InvalidId(format!("{}: empty", $name)));
                }
                Ok(Self(trimmed.to_string()))
            }
        }

        impl<'de> Deserialize<'de> for $t {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                match RawId::deserialize(deserializer)? {
                    RawId::Text(s) => Ok(Self(s)),
                    RawId::Int(n) => Ok(Self(n.to_string())),
                }
            }
        }
    };
}

impl_string_id!(ItemId, "ItemId");
impl_string_id!(WarehouseId, "WarehouseId");
