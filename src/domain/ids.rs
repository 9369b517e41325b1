//! Identifier types
//!
//! Strongly typed UUID wrappers so an account id can never be passed where
//! an entry id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

uuid_id!(
    /// Deposit or internal account
    AccountId
);
uuid_id!(
    /// Owner of one or more accounts
    HolderId
);
uuid_id!(
    /// Journal entry (one balanced accounting event)
    EntryId
);
uuid_id!(
    /// Single debit or credit line of an entry
    LineId
);
uuid_id!(
    /// Customer transfer request
    TransferId
);

/// Holder that owns internal accounts (cash vault, fee income, suspense).
pub const SYSTEM_HOLDER_ID: &str = "00000000-0000-0000-0000-000000000001";

impl HolderId {
    /// Same value as [`SYSTEM_HOLDER_ID`]
    pub fn system() -> Self {
        Self(Uuid::from_u128(1))
    }
}
