//! Newtype wrappers for entity identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using an
//! AssetId where a ScanId is expected) and make the code more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                $name(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

id_type! {
    /// Identifier of a Scan.
    ScanId
}

id_type! {
    /// Identifier of an Asset.
    AssetId
}

id_type! {
    /// Identifier of an AssetScan, the unit of scanning work for one
    /// (Scan, Asset) pair.
    AssetScanId
}

id_type! {
    /// Identifier of a Finding.
    FindingId
}
