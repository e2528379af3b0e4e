//! Strongly-typed ID newtypes for domain entities.
//!
//! Machines and users are identified by their relational primary keys. The
//! newtypes keep an `RvmId` from being passed where a `UserId` is expected.
//!
//! # Example
//!
//! ```ignore
//! use myrvm_core::ids::{RvmId, UserId};
//!
//! fn claim(rvm: RvmId, user: UserId) { /* ... */ }
//!
//! claim(RvmId::new(7), UserId::new(42));    // OK
//! // claim(UserId::new(42), RvmId::new(7)); // Compile error! Type mismatch.
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Macro to define a strongly-typed integer ID newtype.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw primary key.
            #[inline]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the inner value.
            #[inline]
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }
    };
}

define_id!(
    /// Reverse vending machine identifier.
    RvmId
);

define_id!(
    /// Platform user identifier.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let id = UserId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!("42".parse::<UserId>().unwrap(), id);
        assert!("abc".parse::<RvmId>().is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&RvmId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: RvmId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RvmId::new(7));
    }

    #[test]
    fn test_debug_names_type() {
        assert_eq!(format!("{:?}", RvmId::new(3)), "RvmId(3)");
    }
}
