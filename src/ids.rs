//! Newtype wrappers for platform snowflake identifiers.
//!
//! These keep a `RoleId` from being handed where a `UserId` is expected and
//! make log output self-describing.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! snowflake {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(n: u64) -> Self {
                $name(n)
            }
        }
    };
}

snowflake!(
    /// A guild member (applicant or staff).
    UserId
);
snowflake!(
    /// A grantable role. Language roles double as the language key.
    RoleId
);
snowflake!(
    /// A text channel.
    ChannelId
);
snowflake!(
    /// A (private) thread.
    ThreadId
);
snowflake!(
    /// A single message within a channel or thread.
    MessageId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_bare_number() {
        assert_eq!(UserId(42).to_string(), "42");
        assert_eq!(ThreadId(9_007_199_254_740_993).to_string(), "9007199254740993");
    }

    #[test]
    fn serde_is_transparent() {
        let id = RoleId(17);
        assert_eq!(serde_json::to_string(&id).unwrap(), "17");
        let back: RoleId = serde_json::from_str("17").unwrap();
        assert_eq!(back, id);
    }
}
