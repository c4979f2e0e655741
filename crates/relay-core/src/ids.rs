use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefixed UUIDv7 identifier. Prefixes keep ids of different kinds
/// apart in logs; v7 keeps them time-ordered.
macro_rules! prefixed_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

prefixed_id!(RunId, "run");
prefixed_id!(AgentId, "agent");
prefixed_id!(ToolCallId, "call");
