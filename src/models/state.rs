//! Integer-backed state enums stored on artifact and execution rows.

use serde::{Deserialize, Serialize};

/// Value compiled for a state literal that names no known state. No row ever
/// stores a negative state, so the predicate matches nothing.
pub const UNKNOWN_STATE_SENTINEL: i64 = -1;

macro_rules! stored_state {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident = $value:literal => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const fn as_i32(self) -> i32 {
                match self {
                    $(Self::$variant => $value),+
                }
            }

            pub fn from_i32(value: i32) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Case-insensitive lookup by the stored label (`"LIVE"`, `"RUNNING"`, ...).
            pub fn from_name(name: &str) -> Option<Self> {
                $(
                    if name.eq_ignore_ascii_case($label) {
                        return Some(Self::$variant);
                    }
                )+
                None
            }

            pub const fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }
    };
}

stored_state! {
    /// `Artifact.state`
    ArtifactState {
        Unknown = 0 => "UNKNOWN",
        Pending = 1 => "PENDING",
        Live = 2 => "LIVE",
        MarkedForDeletion = 3 => "MARKED_FOR_DELETION",
        Deleted = 4 => "DELETED",
        Abandoned = 5 => "ABANDONED",
        Reference = 6 => "REFERENCE",
    }
}

stored_state! {
    /// `Execution.last_known_state`
    ExecutionState {
        Unknown = 0 => "UNKNOWN",
        New = 1 => "NEW",
        Running = 2 => "RUNNING",
        Complete = 3 => "COMPLETE",
        Failed = 4 => "FAILED",
        Cached = 5 => "CACHED",
        Canceled = 6 => "CANCELED",
    }
}

/// Translate a state label for the given state column into its stored integer.
/// Unrecognized labels yield [`UNKNOWN_STATE_SENTINEL`].
pub fn state_code(column: &str, label: &str) -> i64 {
    let code = match column {
        "state" => ArtifactState::from_name(label).map(ArtifactState::as_i32),
        "last_known_state" => ExecutionState::from_name(label).map(ExecutionState::as_i32),
        _ => None,
    };
    match code {
        Some(code) => i64::from(code),
        None => {
            tracing::debug!(column, label, "Unrecognized state literal, compiling to empty match");
            UNKNOWN_STATE_SENTINEL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_codes() {
        assert_eq!(ArtifactState::from_name("live"), Some(ArtifactState::Live));
        assert_eq!(ArtifactState::Live.as_i32(), 2);
        assert_eq!(ExecutionState::from_i32(2), Some(ExecutionState::Running));
        assert_eq!(ExecutionState::Canceled.label(), "CANCELED");
    }

    #[test]
    fn unknown_labels_map_to_sentinel() {
        assert_eq!(state_code("state", "NOT_A_STATE"), UNKNOWN_STATE_SENTINEL);
        assert_eq!(state_code("last_known_state", "LIVE"), UNKNOWN_STATE_SENTINEL);
        assert_eq!(state_code("last_known_state", "running"), 2);
    }
}
