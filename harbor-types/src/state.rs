use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an extension record.
///
/// ```text
/// inactive ──activate──▶ activating ──ok──▶ active ──deactivate──▶ deactivating ──▶ inactive
///                            │                                          │
///                            └───────────fail──────▶ error ◀────fail────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionState {
    #[default]
    Inactive,
    Activating,
    Active,
    Deactivating,
    Error,
}

impl ExtensionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Deactivating => "deactivating",
            Self::Error => "error",
        }
    }

    /// True while a transition is in flight.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Activating | Self::Deactivating)
    }
}

impl fmt::Display for ExtensionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_inactive() {
        assert_eq!(ExtensionState::default(), ExtensionState::Inactive);
    }

    #[test]
    fn display_matches_serde() {
        for state in [
            ExtensionState::Inactive,
            ExtensionState::Activating,
            ExtensionState::Active,
            ExtensionState::Deactivating,
            ExtensionState::Error,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }

    #[test]
    fn transitioning_states() {
        assert!(ExtensionState::Activating.is_transitioning());
        assert!(ExtensionState::Deactivating.is_transitioning());
        assert!(!ExtensionState::Active.is_transitioning());
    }
}
