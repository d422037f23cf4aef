use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Enumerates supported `AppStatus` values.
pub enum AppStatus {
    Installing,
    Installed,
    Active,
    Suspended,
    Updating,
    Error,
}

impl AppStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Updating => "updating",
            Self::Error => "error",
        }
    }

    /// State machine edges: installing → installed ⇄ active ⇄ suspended,
    /// updating → installed, any non-terminal state → error, and error back
    /// to installed on a subsequent successful set.
    pub fn can_transition_to(self, next: AppStatus) -> bool {
        match (self, next) {
            (Self::Installing, Self::Installed) => true,
            (Self::Installed, Self::Active | Self::Updating) => true,
            (Self::Active, Self::Installed | Self::Suspended) => true,
            (Self::Suspended, Self::Active | Self::Installed) => true,
            (Self::Updating, Self::Installed) => true,
            (Self::Error, Self::Installed) => true,
            (state, Self::Error) => state != Self::Error,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Enumerates supported `AppSource` values.
pub enum AppSource {
    Local,
    Remote,
}

impl AppSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_status_transitions_follow_state_machine() {
        assert!(AppStatus::Installing.can_transition_to(AppStatus::Installed));
        assert!(AppStatus::Installed.can_transition_to(AppStatus::Active));
        assert!(AppStatus::Active.can_transition_to(AppStatus::Suspended));
        assert!(AppStatus::Suspended.can_transition_to(AppStatus::Active));
        assert!(AppStatus::Updating.can_transition_to(AppStatus::Installed));

        assert!(!AppStatus::Installing.can_transition_to(AppStatus::Active));
        assert!(!AppStatus::Installed.can_transition_to(AppStatus::Suspended));
        assert!(!AppStatus::Updating.can_transition_to(AppStatus::Active));
    }

    #[test]
    fn unit_error_state_is_recoverable_but_not_reentrant() {
        assert!(AppStatus::Installing.can_transition_to(AppStatus::Error));
        assert!(AppStatus::Active.can_transition_to(AppStatus::Error));
        assert!(AppStatus::Error.can_transition_to(AppStatus::Installed));
        assert!(!AppStatus::Error.can_transition_to(AppStatus::Error));
        assert!(!AppStatus::Error.can_transition_to(AppStatus::Active));
    }
}
