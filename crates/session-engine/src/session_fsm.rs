//! Session state machine using rust-fsm.
//!
//! ```text
//!            ┌──────────┐
//!            │ Loading  │ (initial, never re-entered)
//!            └────┬─────┘
//!   CredentialsFound   CredentialsMissing
//!        ▼                  ▼
//! ┌───────────────┐   ┌─────────────────┐
//! │ Authenticated │◄─►│ Unauthenticated │
//! └───────────────┘   └─────────────────┘
//! ```
//!
//! Both terminal states accept both inputs, so logout and re-sync are
//! reachable from anywhere.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Loading)

    Loading => {
        CredentialsFound => Authenticated,
        CredentialsMissing => Unauthenticated
    },
    Authenticated => {
        CredentialsFound => Authenticated,
        CredentialsMissing => Unauthenticated
    },
    Unauthenticated => {
        CredentialsFound => Authenticated,
        CredentialsMissing => Unauthenticated
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Session status as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Loading,
    Authenticated,
    Unauthenticated,
}

impl SessionStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionStatus::Authenticated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Loading => "loading",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Unauthenticated => "unauthenticated",
        }
    }
}

impl From<&SessionMachineState> for SessionStatus {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Loading => SessionStatus::Loading,
            SessionMachineState::Authenticated => SessionStatus::Authenticated,
            SessionMachineState::Unauthenticated => SessionStatus::Unauthenticated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_loading() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::Loading);
    }

    #[test]
    fn test_hydrate_to_either_terminal_state() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::CredentialsFound).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);

        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::CredentialsMissing).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_terminal_states_are_reentrant() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::CredentialsMissing).unwrap();
        machine.consume(&SessionMachineInput::CredentialsMissing).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);

        machine.consume(&SessionMachineInput::CredentialsFound).unwrap();
        machine.consume(&SessionMachineInput::CredentialsFound).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);

        machine.consume(&SessionMachineInput::CredentialsMissing).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            SessionStatus::from(&SessionMachineState::Loading),
            SessionStatus::Loading
        );
        assert!(SessionStatus::from(&SessionMachineState::Authenticated).is_authenticated());
        assert_eq!(SessionStatus::Unauthenticated.as_str(), "unauthenticated");
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Authenticated).unwrap(),
            "\"authenticated\""
        );
    }
}
