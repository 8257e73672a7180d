//! Per-attempt browser SSO state machine using rust-fsm.
//!
//! ```text
//!              CachedTokenFound
//!   Started ─────────────────────────────────► TokenReceived
//!      │                                             ▲
//!      │ ListenerReady                               │ CallbackAccepted
//!      ▼                                             │
//!   AwaitingCallback ────────────────────────────────┘
//!      │  │
//!      │  └─ CallbackRejected ──► Failed ◄── SetupFailed (from Started)
//!      └──── WaitExpired ───────► TimedOut
//! ```
//!
//! `TokenReceived`, `TimedOut` and `Failed` are terminal.

use crate::{AuthError, AuthResult};
use rust_fsm::*;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub sso_machine(Started)

    Started => {
        CachedTokenFound => TokenReceived,
        ListenerReady => AwaitingCallback,
        SetupFailed => Failed
    },
    AwaitingCallback => {
        CallbackAccepted => TokenReceived,
        CallbackRejected => Failed,
        WaitExpired => TimedOut
    }
}

pub use sso_machine::Input as SsoMachineInput;
pub use sso_machine::State as SsoMachineState;
pub use sso_machine::StateMachine as SsoMachine;

/// One authentication attempt. Created per call and never reused.
pub struct SsoAttempt {
    machine: SsoMachine,
}

impl SsoAttempt {
    /// A fresh attempt in `Started`.
    pub fn new() -> Self {
        Self {
            machine: SsoMachine::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> &SsoMachineState {
        self.machine.state()
    }

    /// Whether the attempt has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state(),
            SsoMachineState::TokenReceived | SsoMachineState::TimedOut | SsoMachineState::Failed
        )
    }

    /// Apply `input`, rejecting transitions the diagram does not allow.
    pub fn advance(&mut self, input: SsoMachineInput) -> AuthResult<()> {
        let from = self.state().clone();
        self.machine.consume(&input).map_err(|_| {
            AuthError::InvalidStateTransition(format!("{:?} does not accept {:?}", from, input))
        })?;
        tracing::debug!(from = ?from, to = ?self.state(), "SSO attempt transition");
        Ok(())
    }

    /// Map a wait outcome onto the matching transition.
    pub fn record_wait_outcome<T>(&mut self, outcome: &AuthResult<T>) -> AuthResult<()> {
        let input = match outcome {
            Ok(_) => SsoMachineInput::CallbackAccepted,
            Err(AuthError::Timeout(_)) => SsoMachineInput::WaitExpired,
            Err(_) => SsoMachineInput::CallbackRejected,
        };
        self.advance(input)
    }
}

impl std::fmt::Debug for SsoAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoAttempt").field("state", self.state()).finish()
    }
}

impl Default for SsoAttempt {
    fn default() -> Self {
        Self::new()
    }
}
