//! Per-session payment state.
//!
//! # States
//!
//! - `Created`: the user reached the payment step, nothing credited yet
//! - `Accumulating`: at least one coin credited, below the required amount
//! - `Complete`: the balance covers the required amount
//! - `Cancelled`: the user backed out; the balance was refunded to zero
//!
//! # Valid Transitions
//!
//! - Created → Accumulating → Complete
//! - Accumulating → Accumulating (each further coin)
//! - Created/Accumulating → Cancelled
//!
//! `Complete` and `Cancelled` are left only by destroying the session.

use crate::error::{PaymentError, PaymentResult};
use chrono::{DateTime, Utc};
use coinbox_core::{SessionId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Accumulating,
    Complete,
    Cancelled,
}

impl SessionState {
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Created, SessionState::Accumulating | SessionState::Cancelled)
                | (
                    SessionState::Accumulating,
                    SessionState::Accumulating | SessionState::Complete | SessionState::Cancelled
                )
        )
    }

    /// Whether only destruction can follow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Accumulating => "accumulating",
            SessionState::Complete => "complete",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A user's payment in progress, bound to a web session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    session_id: SessionId,
    user_id: UserId,
    required_amount: Decimal,
    state: SessionState,
    created_at: DateTime<Utc>,
}

impl PaymentSession {
    /// # Errors
    ///
    /// `InvalidAmount` if `required_amount` is not positive.
    pub fn new(
        session_id: SessionId,
        user_id: UserId,
        required_amount: Decimal,
    ) -> PaymentResult<Self> {
        if required_amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(format!(
                "Required amount must be positive, got {required_amount}"
            )));
        }

        Ok(Self {
            session_id,
            user_id,
            required_amount,
            state: SessionState::Created,
            created_at: Utc::now(),
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn required_amount(&self) -> Decimal {
        self.required_amount
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    /// Move the session forward to match a committed balance.
    ///
    /// A positive balance leaves `Created`; a balance covering the required
    /// amount reaches `Complete`. A lower balance never moves a session
    /// back, and a complete session stays complete.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` if the session was cancelled.
    pub fn apply_balance(&mut self, balance: Decimal) -> PaymentResult<SessionState> {
        match self.state {
            SessionState::Cancelled => return Err(self.invalid("accept credit")),
            SessionState::Complete => return Ok(self.state),
            SessionState::Created if balance <= Decimal::ZERO => return Ok(self.state),
            _ => {}
        }

        self.transition_to(SessionState::Accumulating)?;
        if balance >= self.required_amount {
            self.transition_to(SessionState::Complete)?;
        }

        Ok(self.state)
    }

    /// Mark the session cancelled. Cancelling twice is a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` if the session is complete.
    pub fn cancel(&mut self) -> PaymentResult<()> {
        if self.state == SessionState::Cancelled {
            return Ok(());
        }
        self.transition_to(SessionState::Cancelled)
    }

    /// Undo a cancellation whose refund did not commit.
    pub(crate) fn restore_state(&mut self, state: SessionState) {
        self.state = state;
    }

    fn transition_to(&mut self, target: SessionState) -> PaymentResult<()> {
        if self.state == target && target != SessionState::Accumulating {
            return Ok(());
        }
        if !self.state.can_transition_to(&target) {
            return Err(self.invalid(match target {
                SessionState::Cancelled => "be cancelled",
                _ => "accept credit",
            }));
        }
        self.state = target;
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> PaymentError {
        PaymentError::InvalidTransition {
            session_id: self.session_id.clone(),
            state: self.state,
            action,
        }
    }
}
