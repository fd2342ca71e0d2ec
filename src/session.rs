//! The swap session: both legs plus the shared commitment and timelocks.
//!
//! A session's overall state is never stored, it is derived from the two leg
//! states. That keeps the database trivially consistent: there is no second
//! copy of the truth to drift.

use crate::{
    leg::{EscrowLeg, LegState},
    ledger::LedgerKind,
    window::TimelockWindow,
    SecretHash, Side, SwapId, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Why two legs cannot form a session together.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("{0} leg is not locked on the session's commitment")]
    CommitmentMismatch(Side),
    #[error("{0} leg's expiry does not match the timelock window")]
    ExpiryMismatch(Side),
    #[error("both legs live on the same ledger")]
    SameLedger,
}

/// Overall progress of a swap, derived from the leg states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum SessionState {
    Created,
    AlphaLockPending,
    AlphaLocked,
    BetaLockPending,
    BothLocked,
    /// The secret is public: beta has been redeemed.
    SecretRevealed,
    Complete,
    /// Alpha came back to its owner; nobody lost funds.
    FailedRefundedAlpha,
    /// Alpha's deadline passed while it was still locked and nobody claimed
    /// it. The funds have not moved; this is not a refund.
    FailedAlphaExpired,
    /// The secret was revealed on beta but alpha expired unclaimed. The
    /// initiator paid and received nothing.
    FailedSecretRevealedNoRedeem,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Complete
                | SessionState::FailedRefundedAlpha
                | SessionState::FailedAlphaExpired
                | SessionState::FailedSecretRevealedNoRedeem
        )
    }
}

/// A leg whose funds are still at stake, for operator reporting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedLeg {
    pub side: Side,
    pub ledger: LedgerKind,
    pub state: LegState,
    pub deadline: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwapSession {
    id: SwapId,
    secret_hash: SecretHash,
    window: TimelockWindow,
    alpha: EscrowLeg,
    beta: EscrowLeg,
    created_at: Timestamp,
}

impl SwapSession {
    /// Forms a session out of two legs, rejecting any pair that would not be
    /// atomic.
    pub fn new(
        id: SwapId,
        secret_hash: SecretHash,
        window: TimelockWindow,
        alpha: EscrowLeg,
        beta: EscrowLeg,
        created_at: Timestamp,
    ) -> Result<Self, InvariantViolation> {
        if alpha.secret_hash != secret_hash {
            return Err(InvariantViolation::CommitmentMismatch(Side::Alpha));
        }
        if beta.secret_hash != secret_hash {
            return Err(InvariantViolation::CommitmentMismatch(Side::Beta));
        }
        if alpha.expiry != window.alpha_expiry() {
            return Err(InvariantViolation::ExpiryMismatch(Side::Alpha));
        }
        if beta.expiry != window.beta_expiry() {
            return Err(InvariantViolation::ExpiryMismatch(Side::Beta));
        }
        if alpha.ledger == beta.ledger {
            return Err(InvariantViolation::SameLedger);
        }

        Ok(SwapSession {
            id,
            secret_hash,
            window,
            alpha,
            beta,
            created_at,
        })
    }

    pub fn id(&self) -> SwapId {
        self.id
    }

    pub fn secret_hash(&self) -> SecretHash {
        self.secret_hash
    }

    pub fn window(&self) -> TimelockWindow {
        self.window
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn leg(&self, side: Side) -> &EscrowLeg {
        match side {
            Side::Alpha => &self.alpha,
            Side::Beta => &self.beta,
        }
    }

    pub fn leg_mut(&mut self, side: Side) -> &mut EscrowLeg {
        match side {
            Side::Alpha => &mut self.alpha,
            Side::Beta => &mut self.beta,
        }
    }

    /// Derives the session state from the leg states.
    ///
    /// Total over all 36 combinations; combinations the protocol never
    /// produces still map to the nearest honest description.
    pub fn state(&self) -> SessionState {
        use LegState::*;

        match (self.alpha.state(), self.beta.state()) {
            (Redeemed, Redeemed) => SessionState::Complete,
            (ExpiredUnclaimed, Redeemed) => SessionState::FailedSecretRevealedNoRedeem,
            (Refunded, _) => SessionState::FailedRefundedAlpha,
            (ExpiredUnclaimed, _) => SessionState::FailedAlphaExpired,
            (_, Redeemed) => SessionState::SecretRevealed,
            (Locked, Locked) => SessionState::BothLocked,
            (Locked, LockSubmitted) => SessionState::BetaLockPending,
            (Locked, _) => SessionState::AlphaLocked,
            (LockSubmitted, _) => SessionState::AlphaLockPending,
            (Pending, _) => SessionState::Created,
            (Redeemed, _) => SessionState::SecretRevealed,
        }
    }

    /// Legs whose funds have not reached a safe resting place.
    pub fn unresolved_legs(&self) -> Vec<UnresolvedLeg> {
        [Side::Alpha, Side::Beta]
            .iter()
            .filter_map(|&side| {
                let leg = self.leg(side);
                match leg.state() {
                    LegState::LockSubmitted | LegState::Locked | LegState::ExpiredUnclaimed => {
                        Some(UnresolvedLeg {
                            side,
                            ledger: leg.ledger,
                            state: leg.state(),
                            deadline: leg.expiry,
                        })
                    }
                    LegState::Pending | LegState::Redeemed | LegState::Refunded => None,
                }
            })
            .collect()
    }
}
