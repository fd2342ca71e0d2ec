//! One side of the swap: the escrow leg and its lifecycle state machine.

use crate::{
    htlc_location::LockLocation,
    identity::Identity,
    ledger::{Amount, LedgerKind},
    SecretHash, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Lifecycle of a leg.
///
/// `LockSubmitted -> Locked` is driven exclusively by monitor confirmation; a
/// submitted lock can still be dropped or rejected by the ledger.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize,
    strum_macros::Display, strum_macros::EnumString,
)]
pub enum LegState {
    Pending,
    LockSubmitted,
    Locked,
    Redeemed,
    Refunded,
    /// The deadline passed while the leg was still locked and nobody claimed
    /// it. Terminal, and a signal of value at risk.
    ExpiredUnclaimed,
}

impl LegState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LegState::Redeemed | LegState::Refunded | LegState::ExpiredUnclaimed
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
#[error("illegal leg transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: LegState,
    pub to: LegState,
}

/// One side's lock: what is locked, for whom, until when, and where.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscrowLeg {
    pub ledger: LedgerKind,
    pub amount: Amount,
    pub secret_hash: SecretHash,
    /// Who may claim with the secret before the deadline.
    pub redeem_identity: Identity,
    /// Who may reclaim after the deadline.
    pub refund_identity: Identity,
    /// Absolute deadline in the leg's own ledger time.
    pub expiry: Timestamp,
    location: Option<LockLocation>,
    state: LegState,
}

impl EscrowLeg {
    pub fn new(
        ledger: LedgerKind,
        amount: Amount,
        secret_hash: SecretHash,
        redeem_identity: Identity,
        refund_identity: Identity,
        expiry: Timestamp,
    ) -> Self {
        EscrowLeg {
            ledger,
            amount,
            secret_hash,
            redeem_identity,
            refund_identity,
            expiry,
            location: None,
            state: LegState::Pending,
        }
    }

    pub fn state(&self) -> LegState {
        self.state
    }

    pub fn location(&self) -> Option<&LockLocation> {
        self.location.as_ref()
    }

    /// Redemption is only valid on a locked leg before its deadline.
    pub fn can_redeem(&self, now: Timestamp) -> bool {
        self.state == LegState::Locked && now < self.expiry
    }

    /// Refund is only valid on a locked leg once its deadline has passed.
    pub fn can_refund(&self, now: Timestamp) -> bool {
        self.state == LegState::Locked && now >= self.expiry
    }

    /// The lock transaction went out; remember where the funds will sit.
    pub fn lock_submitted(
        &mut self,
        location: Option<LockLocation>,
    ) -> Result<(), IllegalTransition> {
        self.transition(LegState::Pending, LegState::LockSubmitted)?;
        if location.is_some() {
            self.location = location;
        }
        Ok(())
    }

    /// The monitor confirmed the lock on-chain.
    pub fn lock_confirmed(&mut self) -> Result<(), IllegalTransition> {
        self.transition(LegState::LockSubmitted, LegState::Locked)
    }

    pub fn redeemed(&mut self) -> Result<(), IllegalTransition> {
        self.transition(LegState::Locked, LegState::Redeemed)
    }

    pub fn refunded(&mut self) -> Result<(), IllegalTransition> {
        self.transition(LegState::Locked, LegState::Refunded)
    }

    pub fn expired_unclaimed(&mut self) -> Result<(), IllegalTransition> {
        self.transition(LegState::Locked, LegState::ExpiredUnclaimed)
    }

    fn transition(&mut self, from: LegState, to: LegState) -> Result<(), IllegalTransition> {
        if self.state != from {
            return Err(IllegalTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}
