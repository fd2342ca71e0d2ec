//! Building, signing and submitting the claiming and reclaiming transactions.
//!
//! The engine enforces the protocol's time gates locally before anything is
//! signed. The chain is the final arbiter, but catching an expired redeem or a
//! premature refund here avoids paying fees for a transaction the validator
//! will reject anyway.

use crate::{
    ledger::{
        AdapterError, KeySigner, LedgerAdapter, RejectReason, SubmissionReceipt, TxMaterial,
    },
    leg::{EscrowLeg, LegState},
    Secret, SecretHash,
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RedeemError {
    #[error("cannot redeem a leg in state {0}")]
    NotLocked(LegState),
    #[error("leg has no lock location")]
    NoLocation,
    #[error("secret does not hash to the leg's commitment {commitment}")]
    InvalidSecret { commitment: SecretHash },
    #[error("redeem window closed: deadline has passed on the ledger")]
    DeadlinePassed,
    #[error("failed to sign redeem transaction: {0}")]
    Signing(#[from] crate::ledger::SigningError),
    #[error("transient ledger failure: {0}")]
    Transient(String),
    #[error("ledger misconfigured: {0}")]
    Configuration(String),
    #[error("chain rejected redeem: {0}")]
    Rejected(RejectReason),
}

#[derive(Debug, thiserror::Error)]
pub enum RefundError {
    #[error("cannot refund a leg in state {0}")]
    NotLocked(LegState),
    #[error("leg has no lock location")]
    NoLocation,
    #[error("refund window not open yet: deadline has not passed on the ledger")]
    DeadlineNotReached,
    #[error("failed to sign refund transaction: {0}")]
    Signing(#[from] crate::ledger::SigningError),
    #[error("transient ledger failure: {0}")]
    Transient(String),
    #[error("ledger misconfigured: {0}")]
    Configuration(String),
    #[error("chain rejected refund: {0}")]
    Rejected(RejectReason),
}

/// Issues claim and reclaim transactions for legs on one ledger.
#[derive(Debug)]
pub struct RedemptionEngine<C, S> {
    connector: Arc<C>,
    signer: Arc<S>,
}

impl<C, S> Clone for RedemptionEngine<C, S> {
    fn clone(&self) -> Self {
        RedemptionEngine {
            connector: Arc::clone(&self.connector),
            signer: Arc::clone(&self.signer),
        }
    }
}

impl<C, S> RedemptionEngine<C, S>
where
    C: LedgerAdapter,
    S: KeySigner,
{
    pub fn new(connector: Arc<C>, signer: Arc<S>) -> Self {
        RedemptionEngine { connector, signer }
    }

    /// Claims a locked leg with the secret.
    ///
    /// The secret is verified against the leg's commitment before signing and
    /// the ledger clock is checked against the deadline. Both checks repeat
    /// what the on-chain validator does; failing early is the point.
    pub async fn redeem(
        &self,
        leg: &EscrowLeg,
        secret: Secret,
    ) -> Result<SubmissionReceipt, RedeemError> {
        if leg.state() != LegState::Locked {
            return Err(RedeemError::NotLocked(leg.state()));
        }
        let location = leg.location().ok_or(RedeemError::NoLocation)?;

        if SecretHash::new(secret) != leg.secret_hash {
            return Err(RedeemError::InvalidSecret {
                commitment: leg.secret_hash,
            });
        }

        let now = self.connector.current_time().await.map_err(map_redeem)?;
        if !leg.can_redeem(now) {
            return Err(RedeemError::DeadlinePassed);
        }

        let material = TxMaterial::Redeem {
            location: *location,
            secret,
            identity: leg.redeem_identity,
        };
        let signed = self.signer.sign(material).await?;

        let receipt = self.connector.submit(signed).await.map_err(map_redeem)?;

        tracing::info!(
            "redeem transaction {} submitted for lock at {}",
            receipt.tx_id,
            location
        );

        Ok(receipt)
    }

    /// Reclaims a locked leg after its deadline.
    pub async fn refund(&self, leg: &EscrowLeg) -> Result<SubmissionReceipt, RefundError> {
        if leg.state() != LegState::Locked {
            return Err(RefundError::NotLocked(leg.state()));
        }
        let location = leg.location().ok_or(RefundError::NoLocation)?;

        let now = self.connector.current_time().await.map_err(map_refund)?;
        if !leg.can_refund(now) {
            return Err(RefundError::DeadlineNotReached);
        }

        let material = TxMaterial::Refund {
            location: *location,
            identity: leg.refund_identity,
        };
        let signed = self.signer.sign(material).await?;

        let receipt = self.connector.submit(signed).await.map_err(map_refund)?;

        tracing::info!(
            "refund transaction {} submitted for lock at {}",
            receipt.tx_id,
            location
        );

        Ok(receipt)
    }
}

fn map_redeem(e: AdapterError) -> RedeemError {
    match e {
        AdapterError::Transient(inner) => RedeemError::Transient(inner),
        AdapterError::Configuration(inner) => RedeemError::Configuration(inner),
        AdapterError::Rejected(RejectReason::Expired) => RedeemError::DeadlinePassed,
        AdapterError::Rejected(reason) => RedeemError::Rejected(reason),
    }
}

fn map_refund(e: AdapterError) -> RefundError {
    match e {
        AdapterError::Transient(inner) => RefundError::Transient(inner),
        AdapterError::Configuration(inner) => RefundError::Configuration(inner),
        AdapterError::Rejected(RejectReason::NotYetExpired) => RefundError::DeadlineNotReached,
        AdapterError::Rejected(reason) => RefundError::Rejected(reason),
    }
}
