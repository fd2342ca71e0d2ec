//! The capability interface the coordinator consumes for each chain.
//!
//! A [`LedgerAdapter`] knows how to query the state of a lock, submit signed
//! transaction material and report its ledger's notion of current time. It is
//! a stateless service handle, safe to share between concurrently running
//! sessions. Transaction encoding, fee calculation and script compilation all
//! live behind this interface.

use crate::{
    htlc_location::LockLocation, identity::Identity, Secret, SecretHash, Timestamp,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two ledger models a leg can live on.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
    strum_macros::Display, strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LedgerKind {
    /// UTXO ledger with script-governed outputs (datum/redeemer model).
    Cardano,
    /// Account ledger with stateful contracts.
    Ethereum,
}

/// An amount of the ledger's base unit (lovelace, wei).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const fn from_base_units(units: u64) -> Self {
        Amount(units)
    }

    pub fn as_base_units(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What an adapter reports about a lock when queried.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegSnapshot {
    /// The lock transaction has reached the adapter's configured confirmation
    /// depth. A submitted lock that was dropped or rejected never confirms.
    pub confirmed: bool,
    /// Present once the lock has been spent, either way.
    pub spend: Option<Spend>,
}

/// An observed spend of a leg's lock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spend {
    pub kind: SpendKind,
    /// The spending transaction's witness items (redeemer fields or
    /// calldata words). For a redeem spend, one of these is the secret.
    pub witness: Vec<Vec<u8>>,
    pub tx_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SpendKind {
    Redeem,
    Refund,
}

/// Unsigned transaction material, shaped per operation but opaque to the
/// coordinator beyond construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TxMaterial {
    Lock {
        ledger: LedgerKind,
        amount: Amount,
        secret_hash: SecretHash,
        redeem_identity: Identity,
        refund_identity: Identity,
        expiry: Timestamp,
    },
    Redeem {
        location: LockLocation,
        secret: Secret,
        identity: Identity,
    },
    Refund {
        location: LockLocation,
        identity: Identity,
    },
}

impl TxMaterial {
    /// The identity whose key must sign this material.
    pub fn signing_identity(&self) -> &Identity {
        match self {
            TxMaterial::Lock {
                refund_identity, ..
            } => refund_identity,
            TxMaterial::Redeem { identity, .. } => identity,
            TxMaterial::Refund { identity, .. } => identity,
        }
    }
}

/// Transaction material together with the signature produced by a
/// [`KeySigner`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedMaterial {
    pub material: TxMaterial,
    pub signature: Vec<u8>,
}

/// Returned by a successful submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub tx_id: String,
    /// For lock submissions, where the funds will sit once confirmed.
    pub location: Option<LockLocation>,
}

/// Why a chain rejected a submission.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[strum(serialize = "secret does not hash to the committed value")]
    InvalidSecret,
    #[strum(serialize = "timelock has already expired")]
    Expired,
    #[strum(serialize = "timelock has not yet expired")]
    NotYetExpired,
    #[strum(serialize = "lock is already spent")]
    AlreadySpent,
    #[strum(serialize = "insufficient funds")]
    InsufficientFunds,
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Network or API hiccup, worth retrying with back-off.
    #[error("transient ledger failure: {0}")]
    Transient(String),
    /// Bad address, unknown chain, malformed request. Retrying cannot help.
    #[error("ledger misconfigured: {0}")]
    Configuration(String),
    /// The chain itself refused the submission.
    #[error("submission rejected: {0}")]
    Rejected(RejectReason),
}

#[async_trait]
pub trait LedgerAdapter: Send + Sync + 'static {
    fn kind(&self) -> LedgerKind;

    /// Queries the current state of the lock at `location`.
    async fn lock_state(&self, location: &LockLocation) -> Result<LegSnapshot, AdapterError>;

    /// Submits signed material to the ledger.
    ///
    /// A returned receipt means the transaction was accepted into the mempool,
    /// nothing more; only a confirmed [`LegSnapshot`] proves anything.
    async fn submit(&self, signed: SignedMaterial) -> Result<SubmissionReceipt, AdapterError>;

    /// The ledger's own notion of current time, as used by its timelock
    /// opcodes or contract checks.
    async fn current_time(&self) -> Result<Timestamp, AdapterError>;
}

#[derive(Debug, thiserror::Error)]
#[error("failed to sign transaction material: {0}")]
pub struct SigningError(pub String);

/// Capability of whichever party is issuing a transaction to sign it.
///
/// Key management lives entirely behind this trait.
#[async_trait]
pub trait KeySigner: Send + Sync + 'static {
    async fn sign(&self, material: TxMaterial) -> Result<SignedMaterial, SigningError>;
}
