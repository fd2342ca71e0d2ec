//! Chain watching: confirmation of locks, detection of spends, extraction of
//! the secret from a redeem witness.
//!
//! The revealed secret travelling through a spend witness is the only
//! cross-chain communication channel the protocol has; everything in here
//! serves getting at it reliably.

use crate::{
    ledger::{AdapterError, LedgerAdapter, LegSnapshot, Spend},
    leg::EscrowLeg,
    Secret, SecretHash, Timestamp,
};
use backoff::ExponentialBackoffBuilder;
use std::{sync::Arc, time::Duration};

/// How aggressively to poll the adapter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollSettings {
    /// Pause between state queries while waiting for an on-chain event.
    pub interval: Duration,
    /// Cap on the back-off applied to transient adapter failures.
    pub max_interval: Duration,
    /// Give up retrying a transient failure after this long.
    pub max_elapsed: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            max_elapsed: Some(Duration::from_secs(300)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("leg has no lock location to watch")]
    NoLocation,
    #[error("ledger misconfigured: {0}")]
    Configuration(String),
    #[error("ledger unreachable, retries exhausted: {0}")]
    RetriesExhausted(String),
    #[error("redeem spend {tx_id} carries no witness item hashing to {commitment}")]
    SecretNotInWitness {
        commitment: SecretHash,
        tx_id: String,
    },
    #[error("gave up waiting: ledger time passed {bound}")]
    WaitBoundExceeded { bound: Timestamp },
}

/// Watches one leg's ledger through its adapter.
///
/// Stateless apart from the adapter handle, so cloning is cheap and a single
/// monitor can serve any number of wait calls.
#[derive(Debug)]
pub struct StateMonitor<C> {
    connector: Arc<C>,
    settings: PollSettings,
}

impl<C> Clone for StateMonitor<C> {
    fn clone(&self) -> Self {
        StateMonitor {
            connector: Arc::clone(&self.connector),
            settings: self.settings,
        }
    }
}

impl<C> StateMonitor<C>
where
    C: LedgerAdapter,
{
    pub fn new(connector: Arc<C>, settings: PollSettings) -> Self {
        StateMonitor {
            connector,
            settings,
        }
    }

    /// One state query, transient failures retried with back-off.
    pub async fn snapshot(&self, leg: &EscrowLeg) -> Result<LegSnapshot, MonitorError> {
        let location = leg.location().ok_or(MonitorError::NoLocation)?;

        let operation = || async {
            self.connector
                .lock_state(location)
                .await
                .map_err(|e| match e {
                    AdapterError::Transient(_) => backoff::Error::transient(e),
                    _ => backoff::Error::permanent(e),
                })
        };

        backoff::future::retry_notify(self.transient_backoff(), operation, |e, _| {
            tracing::warn!("failed to query lock at {}, retrying ...: {:#}", location, e)
        })
        .await
        .map_err(|e| match e {
            AdapterError::Transient(inner) => MonitorError::RetriesExhausted(inner),
            AdapterError::Configuration(inner) => MonitorError::Configuration(inner),
            AdapterError::Rejected(reason) => MonitorError::Configuration(reason.to_string()),
        })
    }

    /// Resolves once the leg's lock has reached confirmation depth.
    ///
    /// Returns [`MonitorError::WaitBoundExceeded`] if ledger time passes
    /// `bound` first, which callers use to stop waiting for a lock that is
    /// never going to confirm.
    pub async fn wait_for_locked(
        &self,
        leg: &EscrowLeg,
        bound: Timestamp,
    ) -> Result<(), MonitorError> {
        loop {
            if self.snapshot(leg).await?.confirmed {
                return Ok(());
            }

            if self.chain_time().await? >= bound {
                return Err(MonitorError::WaitBoundExceeded { bound });
            }

            tokio::time::sleep(self.settings.interval).await;
        }
    }

    /// Resolves once the leg's lock has been spent, either way.
    pub async fn wait_for_spend(
        &self,
        leg: &EscrowLeg,
        bound: Timestamp,
    ) -> Result<Spend, MonitorError> {
        loop {
            if let Some(spend) = self.snapshot(leg).await?.spend {
                return Ok(spend);
            }

            if self.chain_time().await? >= bound {
                return Err(MonitorError::WaitBoundExceeded { bound });
            }

            tokio::time::sleep(self.settings.interval).await;
        }
    }

    /// Resolves once the leg's ledger clock reaches `expiry`.
    pub async fn wait_until_expired(&self, expiry: Timestamp) -> Result<(), MonitorError> {
        loop {
            let now = self.chain_time().await?;
            if now >= expiry {
                return Ok(());
            }

            // No point polling faster than the remaining time, but stay
            // responsive for short deadlines.
            let remaining = Duration::from_secs(u64::from(now.seconds_until(expiry)));
            tokio::time::sleep(remaining.min(self.settings.interval).max(Duration::from_millis(10)))
                .await;
        }
    }

    /// The ledger's own clock, transient failures retried with back-off.
    pub async fn chain_time(&self) -> Result<Timestamp, MonitorError> {
        let operation = || async {
            self.connector.current_time().await.map_err(|e| match e {
                AdapterError::Transient(_) => backoff::Error::transient(e),
                _ => backoff::Error::permanent(e),
            })
        };

        backoff::future::retry_notify(self.transient_backoff(), operation, |e, _| {
            tracing::warn!("failed to fetch ledger time, retrying ...: {:#}", e)
        })
        .await
        .map_err(|e| match e {
            AdapterError::Transient(inner) => MonitorError::RetriesExhausted(inner),
            AdapterError::Configuration(inner) => MonitorError::Configuration(inner),
            AdapterError::Rejected(reason) => MonitorError::Configuration(reason.to_string()),
        })
    }

    fn transient_backoff(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.settings.interval)
            .with_max_interval(self.settings.max_interval)
            .with_max_elapsed_time(self.settings.max_elapsed)
            .build()
    }
}

/// Finds the secret in a spend's witness items by hashing each candidate
/// against the commitment. Identity checks on witness bytes prove nothing;
/// only the hash does.
pub fn extract_secret(spend: &Spend, commitment: &SecretHash) -> Option<Secret> {
    spend
        .witness
        .iter()
        .find_map(|item| match Secret::from_vec(item) {
            Ok(secret) if SecretHash::new(secret) == *commitment => Some(secret),
            Ok(_) => None,
            Err(_) => None,
        })
}

/// Like [`extract_secret`] but treats absence as the fatal condition it is:
/// a redeem spend without the secret means the counterparty's chain accepted
/// something we cannot learn from.
pub fn secret_from_spend(spend: &Spend, commitment: &SecretHash) -> Result<Secret, MonitorError> {
    extract_secret(spend, commitment).ok_or_else(|| MonitorError::SecretNotInWitness {
        commitment: *commitment,
        tx_id: spend.tx_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SpendKind;
    use spectral::prelude::*;

    fn redeem_spend(witness: Vec<Vec<u8>>) -> Spend {
        Spend {
            kind: SpendKind::Redeem,
            witness,
            tx_id: "deadbeef".to_string(),
        }
    }

    #[test]
    fn extract_secret_finds_the_preimage_among_witness_items() {
        let secret = Secret::from(*b"hello world, you are beautiful!!");
        let commitment = SecretHash::new(secret);

        let spend = redeem_spend(vec![
            vec![0x01, 0x02],
            secret.as_raw_secret().to_vec(),
            vec![0xff; 64],
        ]);

        assert_that(&extract_secret(&spend, &commitment)).is_some().is_equal_to(secret);
    }

    #[test]
    fn extract_secret_rejects_a_preimage_with_the_wrong_hash() {
        let secret = Secret::from(*b"hello world, you are beautiful!!");
        let other_commitment =
            SecretHash::new(Secret::from(*b"a totally different secret here!"));

        let spend = redeem_spend(vec![secret.as_raw_secret().to_vec()]);

        assert_that(&extract_secret(&spend, &other_commitment)).is_none();
    }

    #[test]
    fn extract_secret_ignores_witness_items_of_the_wrong_length() {
        let commitment = SecretHash::new(Secret::from(*b"hello world, you are beautiful!!"));

        let spend = redeem_spend(vec![vec![0x01; 16], vec![0x02; 48]]);

        assert_that(&extract_secret(&spend, &commitment)).is_none();
    }

    #[test]
    fn secret_from_spend_reports_the_offending_transaction() {
        let commitment = SecretHash::new(Secret::from(*b"hello world, you are beautiful!!"));

        let spend = redeem_spend(vec![]);
        let error = secret_from_spend(&spend, &commitment).unwrap_err();

        match error {
            MonitorError::SecretNotInWitness { tx_id, .. } => {
                assert_eq!(tx_id, "deadbeef");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
