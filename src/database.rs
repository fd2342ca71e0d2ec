//! Session persistence.
//!
//! Every leg transition is flushed to disk before the coordinator acts on it,
//! so a crashed process can pick a swap back up from the last durable state.
//! Secrets are never written here; a resumed session re-learns the secret from
//! the beta ledger like everybody else.

use crate::{session::SwapSession, SwapId};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

/// How an archived session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum SessionOutcome {
    Completed,
    FailedRefundedAlpha,
    /// Alpha expired while still locked; its funds never moved.
    FailedAlphaExpired,
    FailedSecretRevealedNoRedeem,
    /// The operator aborted before any funds were locked.
    AbortedEarly,
}

/// What is stored per swap: the session itself plus, once it is over, how it
/// ended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: SwapSession,
    pub outcome: Option<SessionOutcome>,
}

impl SessionRecord {
    pub fn active(session: SwapSession) -> Self {
        SessionRecord {
            session,
            outcome: None,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.outcome.is_some()
    }
}

#[derive(Debug)]
pub struct Database {
    db: sled::Db,
    #[cfg(test)]
    tmp_dir: tempfile::TempDir,
}

impl Database {
    #[cfg(not(test))]
    pub fn new(path: &std::path::Path) -> anyhow::Result<Self> {
        let path = path
            .to_str()
            .ok_or_else(|| anyhow!("The path is not utf-8 valid: {:?}", path))?;
        let db = sled::open(path).with_context(|| format!("Could not open the DB at {}", path))?;

        Ok(Database { db })
    }

    #[cfg(test)]
    pub fn new_test() -> anyhow::Result<Self> {
        let tmp_dir = tempfile::TempDir::new().unwrap();
        let db = sled::open(tmp_dir.path())
            .with_context(|| format!("Could not open the DB at {}", tmp_dir.path().display()))?;

        Ok(Database { db, tmp_dir })
    }

    /// Stores a new session. Refuses to overwrite an existing one.
    pub async fn insert_session(&self, session: SwapSession) -> anyhow::Result<()> {
        let key = serialize(&session.id())?;
        let value = serialize(&SessionRecord::active(session))
            .context("Could not serialize new session record")?;

        self.db
            .compare_and_swap(key, Option::<Vec<u8>>::None, Some(value))
            .context("Could not write in the DB")?
            .map_err(|_| anyhow!("Session is already stored"))?;

        self.flush().await
    }

    /// Persists the current state of an in-flight session.
    pub async fn update_session(&self, session: &SwapSession) -> anyhow::Result<()> {
        let record = self.get_record(&session.id())?;
        if record.is_archived() {
            return Err(anyhow!("Session {} is already archived", session.id()));
        }

        let key = serialize(&session.id())?;
        let value = serialize(&SessionRecord {
            session: session.clone(),
            outcome: None,
        })?;
        self.db.insert(key, value)?;

        self.flush().await
    }

    /// Marks a session as over, keeping it for the operator's records.
    pub async fn archive_session(
        &self,
        session: &SwapSession,
        outcome: SessionOutcome,
    ) -> anyhow::Result<()> {
        let key = serialize(&session.id())?;
        let value = serialize(&SessionRecord {
            session: session.clone(),
            outcome: Some(outcome),
        })?;
        self.db.insert(key, value)?;

        self.flush().await
    }

    pub fn load_session(&self, swap_id: &SwapId) -> anyhow::Result<SessionRecord> {
        self.get_record(swap_id)
    }

    pub fn all_sessions(&self) -> anyhow::Result<Vec<SessionRecord>> {
        self.db
            .iter()
            .filter_map(|item| match item {
                Ok((key, value)) => {
                    let swap_id = deserialize::<SwapId>(&key);
                    let record = deserialize::<SessionRecord>(&value)
                        .context("Could not deserialize session record");

                    match (swap_id, record) {
                        (Ok(_), Ok(record)) => Some(Ok(record)),
                        (Ok(_), Err(err)) => Some(Err(err)),
                        (..) => None, // This is not a session item
                    }
                }
                Err(err) => Some(Err(err).context("Could not retrieve data")),
            })
            .collect()
    }

    /// Sessions that still need driving after a restart.
    pub fn unfinished_sessions(&self) -> anyhow::Result<Vec<SwapSession>> {
        Ok(self
            .all_sessions()?
            .into_iter()
            .filter(|record| !record.is_archived())
            .map(|record| record.session)
            .collect())
    }

    pub async fn remove_session(&self, swap_id: &SwapId) -> anyhow::Result<()> {
        let key = serialize(swap_id)?;

        self.db
            .remove(key)
            .with_context(|| format!("Could not delete session {}", swap_id))
            .map(|_| ())?;

        self.flush().await
    }

    fn get_record(&self, swap_id: &SwapId) -> anyhow::Result<SessionRecord> {
        let key = serialize(swap_id)?;

        let record = self
            .db
            .get(&key)?
            .ok_or_else(|| anyhow!("Session does not exist {}", swap_id))?;

        deserialize(&record).context("Could not deserialize session record")
    }

    async fn flush(&self) -> anyhow::Result<()> {
        self.db
            .flush_async()
            .await
            .map(|_| ())
            .context("Could not flush db")
    }
}

pub fn serialize<T>(t: &T) -> anyhow::Result<Vec<u8>>
where
    T: Serialize,
{
    Ok(serde_cbor::to_vec(t)?)
}

pub fn deserialize<'a, T>(v: &'a [u8]) -> anyhow::Result<T>
where
    T: Deserialize<'a>,
{
    Ok(serde_cbor::from_slice(v)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        identity,
        ledger::{Amount, LedgerKind},
        leg::EscrowLeg,
        window::TimelockWindow,
        Secret, SecretHash, Side, Timestamp,
    };
    use std::{str::FromStr, time::Duration};

    fn session() -> SwapSession {
        let secret_hash = SecretHash::new(Secret::from(*b"hello world, you are beautiful!!"));
        let window = TimelockWindow::new(
            Timestamp::from(86_400),
            Timestamp::from(43_200),
            Duration::from_secs(3600),
        )
        .unwrap();

        let alpha = EscrowLeg::new(
            LedgerKind::Cardano,
            Amount::from_base_units(3_000_000),
            secret_hash,
            identity::Cardano::from_str(
                "00112233445566778899aabbccddeeff00112233445566778899aabb",
            )
            .unwrap()
            .into(),
            identity::Cardano::from_str(
                "ffeeddccbbaa99887766554433221100ffeeddccbbaa998877665544",
            )
            .unwrap()
            .into(),
            window.alpha_expiry(),
        );
        let beta = EscrowLeg::new(
            LedgerKind::Ethereum,
            Amount::from_base_units(1_000_000_000),
            secret_hash,
            identity::Ethereum::from_str("0xc5549e335b2786520f4c5d706c76c9ee69d0a028")
                .unwrap()
                .into(),
            identity::Ethereum::from_str("0x8457037fcd80a8f578c92d5f25c7adc86f773d24")
                .unwrap()
                .into(),
            window.beta_expiry(),
        );

        SwapSession::new(
            crate::SwapId::random(),
            secret_hash,
            window,
            alpha,
            beta,
            Timestamp::from(1_000),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn save_and_load_a_session() {
        let db = Database::new_test().unwrap();
        let session = session();

        db.insert_session(session.clone()).await.unwrap();
        let loaded = db.load_session(&session.id()).unwrap();

        assert_eq!(loaded.session, session);
        assert!(!loaded.is_archived());
    }

    #[tokio::test]
    async fn inserting_the_same_session_twice_fails() {
        let db = Database::new_test().unwrap();
        let session = session();

        db.insert_session(session.clone()).await.unwrap();
        assert!(db.insert_session(session).await.is_err());
    }

    #[tokio::test]
    async fn updates_survive_a_round_trip() {
        let db = Database::new_test().unwrap();
        let mut session = session();
        db.insert_session(session.clone()).await.unwrap();

        session
            .leg_mut(Side::Alpha)
            .lock_submitted(None)
            .unwrap();
        db.update_session(&session).await.unwrap();

        let loaded = db.load_session(&session.id()).unwrap();
        assert_eq!(loaded.session.state(), session.state());
    }

    #[tokio::test]
    async fn archived_sessions_are_not_resumed() {
        let db = Database::new_test().unwrap();
        let session = session();
        db.insert_session(session.clone()).await.unwrap();

        db.archive_session(&session, SessionOutcome::AbortedEarly)
            .await
            .unwrap();

        assert!(db.unfinished_sessions().unwrap().is_empty());
        assert!(db.update_session(&session).await.is_err());

        let loaded = db.load_session(&session.id()).unwrap();
        assert_eq!(loaded.outcome, Some(SessionOutcome::AbortedEarly));
    }
}
