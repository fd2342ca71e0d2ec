//! End-to-end swap scenarios against in-memory ledgers with controllable
//! clocks.

use adaswap::{
    cardano,
    coordinator::{ExecutionSettings, RedeemActor, SwapCoordinator},
    database::{Database, SessionOutcome},
    ethereum,
    htlc_location::LockLocation,
    identity,
    ledger::{
        AdapterError, Amount, KeySigner, LedgerAdapter, LedgerKind, LegSnapshot, RejectReason,
        SignedMaterial, SigningError, Spend, SpendKind, SubmissionReceipt, TxMaterial,
    },
    leg::{EscrowLeg, LegState},
    monitor::{PollSettings, StateMonitor},
    redeem::{RedeemError, RedemptionEngine, RefundError},
    session::{SessionState, SwapSession},
    window::TimelockWindow,
    Secret, SecretHash, SecretVault, Side, SwapId, Timestamp,
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    str::FromStr,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

const START: u32 = 1_000_000;

/// A ledger clock that advances by a fixed tick on every read, so waits on
/// chain time terminate without wall-clock delays.
struct FakeClock {
    now: AtomicU32,
    tick: u32,
}

impl FakeClock {
    fn new(start: u32, tick: u32) -> Self {
        FakeClock {
            now: AtomicU32::new(start),
            tick,
        }
    }

    fn read(&self) -> Timestamp {
        Timestamp::from(self.now.fetch_add(self.tick, Ordering::SeqCst))
    }

    fn set(&self, now: u32) {
        self.now.store(now, Ordering::SeqCst);
    }
}

struct LockEntry {
    secret_hash: SecretHash,
    expiry: Timestamp,
    confirmed: bool,
    spend: Option<Spend>,
}

/// An in-memory chain: locks keyed by location, spends recorded with their
/// witness so the monitor can extract secrets the same way it would on a real
/// ledger.
struct FakeLedger {
    kind: LedgerKind,
    clock: Arc<FakeClock>,
    chain: Mutex<HashMap<LockLocation, LockEntry>>,
    confirm_locks: bool,
    garble_redeem_witness: bool,
    fail_refund_submissions: bool,
    next_id: AtomicU32,
}

impl FakeLedger {
    fn new(kind: LedgerKind, clock: Arc<FakeClock>) -> Self {
        FakeLedger {
            kind,
            clock,
            chain: Mutex::new(HashMap::new()),
            confirm_locks: true,
            garble_redeem_witness: false,
            fail_refund_submissions: false,
            next_id: AtomicU32::new(1),
        }
    }

    /// A ledger that accepts lock submissions but never confirms them.
    fn never_confirming(kind: LedgerKind, clock: Arc<FakeClock>) -> Self {
        FakeLedger {
            confirm_locks: false,
            ..FakeLedger::new(kind, clock)
        }
    }

    /// A ledger whose redeem spends carry garbage witness items, so the
    /// secret can never be extracted from them.
    fn garbling_redeem_witness(kind: LedgerKind, clock: Arc<FakeClock>) -> Self {
        FakeLedger {
            garble_redeem_witness: true,
            ..FakeLedger::new(kind, clock)
        }
    }

    /// A ledger whose node keeps timing out on refund submissions.
    fn failing_refund_submissions(kind: LedgerKind, clock: Arc<FakeClock>) -> Self {
        FakeLedger {
            fail_refund_submissions: true,
            ..FakeLedger::new(kind, clock)
        }
    }

    fn fresh_location(&self) -> LockLocation {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) as u8;
        match self.kind {
            LedgerKind::Cardano => cardano::OutputRef {
                tx_id: cardano::TxId::from([n; 32]),
                index: 0,
            }
            .into(),
            LedgerKind::Ethereum => ethereum::Address::from([n; 20]).into(),
        }
    }

    fn fresh_tx_id(&self) -> String {
        format!("fake-tx-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl LedgerAdapter for FakeLedger {
    fn kind(&self) -> LedgerKind {
        self.kind
    }

    async fn lock_state(&self, location: &LockLocation) -> Result<LegSnapshot, AdapterError> {
        let chain = self.chain.lock().unwrap();
        let entry = chain
            .get(location)
            .ok_or_else(|| AdapterError::Configuration(format!("unknown lock {}", location)))?;

        Ok(LegSnapshot {
            confirmed: entry.confirmed,
            spend: entry.spend.clone(),
        })
    }

    async fn submit(&self, signed: SignedMaterial) -> Result<SubmissionReceipt, AdapterError> {
        match signed.material {
            TxMaterial::Lock {
                secret_hash,
                expiry,
                ..
            } => {
                let location = self.fresh_location();
                self.chain.lock().unwrap().insert(location, LockEntry {
                    secret_hash,
                    expiry,
                    confirmed: self.confirm_locks,
                    spend: None,
                });

                Ok(SubmissionReceipt {
                    tx_id: self.fresh_tx_id(),
                    location: Some(location),
                })
            }
            TxMaterial::Redeem {
                location, secret, ..
            } => {
                let now = self.clock.read();
                let mut chain = self.chain.lock().unwrap();
                let entry = chain
                    .get_mut(&location)
                    .ok_or(AdapterError::Rejected(RejectReason::AlreadySpent))?;

                if entry.spend.is_some() {
                    return Err(AdapterError::Rejected(RejectReason::AlreadySpent));
                }
                if now >= entry.expiry {
                    return Err(AdapterError::Rejected(RejectReason::Expired));
                }
                if SecretHash::new(secret) != entry.secret_hash {
                    return Err(AdapterError::Rejected(RejectReason::InvalidSecret));
                }

                let witness = if self.garble_redeem_witness {
                    vec![vec![0xde, 0xad, 0xbe, 0xef]]
                } else {
                    vec![vec![0x01], secret.as_raw_secret().to_vec()]
                };

                let tx_id = self.fresh_tx_id();
                entry.spend = Some(Spend {
                    kind: SpendKind::Redeem,
                    witness,
                    tx_id: tx_id.clone(),
                });

                Ok(SubmissionReceipt {
                    tx_id,
                    location: None,
                })
            }
            TxMaterial::Refund { location, .. } => {
                if self.fail_refund_submissions {
                    return Err(AdapterError::Transient("node timed out".to_string()));
                }

                let now = self.clock.read();
                let mut chain = self.chain.lock().unwrap();
                let entry = chain
                    .get_mut(&location)
                    .ok_or(AdapterError::Rejected(RejectReason::AlreadySpent))?;

                if entry.spend.is_some() {
                    return Err(AdapterError::Rejected(RejectReason::AlreadySpent));
                }
                if now < entry.expiry {
                    return Err(AdapterError::Rejected(RejectReason::NotYetExpired));
                }

                let tx_id = self.fresh_tx_id();
                entry.spend = Some(Spend {
                    kind: SpendKind::Refund,
                    witness: vec![],
                    tx_id: tx_id.clone(),
                });

                Ok(SubmissionReceipt {
                    tx_id,
                    location: None,
                })
            }
        }
    }

    async fn current_time(&self) -> Result<Timestamp, AdapterError> {
        Ok(self.clock.read())
    }
}

struct FakeSigner;

#[async_trait]
impl KeySigner for FakeSigner {
    async fn sign(&self, material: TxMaterial) -> Result<SignedMaterial, SigningError> {
        Ok(SignedMaterial {
            material,
            signature: vec![0xaa; 64],
        })
    }
}

fn fast_settings() -> ExecutionSettings {
    ExecutionSettings {
        poll: PollSettings {
            interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(50),
            max_elapsed: Some(Duration::from_secs(2)),
        },
        lock_wait: Duration::from_secs(3600),
        redeem_retry_interval: Duration::from_millis(10),
        refund_retry_timeout: Duration::from_secs(3600),
        redeem_actor: RedeemActor::Initiator,
    }
}

fn make_session(secret_hash: SecretHash) -> SwapSession {
    let window = TimelockWindow::new(
        Timestamp::from(START + 3600),
        Timestamp::from(START + 1800),
        Duration::from_secs(300),
    )
    .unwrap();

    let alpha = EscrowLeg::new(
        LedgerKind::Cardano,
        Amount::from_base_units(3_000_000),
        secret_hash,
        identity::Cardano::from_str("00112233445566778899aabbccddeeff00112233445566778899aabb")
            .unwrap()
            .into(),
        identity::Cardano::from_str("ffeeddccbbaa99887766554433221100ffeeddccbbaa998877665544")
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
        SwapId::random(),
        secret_hash,
        window,
        alpha,
        beta,
        Timestamp::from(START),
    )
    .unwrap()
}

fn test_db() -> (Arc<Database>, tempfile::TempDir) {
    let tmp_dir = tempfile::TempDir::new().unwrap();
    let db = Database::new(&tmp_dir.path().join("db")).unwrap();
    (Arc::new(db), tmp_dir)
}

/// A leg already locked on the given ledger, for engine-level tests.
async fn locked_leg_on(ledger: &FakeLedger, session: &SwapSession, side: Side) -> EscrowLeg {
    let mut leg = session.leg(side).clone();
    let signed = FakeSigner
        .sign(TxMaterial::Lock {
            ledger: leg.ledger,
            amount: leg.amount,
            secret_hash: leg.secret_hash,
            redeem_identity: leg.redeem_identity,
            refund_identity: leg.refund_identity,
            expiry: leg.expiry,
        })
        .await
        .unwrap();
    let receipt = ledger.submit(signed).await.unwrap();

    leg.lock_submitted(receipt.location).unwrap();
    leg.lock_confirmed().unwrap();
    leg
}

#[tokio::test]
async fn scenario_a_happy_path_ends_complete() {
    let vault = SecretVault::generate().unwrap();
    let session = make_session(vault.commitment());
    let swap_id = session.id();

    let alpha_clock = Arc::new(FakeClock::new(START, 1));
    let beta_clock = Arc::new(FakeClock::new(START, 1));
    let alpha = Arc::new(FakeLedger::new(LedgerKind::Cardano, alpha_clock));
    let beta = Arc::new(FakeLedger::new(LedgerKind::Ethereum, beta_clock));
    let (db, _tmp) = test_db();
    db.insert_session(session.clone()).await.unwrap();

    let mut coordinator = SwapCoordinator::new(
        session,
        Some(vault),
        alpha,
        beta,
        Arc::new(FakeSigner),
        Arc::clone(&db),
        fast_settings(),
    );

    let state = coordinator.drive().await.unwrap();

    assert_eq!(state, SessionState::Complete);

    let record = db.load_session(&swap_id).unwrap();
    assert_eq!(record.outcome, Some(SessionOutcome::Completed));
    assert_eq!(record.session.leg(Side::Alpha).state(), LegState::Redeemed);
    assert_eq!(record.session.leg(Side::Beta).state(), LegState::Redeemed);
}

#[tokio::test]
async fn scenario_b_beta_never_locks_alpha_is_refunded() {
    let vault = SecretVault::generate().unwrap();
    let session = make_session(vault.commitment());
    let swap_id = session.id();

    // Big ticks so the wait bounds and the alpha expiry are reached after a
    // handful of polls.
    let alpha_clock = Arc::new(FakeClock::new(START, 120));
    let beta_clock = Arc::new(FakeClock::new(START, 120));
    let alpha = Arc::new(FakeLedger::new(LedgerKind::Cardano, alpha_clock));
    let beta = Arc::new(FakeLedger::never_confirming(
        LedgerKind::Ethereum,
        beta_clock,
    ));
    let (db, _tmp) = test_db();
    db.insert_session(session.clone()).await.unwrap();

    let mut coordinator = SwapCoordinator::new(
        session,
        Some(vault),
        alpha,
        beta,
        Arc::new(FakeSigner),
        Arc::clone(&db),
        fast_settings(),
    );

    let state = coordinator.drive().await.unwrap();

    assert_eq!(state, SessionState::FailedRefundedAlpha);

    let record = db.load_session(&swap_id).unwrap();
    assert_eq!(record.outcome, Some(SessionOutcome::FailedRefundedAlpha));
    assert_eq!(record.session.leg(Side::Alpha).state(), LegState::Refunded);
}

#[tokio::test]
async fn scenario_c_wrong_secret_is_rejected_and_leg_stays_locked() {
    let vault = SecretVault::generate().unwrap();
    let session = make_session(vault.commitment());

    let clock = Arc::new(FakeClock::new(START, 0));
    let ledger = Arc::new(FakeLedger::new(LedgerKind::Ethereum, clock));
    let leg = locked_leg_on(&ledger, &session, Side::Beta).await;

    let engine = RedemptionEngine::new(Arc::clone(&ledger), Arc::new(FakeSigner));
    let wrong_secret = Secret::from(*b"not the secret you committed to!");

    let result = engine.redeem(&leg, wrong_secret).await;

    assert!(matches!(result, Err(RedeemError::InvalidSecret { .. })));
    assert_eq!(leg.state(), LegState::Locked);

    // Nothing was spent on-chain either.
    let snapshot = ledger.lock_state(leg.location().unwrap()).await.unwrap();
    assert_eq!(snapshot.spend, None);
}

#[tokio::test]
async fn scenario_d_redeem_one_second_after_deadline_is_expired() {
    let vault = SecretVault::generate().unwrap();
    let session = make_session(vault.commitment());

    let clock = Arc::new(FakeClock::new(START, 0));
    let ledger = Arc::new(FakeLedger::new(LedgerKind::Ethereum, Arc::clone(&clock)));
    let leg = locked_leg_on(&ledger, &session, Side::Beta).await;

    clock.set(START + 1801);

    let engine = RedemptionEngine::new(Arc::clone(&ledger), Arc::new(FakeSigner));
    let result = engine.redeem(&leg, vault.reveal()).await;

    assert!(matches!(result, Err(RedeemError::DeadlinePassed)));
}

#[tokio::test]
async fn refund_before_deadline_is_rejected() {
    let vault = SecretVault::generate().unwrap();
    let session = make_session(vault.commitment());

    let clock = Arc::new(FakeClock::new(START, 0));
    let ledger = Arc::new(FakeLedger::new(LedgerKind::Cardano, clock));
    let leg = locked_leg_on(&ledger, &session, Side::Alpha).await;

    let engine = RedemptionEngine::new(Arc::clone(&ledger), Arc::new(FakeSigner));
    let result = engine.refund(&leg).await;

    assert!(matches!(result, Err(RefundError::DeadlineNotReached)));
}

#[tokio::test]
async fn refund_after_deadline_succeeds_exactly_once() {
    let vault = SecretVault::generate().unwrap();
    let session = make_session(vault.commitment());

    let clock = Arc::new(FakeClock::new(START, 0));
    let ledger = Arc::new(FakeLedger::new(LedgerKind::Cardano, Arc::clone(&clock)));
    let leg = locked_leg_on(&ledger, &session, Side::Alpha).await;

    clock.set(START + 3600);

    let engine = RedemptionEngine::new(Arc::clone(&ledger), Arc::new(FakeSigner));

    assert!(engine.refund(&leg).await.is_ok());

    let second = engine.refund(&leg).await;
    assert!(matches!(
        second,
        Err(RefundError::Rejected(RejectReason::AlreadySpent))
    ));
}

#[tokio::test]
async fn polling_an_unspent_locked_leg_is_idempotent() {
    let vault = SecretVault::generate().unwrap();
    let session = make_session(vault.commitment());

    let clock = Arc::new(FakeClock::new(START, 0));
    let ledger = Arc::new(FakeLedger::new(LedgerKind::Cardano, clock));
    let leg = locked_leg_on(&ledger, &session, Side::Alpha).await;

    let monitor = StateMonitor::new(Arc::clone(&ledger), fast_settings().poll);

    let first = monitor.snapshot(&leg).await.unwrap();
    for _ in 0..10 {
        let next = monitor.snapshot(&leg).await.unwrap();
        assert_eq!(next, first);
    }
    assert_eq!(leg.state(), LegState::Locked);
}

#[tokio::test]
async fn malformed_reveal_witness_falls_back_to_alpha_refund() {
    let vault = SecretVault::generate().unwrap();
    let session = make_session(vault.commitment());
    let swap_id = session.id();

    let alpha_clock = Arc::new(FakeClock::new(START, 120));
    let beta_clock = Arc::new(FakeClock::new(START, 120));
    let alpha = Arc::new(FakeLedger::new(LedgerKind::Cardano, alpha_clock));
    let beta = Arc::new(FakeLedger::garbling_redeem_witness(
        LedgerKind::Ethereum,
        beta_clock,
    ));
    let (db, _tmp) = test_db();
    db.insert_session(session.clone()).await.unwrap();

    let mut coordinator = SwapCoordinator::new(
        session,
        Some(vault),
        alpha,
        beta,
        Arc::new(FakeSigner),
        Arc::clone(&db),
        fast_settings(),
    );

    // The beta spend happens but reveals nothing; alpha must not stay locked.
    let state = coordinator.drive().await.unwrap();

    assert_eq!(state, SessionState::FailedRefundedAlpha);

    let record = db.load_session(&swap_id).unwrap();
    assert_eq!(record.outcome, Some(SessionOutcome::FailedRefundedAlpha));
    assert_eq!(record.session.leg(Side::Alpha).state(), LegState::Refunded);
    assert_eq!(record.session.leg(Side::Beta).state(), LegState::Redeemed);
}

#[tokio::test]
async fn unconfirmed_alpha_lock_leaves_session_resumable() {
    let vault = SecretVault::generate().unwrap();
    let session = make_session(vault.commitment());
    let swap_id = session.id();

    let alpha_clock = Arc::new(FakeClock::new(START, 120));
    let beta_clock = Arc::new(FakeClock::new(START, 120));
    let alpha = Arc::new(FakeLedger::never_confirming(
        LedgerKind::Cardano,
        alpha_clock,
    ));
    let beta = Arc::new(FakeLedger::new(LedgerKind::Ethereum, beta_clock));
    let (db, _tmp) = test_db();
    db.insert_session(session.clone()).await.unwrap();

    let mut coordinator = SwapCoordinator::new(
        session,
        Some(vault),
        alpha,
        beta,
        Arc::new(FakeSigner),
        Arc::clone(&db),
        fast_settings(),
    );

    let state = coordinator.drive().await.unwrap();

    // The submitted lock could still confirm later, so the session must not
    // be archived: `resume` has to pick it up again.
    assert_eq!(state, SessionState::AlphaLockPending);

    let record = db.load_session(&swap_id).unwrap();
    assert_eq!(record.outcome, None);
    assert_eq!(db.unfinished_sessions().unwrap().len(), 1);
}

#[tokio::test]
async fn alpha_refund_retries_are_bounded() {
    let vault = SecretVault::generate().unwrap();
    let session = make_session(vault.commitment());
    let swap_id = session.id();

    let alpha_clock = Arc::new(FakeClock::new(START, 120));
    let beta_clock = Arc::new(FakeClock::new(START, 120));
    let alpha = Arc::new(FakeLedger::failing_refund_submissions(
        LedgerKind::Cardano,
        alpha_clock,
    ));
    let beta = Arc::new(FakeLedger::never_confirming(
        LedgerKind::Ethereum,
        beta_clock,
    ));
    let (db, _tmp) = test_db();
    db.insert_session(session.clone()).await.unwrap();

    let settings = ExecutionSettings {
        refund_retry_timeout: Duration::from_millis(150),
        ..fast_settings()
    };
    let mut coordinator = SwapCoordinator::new(
        session,
        Some(vault),
        alpha,
        beta,
        Arc::new(FakeSigner),
        Arc::clone(&db),
        settings,
    );

    let state = coordinator.drive().await.unwrap();

    // The refund could not go through within the bound; the leg stays locked
    // and the session stays unfinished instead of blocking forever.
    assert_eq!(state, SessionState::AlphaLocked);

    let record = db.load_session(&swap_id).unwrap();
    assert_eq!(record.outcome, None);
    assert_eq!(record.session.leg(Side::Alpha).state(), LegState::Locked);
    assert_eq!(db.unfinished_sessions().unwrap().len(), 1);
}

#[tokio::test]
async fn resumed_session_fast_forwards_from_chain_state() {
    let vault = SecretVault::generate().unwrap();
    let session = make_session(vault.commitment());
    let swap_id = session.id();

    let alpha_clock = Arc::new(FakeClock::new(START, 1));
    let beta_clock = Arc::new(FakeClock::new(START, 1));
    let alpha = Arc::new(FakeLedger::new(LedgerKind::Cardano, alpha_clock));
    let beta = Arc::new(FakeLedger::new(LedgerKind::Ethereum, beta_clock));
    let (db, _tmp) = test_db();
    db.insert_session(session.clone()).await.unwrap();

    // First run completes the swap.
    let mut coordinator = SwapCoordinator::new(
        session,
        Some(vault),
        Arc::clone(&alpha),
        Arc::clone(&beta),
        Arc::new(FakeSigner),
        Arc::clone(&db),
        fast_settings(),
    );
    coordinator.drive().await.unwrap();

    // A "crashed" coordinator restarts from an older persisted state and must
    // converge on the same outcome by re-querying the chain.
    let record = db.load_session(&swap_id).unwrap();
    let mut resumed = SwapCoordinator::new(
        record.session,
        None,
        alpha,
        beta,
        Arc::new(FakeSigner),
        Arc::clone(&db),
        fast_settings(),
    );
    let state = resumed.drive().await.unwrap();

    assert_eq!(state, SessionState::Complete);
}
