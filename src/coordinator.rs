//! The session driver: locks both legs in order, propagates the revealed
//! secret and routes every failure to the safest remaining action.
//!
//! Each phase of [`SwapCoordinator::drive`] first checks the leg state it is
//! about to establish, which makes the whole protocol idempotent: a resumed
//! session simply falls through the phases that already happened.

use crate::{
    database::{Database, SessionOutcome},
    ledger::{KeySigner, LedgerAdapter, SpendKind, TxMaterial},
    leg::LegState,
    monitor::{self, MonitorError, PollSettings, StateMonitor},
    redeem::{RedeemError, RedemptionEngine, RefundError},
    session::{SessionState, SwapSession},
    Secret, SecretVault, Side,
};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// Which party performs the first, secret-revealing redemption on beta.
///
/// With `Initiator` (the default) the coordinator holds the secret vault and
/// redeems beta itself. With `Counterparty` the coordinator only watches beta
/// for the spend that reveals the secret.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize,
    strum_macros::Display, strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RedeemActor {
    Initiator,
    Counterparty,
}

impl Default for RedeemActor {
    fn default() -> Self {
        RedeemActor::Initiator
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExecutionSettings {
    pub poll: PollSettings,
    /// How long to wait for a submitted lock to confirm before giving up.
    pub lock_wait: Duration,
    /// Pause between alpha redeem attempts while the deadline has not passed.
    pub redeem_retry_interval: Duration,
    /// Cap on the total time spent retrying refund submissions. When hit, the
    /// leg is reported and the session is left for `resume`.
    pub refund_retry_timeout: Duration,
    pub redeem_actor: RedeemActor,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        ExecutionSettings {
            poll: PollSettings::default(),
            lock_wait: Duration::from_secs(3600),
            redeem_retry_interval: Duration::from_secs(10),
            refund_retry_timeout: Duration::from_secs(3600),
            redeem_actor: RedeemActor::default(),
        }
    }
}

/// Drives one [`SwapSession`] to a terminal state.
///
/// Exclusively owns the session; the adapters, signer and database are shared
/// service handles.
pub struct SwapCoordinator<A, B, S> {
    session: SwapSession,
    vault: Option<SecretVault>,
    alpha_monitor: StateMonitor<A>,
    beta_monitor: StateMonitor<B>,
    alpha_engine: RedemptionEngine<A, S>,
    beta_engine: RedemptionEngine<B, S>,
    alpha_connector: Arc<A>,
    beta_connector: Arc<B>,
    signer: Arc<S>,
    db: Arc<Database>,
    settings: ExecutionSettings,
}

impl<A, B, S> std::fmt::Debug for SwapCoordinator<A, B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapCoordinator")
            .field("swap_id", &self.session.id())
            .field("state", &self.session.state())
            .finish()
    }
}

impl<A, B, S> SwapCoordinator<A, B, S>
where
    A: LedgerAdapter,
    B: LedgerAdapter,
    S: KeySigner,
{
    pub fn new(
        session: SwapSession,
        vault: Option<SecretVault>,
        alpha_connector: Arc<A>,
        beta_connector: Arc<B>,
        signer: Arc<S>,
        db: Arc<Database>,
        settings: ExecutionSettings,
    ) -> Self {
        SwapCoordinator {
            alpha_monitor: StateMonitor::new(Arc::clone(&alpha_connector), settings.poll),
            beta_monitor: StateMonitor::new(Arc::clone(&beta_connector), settings.poll),
            alpha_engine: RedemptionEngine::new(Arc::clone(&alpha_connector), Arc::clone(&signer)),
            beta_engine: RedemptionEngine::new(Arc::clone(&beta_connector), Arc::clone(&signer)),
            session,
            vault,
            alpha_connector,
            beta_connector,
            signer,
            db,
            settings,
        }
    }

    pub fn session(&self) -> &SwapSession {
        &self.session
    }

    /// Runs the protocol from wherever the session currently stands until it
    /// reaches a terminal state.
    pub async fn drive(&mut self) -> Result<SessionState> {
        let swap_id = self.session.id();
        tracing::info!("driving swap {} from state {}", swap_id, self.session.state());

        self.fast_forward().await?;

        if self.session.state().is_terminal() {
            return self.archive().await;
        }

        if !self.ensure_alpha_locked().await? {
            // The submitted lock can still confirm later, so the session must
            // stay unfinished: `resume` re-checks the chain and the refund
            // path is still reachable from there.
            tracing::warn!(
                "swap {}: alpha lock did not confirm within the wait bound",
                swap_id
            );
            return Ok(self.session.state());
        }

        if !self.ensure_beta_locked().await? {
            tracing::warn!(
                "swap {}: beta leg never locked, falling back to alpha refund",
                swap_id
            );
            if !self.refund_alpha_after_expiry().await? {
                return Ok(self.session.state());
            }
            return self.archive().await;
        }

        let secret = match self.ensure_secret_revealed().await? {
            Some(secret) => secret,
            None => {
                // Beta resolved without revealing the secret. Alpha comes back
                // to its owner after the deadline.
                if !self.refund_alpha_after_expiry().await? {
                    return Ok(self.session.state());
                }
                return self.archive().await;
            }
        };

        self.redeem_alpha_until_deadline(secret).await?;

        self.archive().await
    }

    /// Re-derives both legs' states from the chain, for crash recovery and
    /// the `resume` command.
    pub async fn fast_forward(&mut self) -> Result<()> {
        self.fast_forward_leg(Side::Alpha).await?;
        self.fast_forward_leg(Side::Beta).await?;
        Ok(())
    }

    /// Aborts a session on which nothing has been locked yet.
    ///
    /// Once a lock is confirmed there is no abort; the timelocks govern from
    /// then on and the operator has to let the refund path run.
    pub async fn abort(&mut self) -> Result<()> {
        let locked = [Side::Alpha, Side::Beta].iter().any(|&side| {
            !matches!(
                self.session.leg(side).state(),
                LegState::Pending | LegState::LockSubmitted
            )
        });

        if locked {
            return Err(anyhow!(
                "swap {} has a confirmed lock; abort is not available, wait for expiry and refund",
                self.session.id()
            ));
        }

        self.db
            .archive_session(&self.session, SessionOutcome::AbortedEarly)
            .await?;
        tracing::info!("swap {} aborted before any lock confirmed", self.session.id());

        Ok(())
    }

    /// Operator escape hatch: a single redeem attempt on one leg.
    pub async fn force_redeem(&mut self, side: Side) -> Result<()> {
        let secret = match &self.vault {
            Some(vault) => vault.reveal(),
            None => self
                .extract_secret_from_beta()
                .await?
                .context("no secret available: not the secret holder and beta is unspent")?,
        };

        match side {
            Side::Alpha => {
                self.alpha_engine
                    .redeem(self.session.leg(Side::Alpha), secret)
                    .await?;
            }
            Side::Beta => {
                self.beta_engine
                    .redeem(self.session.leg(Side::Beta), secret)
                    .await?;
            }
        }

        self.fast_forward_leg(side).await
    }

    /// Operator escape hatch: a single refund attempt on one leg.
    pub async fn force_refund(&mut self, side: Side) -> Result<()> {
        match side {
            Side::Alpha => {
                self.alpha_engine.refund(self.session.leg(Side::Alpha)).await?;
            }
            Side::Beta => {
                self.beta_engine.refund(self.session.leg(Side::Beta)).await?;
            }
        }

        self.fast_forward_leg(side).await
    }

    /// Phase 1: alpha goes on-chain first, with the longer deadline.
    ///
    /// Returns `false` if the lock never confirmed within its bound.
    async fn ensure_alpha_locked(&mut self) -> Result<bool> {
        if self.session.leg(Side::Alpha).state() == LegState::Pending {
            self.submit_lock(Side::Alpha).await?;
        }

        if self.session.leg(Side::Alpha).state() == LegState::LockSubmitted {
            let leg = self.session.leg(Side::Alpha).clone();
            let bound = self
                .alpha_monitor
                .chain_time()
                .await?
                .plus(self.settings.lock_wait.as_secs() as u32)
                .min(leg.expiry);

            match self.alpha_monitor.wait_for_locked(&leg, bound).await {
                Ok(()) => {
                    self.session.leg_mut(Side::Alpha).lock_confirmed()?;
                    self.persist().await?;
                    tracing::info!("swap {}: alpha leg locked", self.session.id());
                }
                Err(MonitorError::WaitBoundExceeded { .. }) => {
                    // The lock may have confirmed right at the bound.
                    self.fast_forward_leg(Side::Alpha).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(self.session.leg(Side::Alpha).state() == LegState::Locked)
    }

    /// Phase 2: beta follows, with the shorter deadline and the same
    /// commitment.
    async fn ensure_beta_locked(&mut self) -> Result<bool> {
        if self.session.leg(Side::Beta).state() == LegState::Pending {
            self.submit_lock(Side::Beta).await?;
        }

        if self.session.leg(Side::Beta).state() == LegState::LockSubmitted {
            let leg = self.session.leg(Side::Beta).clone();
            let bound = self
                .beta_monitor
                .chain_time()
                .await?
                .plus(self.settings.lock_wait.as_secs() as u32)
                .min(leg.expiry);

            match self.beta_monitor.wait_for_locked(&leg, bound).await {
                Ok(()) => {
                    self.session.leg_mut(Side::Beta).lock_confirmed()?;
                    self.persist().await?;
                    tracing::info!("swap {}: beta leg locked", self.session.id());
                }
                Err(MonitorError::WaitBoundExceeded { .. }) => {
                    self.fast_forward_leg(Side::Beta).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(self.session.leg(Side::Beta).state() == LegState::Locked)
    }

    /// Phases 3 and 4: get the secret revealed on beta and extracted from the
    /// observed spend.
    ///
    /// Returns `None` if beta resolved without a redeem (refunded, or expired
    /// unspent), in which case there is nothing left to swap.
    async fn ensure_secret_revealed(&mut self) -> Result<Option<Secret>> {
        if self.session.leg(Side::Beta).state() == LegState::Locked {
            if self.settings.redeem_actor == RedeemActor::Initiator {
                if let Some(vault) = &self.vault {
                    let secret = vault.reveal();
                    let leg = self.session.leg(Side::Beta).clone();

                    // At most one submission; whatever happens next is judged
                    // by the observed chain state, not the submission result.
                    match self.beta_engine.redeem(&leg, secret).await {
                        Ok(_) => {}
                        Err(RedeemError::Rejected(reason)) => {
                            tracing::warn!(
                                "swap {}: beta redeem rejected ({}), deferring to chain state",
                                self.session.id(),
                                reason
                            );
                        }
                        Err(RedeemError::DeadlinePassed) => {
                            tracing::warn!(
                                "swap {}: beta deadline passed before redeem",
                                self.session.id()
                            );
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            let leg = self.session.leg(Side::Beta).clone();
            // The secret is only useful while alpha can still be redeemed.
            let bound = self.session.window().alpha_expiry();

            match self.beta_monitor.wait_for_spend(&leg, bound).await {
                Ok(spend) => match spend.kind {
                    SpendKind::Redeem => {
                        let secret = match monitor::secret_from_spend(&spend, &leg.secret_hash) {
                            Ok(secret) => secret,
                            Err(e) => {
                                // Beta is gone but the secret is not learnable.
                                // Alpha falls back to the refund path.
                                tracing::error!(
                                    "swap {}: cannot learn the secret from the beta spend: {}",
                                    self.session.id(),
                                    e
                                );
                                self.session.leg_mut(Side::Beta).redeemed()?;
                                self.persist().await?;
                                return Ok(None);
                            }
                        };
                        self.session.leg_mut(Side::Beta).redeemed()?;
                        self.persist().await?;
                        tracing::info!(
                            "swap {}: secret revealed on beta by transaction {}",
                            self.session.id(),
                            spend.tx_id
                        );
                        return Ok(Some(secret));
                    }
                    SpendKind::Refund => {
                        self.session.leg_mut(Side::Beta).refunded()?;
                        self.persist().await?;
                        return Ok(None);
                    }
                },
                Err(MonitorError::WaitBoundExceeded { .. }) => {
                    let now = self.beta_monitor.chain_time().await?;
                    if now >= self.session.leg(Side::Beta).expiry {
                        self.session.leg_mut(Side::Beta).expired_unclaimed()?;
                        self.persist().await?;
                    }
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Resumed sessions can land here with beta already resolved.
        match self.session.leg(Side::Beta).state() {
            LegState::Redeemed => Ok(self.extract_secret_from_beta().await?),
            _ => Ok(None),
        }
    }

    /// Phase 5: claim alpha with the extracted secret, retrying until the
    /// alpha deadline.
    async fn redeem_alpha_until_deadline(&mut self, secret: Secret) -> Result<()> {
        loop {
            let leg = self.session.leg(Side::Alpha).clone();

            match self.alpha_engine.redeem(&leg, secret).await {
                Ok(_) => {
                    // Submission accepted; only the observed spend settles it.
                    let bound = leg
                        .expiry
                        .plus(self.session.window().margin().as_secs() as u32);
                    match self.alpha_monitor.wait_for_spend(&leg, bound).await {
                        Ok(spend) if spend.kind == SpendKind::Redeem => {
                            self.session.leg_mut(Side::Alpha).redeemed()?;
                            self.persist().await?;
                            tracing::info!("swap {} complete", self.session.id());
                            return Ok(());
                        }
                        Ok(_) | Err(MonitorError::WaitBoundExceeded { .. }) => {
                            // Keep retrying while the deadline allows.
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(RedeemError::DeadlinePassed) => {
                    self.session.leg_mut(Side::Alpha).expired_unclaimed()?;
                    self.persist().await?;
                    self.report_value_at_risk();
                    return Ok(());
                }
                Err(RedeemError::Rejected(reason)) => {
                    tracing::warn!(
                        "swap {}: alpha redeem rejected ({}), re-checking chain state",
                        self.session.id(),
                        reason
                    );
                    self.fast_forward_leg(Side::Alpha).await?;
                    if self.session.leg(Side::Alpha).state().is_terminal() {
                        return Ok(());
                    }
                }
                Err(RedeemError::Transient(e)) => {
                    tracing::warn!(
                        "swap {}: alpha redeem failed ({}), retrying until deadline",
                        self.session.id(),
                        e
                    );
                }
                Err(e) => return Err(e.into()),
            }

            let now = self.alpha_monitor.chain_time().await?;
            if now >= self.session.leg(Side::Alpha).expiry {
                self.session.leg_mut(Side::Alpha).expired_unclaimed()?;
                self.persist().await?;
                self.report_value_at_risk();
                return Ok(());
            }

            tokio::time::sleep(self.settings.redeem_retry_interval).await;
        }
    }

    /// The clean failure path: wait out alpha's timelock, then reclaim it.
    ///
    /// Returns `false` if the retry bound was hit with the leg still locked.
    /// The caller must then leave the session unfinished so `resume` can try
    /// again; the leg is reported as holding value in the meantime.
    async fn refund_alpha_after_expiry(&mut self) -> Result<bool> {
        if self.session.leg(Side::Alpha).state() != LegState::Locked {
            return Ok(true);
        }

        let expiry = self.session.leg(Side::Alpha).expiry;
        self.alpha_monitor.wait_until_expired(expiry).await?;

        let started = std::time::Instant::now();

        loop {
            if started.elapsed() >= self.settings.refund_retry_timeout {
                tracing::error!(
                    "swap {}: giving up on the alpha refund after {:?}",
                    self.session.id(),
                    self.settings.refund_retry_timeout
                );
                self.report_value_at_risk();
                return Ok(false);
            }

            let leg = self.session.leg(Side::Alpha).clone();

            match self.alpha_engine.refund(&leg).await {
                Ok(_) => {
                    let bound = self
                        .alpha_monitor
                        .chain_time()
                        .await?
                        .plus(self.settings.lock_wait.as_secs() as u32);
                    match self.alpha_monitor.wait_for_spend(&leg, bound).await {
                        Ok(spend) if spend.kind == SpendKind::Refund => {
                            self.session.leg_mut(Side::Alpha).refunded()?;
                            self.persist().await?;
                            tracing::info!(
                                "swap {}: alpha refunded, nobody lost funds",
                                self.session.id()
                            );
                            return Ok(true);
                        }
                        Ok(spend) if spend.kind == SpendKind::Redeem => {
                            // Raced by the beneficiary at the last moment.
                            self.session.leg_mut(Side::Alpha).redeemed()?;
                            self.persist().await?;
                            return Ok(true);
                        }
                        Ok(_) | Err(MonitorError::WaitBoundExceeded { .. }) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(RefundError::Rejected(reason)) => {
                    tracing::warn!(
                        "swap {}: alpha refund rejected ({}), re-checking chain state",
                        self.session.id(),
                        reason
                    );
                    self.fast_forward_leg(Side::Alpha).await?;
                    if self.session.leg(Side::Alpha).state().is_terminal() {
                        return Ok(true);
                    }
                }
                Err(RefundError::Transient(e)) => {
                    tracing::warn!(
                        "swap {}: alpha refund failed ({}), retrying",
                        self.session.id(),
                        e
                    );
                }
                Err(e) => return Err(e.into()),
            }

            tokio::time::sleep(self.settings.redeem_retry_interval).await;
        }
    }

    async fn submit_lock(&mut self, side: Side) -> Result<()> {
        let leg = self.session.leg(side);
        let material = TxMaterial::Lock {
            ledger: leg.ledger,
            amount: leg.amount,
            secret_hash: leg.secret_hash,
            redeem_identity: leg.redeem_identity,
            refund_identity: leg.refund_identity,
            expiry: leg.expiry,
        };
        let signed = self.signer.sign(material).await?;

        let receipt = match side {
            Side::Alpha => self.alpha_connector.submit(signed).await?,
            Side::Beta => self.beta_connector.submit(signed).await?,
        };

        tracing::info!(
            "swap {}: {} lock transaction {} submitted",
            self.session.id(),
            side,
            receipt.tx_id
        );

        self.session.leg_mut(side).lock_submitted(receipt.location)?;
        self.persist().await
    }

    async fn fast_forward_leg(&mut self, side: Side) -> Result<()> {
        let leg = self.session.leg(side).clone();
        if leg.location().is_none() || leg.state().is_terminal() || leg.state() == LegState::Pending
        {
            return Ok(());
        }

        let snapshot = match side {
            Side::Alpha => self.alpha_monitor.snapshot(&leg).await?,
            Side::Beta => self.beta_monitor.snapshot(&leg).await?,
        };

        if leg.state() == LegState::LockSubmitted && snapshot.confirmed {
            self.session.leg_mut(side).lock_confirmed()?;
            self.persist().await?;
        }

        if let Some(spend) = snapshot.spend {
            if self.session.leg(side).state() == LegState::Locked {
                match spend.kind {
                    SpendKind::Redeem => self.session.leg_mut(side).redeemed()?,
                    SpendKind::Refund => self.session.leg_mut(side).refunded()?,
                }
                self.persist().await?;
            }
        }

        Ok(())
    }

    async fn extract_secret_from_beta(&self) -> Result<Option<Secret>> {
        let leg = self.session.leg(Side::Beta);
        if leg.location().is_none() {
            return Ok(None);
        }

        let snapshot = self.beta_monitor.snapshot(leg).await?;
        match snapshot.spend {
            Some(spend) if spend.kind == SpendKind::Redeem => {
                match monitor::extract_secret(&spend, &leg.secret_hash) {
                    Some(secret) => Ok(Some(secret)),
                    None => {
                        tracing::error!(
                            "swap {}: beta redeem spend {} carries no usable secret",
                            self.session.id(),
                            spend.tx_id
                        );
                        Ok(None)
                    }
                }
            }
            _ => Ok(None),
        }
    }

    async fn persist(&self) -> Result<()> {
        self.db.update_session(&self.session).await
    }

    async fn archive(&mut self) -> Result<SessionState> {
        let state = self.session.state();

        let outcome = match state {
            SessionState::Complete => SessionOutcome::Completed,
            SessionState::FailedRefundedAlpha => SessionOutcome::FailedRefundedAlpha,
            SessionState::FailedAlphaExpired => SessionOutcome::FailedAlphaExpired,
            SessionState::FailedSecretRevealedNoRedeem => {
                SessionOutcome::FailedSecretRevealedNoRedeem
            }
            other => {
                return Err(anyhow!(
                    "swap {} stopped in non-terminal state {}",
                    self.session.id(),
                    other
                ))
            }
        };

        self.db.archive_session(&self.session, outcome).await?;
        Ok(state)
    }

    fn report_value_at_risk(&self) {
        for leg in self.session.unresolved_legs() {
            tracing::error!(
                "swap {}: {} leg on {} is {} with deadline {}; funds are at risk and need manual attention",
                self.session.id(),
                leg.side,
                leg.ledger,
                leg.state,
                leg.deadline
            );
        }
    }
}
