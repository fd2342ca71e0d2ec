//! The operator-facing commands: thin wrappers around the coordinator.

use crate::{
    cardano,
    config::{File, Settings},
    coordinator::SwapCoordinator,
    database::Database,
    ethereum,
    ledger::{Amount, KeySigner, LedgerAdapter, LedgerKind},
    leg::{EscrowLeg, LegState},
    session::{SessionState, SwapSession},
    window::TimelockWindow,
    SecretVault, Side, SwapId, Timestamp,
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
pub struct Options {
    /// Path to configuration file
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    pub config_file: Option<PathBuf>,

    /// Commands available
    #[structopt(subcommand)]
    pub cmd: Command,
}

impl Options {
    pub fn from_args() -> Self {
        StructOpt::from_args()
    }
}

#[derive(StructOpt, Debug, Clone)]
pub enum Command {
    /// Start a new swap session and drive it to a terminal state
    Swap(SwapArgs),
    /// Show stored sessions, their deadlines and the next safe action
    Status {
        /// Limit the report to one session
        swap_id: Option<SwapId>,
    },
    /// Resume all unfinished sessions after a restart
    Resume,
    /// Force a single redeem attempt on one leg of a session
    ForceRedeem { swap_id: SwapId, side: Side },
    /// Force a single refund attempt on one leg of a session
    ForceRefund { swap_id: SwapId, side: Side },
    /// Dump the current configuration
    DumpConfig,
}

#[derive(StructOpt, Debug, Clone)]
pub struct SwapArgs {
    /// Lovelace to lock on the Cardano (alpha) leg
    #[structopt(long)]
    pub alpha_amount: u64,

    /// Wei to lock on the Ethereum (beta) leg
    #[structopt(long)]
    pub beta_amount: u64,

    /// Key hash allowed to redeem the alpha leg
    #[structopt(long)]
    pub alpha_redeem_identity: cardano::KeyHash,

    /// Key hash allowed to refund the alpha leg after expiry
    #[structopt(long)]
    pub alpha_refund_identity: cardano::KeyHash,

    /// Address allowed to redeem the beta leg
    #[structopt(long)]
    pub beta_redeem_identity: ethereum::Address,

    /// Address allowed to refund the beta leg after expiry
    #[structopt(long)]
    pub beta_refund_identity: ethereum::Address,
}

/// Creates a fresh session from the arguments and drives it to the end.
pub async fn swap<A, B, S>(
    args: SwapArgs,
    alpha_connector: Arc<A>,
    beta_connector: Arc<B>,
    signer: Arc<S>,
    db: Arc<Database>,
    settings: &Settings,
) -> Result<SessionState>
where
    A: LedgerAdapter,
    B: LedgerAdapter,
    S: KeySigner,
{
    let now = alpha_connector
        .current_time()
        .await
        .context("failed to fetch ledger time to anchor the timelock window")?;

    let window = TimelockWindow::from_durations(
        now,
        settings.swap.alpha_expiry,
        settings.swap.beta_expiry,
        settings.swap.margin,
    )?;

    let vault = SecretVault::generate()?;
    let secret_hash = vault.commitment();

    let alpha = EscrowLeg::new(
        LedgerKind::Cardano,
        Amount::from_base_units(args.alpha_amount),
        secret_hash,
        args.alpha_redeem_identity.into(),
        args.alpha_refund_identity.into(),
        window.alpha_expiry(),
    );
    let beta = EscrowLeg::new(
        LedgerKind::Ethereum,
        Amount::from_base_units(args.beta_amount),
        secret_hash,
        args.beta_redeem_identity.into(),
        args.beta_refund_identity.into(),
        window.beta_expiry(),
    );

    let session = SwapSession::new(SwapId::random(), secret_hash, window, alpha, beta, now)?;
    db.insert_session(session.clone()).await?;

    let mut coordinator = SwapCoordinator::new(
        session,
        Some(vault),
        alpha_connector,
        beta_connector,
        signer,
        db,
        settings.swap.execution_settings(),
    );

    coordinator.drive().await
}

/// Picks every unfinished session back up.
///
/// Resumed sessions have no vault; if the secret has been revealed already it
/// is re-learned from the beta ledger, otherwise the session can only proceed
/// down the refund path once its deadlines pass.
pub async fn resume<A, B, S>(
    alpha_connector: Arc<A>,
    beta_connector: Arc<B>,
    signer: Arc<S>,
    db: Arc<Database>,
    settings: &Settings,
) -> Result<()>
where
    A: LedgerAdapter,
    B: LedgerAdapter,
    S: KeySigner,
{
    let sessions = db.unfinished_sessions()?;
    tracing::info!("resuming {} unfinished swap(s)", sessions.len());

    for session in sessions {
        let swap_id = session.id();
        let mut coordinator = SwapCoordinator::new(
            session,
            None,
            Arc::clone(&alpha_connector),
            Arc::clone(&beta_connector),
            Arc::clone(&signer),
            Arc::clone(&db),
            settings.swap.execution_settings(),
        );

        match coordinator.drive().await {
            Ok(state) => tracing::info!("swap {} finished as {}", swap_id, state),
            Err(e) => tracing::error!("failed to resume swap {}: {:#}", swap_id, e),
        }
    }

    Ok(())
}

/// Reports each stored session: per leg, the deadline, the remaining time by
/// the ledger's own clock and the next safe action.
#[allow(clippy::print_stdout)]
pub async fn status<A, B>(
    swap_id: Option<SwapId>,
    alpha_connector: Arc<A>,
    beta_connector: Arc<B>,
    db: Arc<Database>,
) -> Result<()>
where
    A: LedgerAdapter,
    B: LedgerAdapter,
{
    let records = match swap_id {
        Some(swap_id) => vec![db.load_session(&swap_id)?],
        None => db.all_sessions()?,
    };

    for record in records {
        let session = &record.session;
        println!("swap {}: {}", session.id(), session.state());
        if let Some(outcome) = record.outcome {
            println!("  archived: {}", outcome);
        }

        for &side in &[Side::Alpha, Side::Beta] {
            let leg = session.leg(side);
            let now = match side {
                Side::Alpha => alpha_connector.current_time().await.ok(),
                Side::Beta => beta_connector.current_time().await.ok(),
            };

            let remaining = now
                .map(|now| format!("{}s remaining", now.seconds_until(leg.expiry)))
                .unwrap_or_else(|| "ledger clock unavailable".to_string());

            println!(
                "  {} leg on {}: {}, deadline {} ({}), next safe action: {}",
                side,
                leg.ledger,
                leg.state(),
                leg.expiry,
                remaining,
                next_safe_action(leg.state(), now, leg.expiry),
            );
        }
    }

    Ok(())
}

fn next_safe_action(state: LegState, now: Option<Timestamp>, deadline: Timestamp) -> &'static str {
    match state {
        LegState::Pending => "submit lock",
        LegState::LockSubmitted => "await lock confirmation",
        LegState::Locked => match now {
            Some(now) if now >= deadline => "refund",
            Some(_) => "redeem before the deadline",
            None => "unknown without ledger clock",
        },
        LegState::Redeemed | LegState::Refunded => "none, leg resolved",
        LegState::ExpiredUnclaimed => "manual intervention, value at risk",
    }
}

pub async fn force_redeem<A, B, S>(
    swap_id: SwapId,
    side: Side,
    alpha_connector: Arc<A>,
    beta_connector: Arc<B>,
    signer: Arc<S>,
    db: Arc<Database>,
    settings: &Settings,
) -> Result<()>
where
    A: LedgerAdapter,
    B: LedgerAdapter,
    S: KeySigner,
{
    let record = db.load_session(&swap_id)?;
    let mut coordinator = SwapCoordinator::new(
        record.session,
        None,
        alpha_connector,
        beta_connector,
        signer,
        db,
        settings.swap.execution_settings(),
    );

    coordinator.force_redeem(side).await
}

pub async fn force_refund<A, B, S>(
    swap_id: SwapId,
    side: Side,
    alpha_connector: Arc<A>,
    beta_connector: Arc<B>,
    signer: Arc<S>,
    db: Arc<Database>,
    settings: &Settings,
) -> Result<()>
where
    A: LedgerAdapter,
    B: LedgerAdapter,
    S: KeySigner,
{
    let record = db.load_session(&swap_id)?;
    let mut coordinator = SwapCoordinator::new(
        record.session,
        None,
        alpha_connector,
        beta_connector,
        signer,
        db,
        settings.swap.execution_settings(),
    );

    coordinator.force_refund(side).await
}

#[allow(clippy::print_stdout)]
pub fn dump_config(settings: Settings) -> Result<()> {
    let file = File::from(settings);
    let serialized = toml::to_string(&file)?;
    println!("{}", serialized);
    Ok(())
}
