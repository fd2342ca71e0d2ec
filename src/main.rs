#![warn(
    unused_extern_crates,
    missing_debug_implementations,
    missing_copy_implementations,
    rust_2018_idioms,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::fallible_impl_from,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::dbg_macro
)]
#![cfg_attr(not(test), warn(clippy::unwrap_used))]
#![forbid(unsafe_code)]

use adaswap::{
    command::{self, Command, Options},
    config::{read_config, Settings},
    database::Database,
    fs::{default_config_path, ensure_directory_exists},
    ledger::LedgerKind,
    rpc::{RpcLedger, RpcSigner},
    trace,
};
use anyhow::{Context, Result};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::from_args();

    let file = read_config(&options.config_file, default_config_path)?;
    let settings = Settings::from_config_file_and_defaults(file)
        .context("could not initialize configuration")?;

    if let Command::DumpConfig = options.cmd {
        command::dump_config(settings).expect("dump config");
        std::process::exit(0);
    }

    trace::init_tracing(settings.logging.level.into()).expect("initialize tracing");

    let db_path = settings.data.dir.join("sessions");
    ensure_directory_exists(&db_path).context("could not create data directory")?;
    let db = Arc::new(Database::new(&db_path)?);

    let alpha_connector = Arc::new(RpcLedger::new(
        settings.cardano.gateway_url.clone(),
        LedgerKind::Cardano,
    ));
    let beta_connector = Arc::new(RpcLedger::new(
        settings.ethereum.gateway_url.clone(),
        LedgerKind::Ethereum,
    ));
    let signer = Arc::new(RpcSigner::new(settings.signer.url.clone()));

    match options.cmd {
        Command::Swap(args) => {
            let state = command::swap(
                args,
                alpha_connector,
                beta_connector,
                signer,
                db,
                &settings,
            )
            .await
            .context("swap failed")?;
            tracing::info!("swap finished as {}", state);
        }
        Command::Status { swap_id } => {
            command::status(swap_id, alpha_connector, beta_connector, db).await?;
        }
        Command::Resume => {
            command::resume(alpha_connector, beta_connector, signer, db, &settings).await?;
        }
        Command::ForceRedeem { swap_id, side } => {
            command::force_redeem(
                swap_id,
                side,
                alpha_connector,
                beta_connector,
                signer,
                db,
                &settings,
            )
            .await?;
        }
        Command::ForceRefund { swap_id, side } => {
            command::force_refund(
                swap_id,
                side,
                alpha_connector,
                beta_connector,
                signer,
                db,
                &settings,
            )
            .await?;
        }
        Command::DumpConfig => unreachable!(),
    };

    Ok(())
}
