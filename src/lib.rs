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
    clippy::print_stdout,
    clippy::dbg_macro
)]
#![forbid(unsafe_code)]

pub mod cardano;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod ethereum;
pub mod fs;
pub mod htlc_location;
pub mod identity;
pub mod ledger;
pub mod leg;
pub mod monitor;
pub mod redeem;
pub mod rpc;
mod secret;
pub mod session;
mod swap_id;
mod timestamp;
pub mod trace;
pub mod window;

pub use self::{
    secret::{EntropyError, Secret, SecretHash, SecretVault, SECRET_LENGTH},
    swap_id::SwapId,
    timestamp::Timestamp,
};

/// The two sides of a swap.
///
/// We call them `Alpha` and `Beta` because those are neutral descriptions that
/// are true for both parties: whoever you ask, the alpha leg is the one that is
/// locked first and carries the longer expiry, and the beta leg is the one
/// whose redemption reveals the secret. Talking about "my leg" or "the Cardano
/// leg" breaks down as soon as roles or ledgers are swapped around.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumString,
    serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Alpha,
    Beta,
}
