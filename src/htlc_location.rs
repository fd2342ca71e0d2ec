//! Define domain specific terms using htlc_location module so that we can
//! refer to things in an ergonomic fashion e.g., `htlc_location::Cardano`.

pub use crate::{cardano::OutputRef as Cardano, ethereum::Address as Ethereum};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, ledger-specific locator of a leg's locked funds.
///
/// On the UTXO side this is the coordinate of the script output, on the
/// account side the address of the HTLC contract instance. The coordinator
/// never looks inside; it only hands the locator back to the adapter that
/// produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockLocation {
    Cardano(Cardano),
    Ethereum(Ethereum),
}

impl fmt::Display for LockLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockLocation::Cardano(output) => output.fmt(f),
            LockLocation::Ethereum(contract) => contract.fmt(f),
        }
    }
}

impl From<Cardano> for LockLocation {
    fn from(output: Cardano) -> Self {
        LockLocation::Cardano(output)
    }
}

impl From<Ethereum> for LockLocation {
    fn from(contract: Ethereum) -> Self {
        LockLocation::Ethereum(contract)
    }
}
