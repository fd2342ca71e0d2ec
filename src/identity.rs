//! Define domain specific terms using identity module so that we can refer to
//! things in an ergonomic fashion e.g., `identity::Cardano`.

pub use crate::{cardano::KeyHash as Cardano, ethereum::Address as Ethereum};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A party's identity on whichever ledger a leg lives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    Cardano(Cardano),
    Ethereum(Ethereum),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Cardano(key_hash) => key_hash.fmt(f),
            Identity::Ethereum(address) => address.fmt(f),
        }
    }
}

impl From<Cardano> for Identity {
    fn from(key_hash: Cardano) -> Self {
        Identity::Cardano(key_hash)
    }
}

impl From<Ethereum> for Identity {
    fn from(address: Ethereum) -> Self {
        Identity::Ethereum(address)
    }
}
