//! Types for the UTXO-based, script-governed side of a swap.
//!
//! Funds locked under an HTLC validator sit in a script output identified by a
//! transaction id and an output index; spending that output carries the
//! redeemer (and therefore the revealed secret) in its witness set.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// A payment verification key hash, the identity the validator checks
/// signatures against (blake2b-224, hence 28 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyHash([u8; 28]);

impl KeyHash {
    pub fn as_bytes(&self) -> &[u8; 28] {
        &self.0
    }
}

impl From<[u8; 28]> for KeyHash {
    fn from(bytes: [u8; 28]) -> Self {
        KeyHash(bytes)
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHash({})", self)
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl FromStr for KeyHash {
    type Err = ParseCardanoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vec = hex::decode(s)?;
        if vec.len() != 28 {
            return Err(ParseCardanoError::InvalidLength {
                expected: 28,
                got: vec.len(),
            });
        }
        let mut bytes = [0u8; 28];
        bytes.copy_from_slice(&vec);

        Ok(KeyHash(bytes))
    }
}

impl Serialize for KeyHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for KeyHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        KeyHash::from_str(&s)
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&s), &"a hex encoded 28 byte key hash"))
    }
}

/// A transaction id (blake2b-256 of the transaction body).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId([u8; 32]);

impl From<[u8; 32]> for TxId {
    fn from(bytes: [u8; 32]) -> Self {
        TxId(bytes)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl FromStr for TxId {
    type Err = ParseCardanoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vec = hex::decode(s)?;
        if vec.len() != 32 {
            return Err(ParseCardanoError::InvalidLength {
                expected: 32,
                got: vec.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&vec);

        Ok(TxId(bytes))
    }
}

impl Serialize for TxId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TxId::from_str(&s)
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&s), &"a hex encoded 32 byte transaction id"))
    }
}

/// The coordinate of the script output holding the locked funds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub tx_id: TxId,
    pub index: u32,
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

/// The Cardano network the swap runs on.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
    strum_macros::Display, strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Network {
    Mainnet,
    Preprod,
    Preview,
}

impl Default for Network {
    fn default() -> Self {
        Network::Preprod
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseCardanoError {
    #[error(transparent)]
    InvalidHex(#[from] hex::FromHexError),
    #[error("expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_ref_displays_as_txid_and_index() {
        let output = OutputRef {
            tx_id: TxId::from([0x22; 32]),
            index: 1,
        };

        assert_eq!(
            output.to_string(),
            "2222222222222222222222222222222222222222222222222222222222222222#1"
        );
    }

    #[test]
    fn network_deserializes_from_lowercase() {
        let network: Network = serde_json::from_str(r#""preprod""#).unwrap();
        assert_eq!(network, Network::Preprod);
    }
}
