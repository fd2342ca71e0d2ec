use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{
    fmt::{self, Debug},
    str::FromStr,
};

pub const SECRET_LENGTH: usize = 32;

/// The preimage both HTLCs are locked on.
///
/// A secret only ever leaves the process embedded in signed transaction
/// material; in particular it is never written to the session database.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct Secret([u8; SECRET_LENGTH]);

impl Secret {
    /// Generates a fresh secret from the operating system's entropy source.
    pub fn random() -> Result<Secret, EntropyError> {
        let mut bytes = [0u8; SECRET_LENGTH];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(EntropyError)?;

        Ok(Secret(bytes))
    }

    pub fn from_vec(vec: &[u8]) -> Result<Secret, InvalidLength> {
        if vec.len() != SECRET_LENGTH {
            return Err(InvalidLength {
                expected: SECRET_LENGTH,
                got: vec.len(),
            });
        }
        let mut data = [0u8; SECRET_LENGTH];
        data.copy_from_slice(vec);

        Ok(Secret(data))
    }

    pub fn as_raw_secret(&self) -> &[u8; SECRET_LENGTH] {
        &self.0
    }

    pub fn into_raw_secret(self) -> [u8; SECRET_LENGTH] {
        self.0
    }
}

impl From<[u8; SECRET_LENGTH]> for Secret {
    fn from(secret: [u8; SECRET_LENGTH]) -> Self {
        Secret(secret)
    }
}

impl fmt::LowerHex for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(hex::encode(&self.0).as_str())
    }
}

impl FromStr for Secret {
    type Err = ParseSecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vec = hex::decode(s)?;
        Ok(Self::from_vec(&vec)?)
    }
}

impl Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:x}", self))
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'vde> de::Visitor<'vde> for Visitor {
            type Value = Secret;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a hex encoded 32 byte value")
            }

            fn visit_str<E>(self, v: &str) -> Result<Secret, E>
            where
                E: de::Error,
            {
                Secret::from_str(v).map_err(|_| {
                    de::Error::invalid_value(de::Unexpected::Str(v), &"hex encoded bytes")
                })
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

/// The commitment shared by both legs: SHA-256 of the secret.
#[derive(Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct SecretHash([u8; SECRET_LENGTH]);

impl SecretHash {
    pub fn new(secret: Secret) -> Self {
        let mut sha = Sha256::new();
        sha.update(secret.as_raw_secret());

        SecretHash(sha.finalize().into())
    }

    pub fn into_raw(self) -> [u8; SECRET_LENGTH] {
        self.0
    }

    pub fn as_raw(&self) -> &[u8; SECRET_LENGTH] {
        &self.0
    }
}

impl From<Secret> for SecretHash {
    fn from(secret: Secret) -> Self {
        SecretHash::new(secret)
    }
}

impl Debug for SecretHash {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&format!("SecretHash({:x})", self))
    }
}

impl fmt::Display for SecretHash {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&format!("{:x}", self))
    }
}

impl fmt::LowerHex for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(hex::encode(&self.0).as_str())
    }
}

impl FromStr for SecretHash {
    type Err = ParseSecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vec = hex::decode(s)?;
        if vec.len() != SECRET_LENGTH {
            return Err(ParseSecretError::InvalidLength(InvalidLength {
                expected: SECRET_LENGTH,
                got: vec.len(),
            }));
        }
        let mut data = [0u8; SECRET_LENGTH];
        data.copy_from_slice(&vec);

        Ok(SecretHash(data))
    }
}

impl Serialize for SecretHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:x}", self))
    }
}

impl<'de> Deserialize<'de> for SecretHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'vde> de::Visitor<'vde> for Visitor {
            type Value = SecretHash;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a hex encoded 32 byte value")
            }

            fn visit_str<E>(self, v: &str) -> Result<SecretHash, E>
            where
                E: de::Error,
            {
                SecretHash::from_str(v).map_err(|_| {
                    de::Error::invalid_value(de::Unexpected::Str(v), &"hex encoded bytes")
                })
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

/// Single owner of a session's secret until it is released into a redeeming
/// transaction or observed revealed on a ledger.
pub struct SecretVault {
    secret: Secret,
}

impl SecretVault {
    pub fn generate() -> Result<Self, EntropyError> {
        Ok(SecretVault {
            secret: Secret::random()?,
        })
    }

    /// The commitment both legs must be constructed with.
    pub fn commitment(&self) -> SecretHash {
        SecretHash::new(self.secret)
    }

    /// Releases the secret for constructing a redeeming transaction.
    ///
    /// The contract around this is enforced by the coordinator: the secret is
    /// only ever transmitted to the counterparty by being embedded in a
    /// signed, submitted transaction on the beta ledger.
    pub fn reveal(&self) -> Secret {
        self.secret
    }
}

impl Debug for SecretVault {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Deliberately does not print the secret.
        fmt.write_str("SecretVault")
    }
}

#[derive(Debug, Copy, Clone, PartialEq, thiserror::Error)]
#[error("expected {expected} bytes, got {got}")]
pub struct InvalidLength {
    expected: usize,
    got: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseSecretError {
    #[error(transparent)]
    InvalidHex(#[from] hex::FromHexError),
    #[error(transparent)]
    InvalidLength(#[from] InvalidLength),
}

#[derive(Debug, thiserror::Error)]
#[error("secure random source unavailable: {0}")]
pub struct EntropyError(#[source] rand::Error);
