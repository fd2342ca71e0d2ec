use crate::{cardano, config::Data, coordinator::RedeemActor, ethereum::ChainId};
use config as config_rs;
use serde::{Deserialize, Serialize};
use std::{ffi::OsStr, path::Path};
use url::Url;

/// This struct aims to represent the configuration file as it appears on disk.
///
/// Most importantly, optional elements of the configuration file are
/// represented as `Option`s` here. This allows us to create a dedicated step
/// for filling in default values for absent configuration options.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct File {
    pub data: Option<Data>,
    pub logging: Option<Logging>,
    pub cardano: Option<Cardano>,
    pub ethereum: Option<Ethereum>,
    pub signer: Option<Signer>,
    pub swap: Option<Swap>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Logging {
    pub level: Option<Level>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<Level> for tracing::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => tracing::Level::ERROR,
            Level::Warn => tracing::Level::WARN,
            Level::Info => tracing::Level::INFO,
            Level::Debug => tracing::Level::DEBUG,
            Level::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Cardano {
    pub network: cardano::Network,
    pub gateway_url: Option<Url>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Ethereum {
    pub chain_id: ChainId,
    pub gateway_url: Option<Url>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Signer {
    pub url: Url,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Swap {
    /// Alpha timelock duration, measured from session creation.
    pub alpha_expiry_secs: Option<u32>,
    /// Beta timelock duration, measured from session creation.
    pub beta_expiry_secs: Option<u32>,
    /// Safety margin the beta expiry must leave before the alpha expiry.
    pub margin_secs: Option<u32>,
    pub poll_interval_secs: Option<u32>,
    pub lock_wait_secs: Option<u32>,
    pub redeem_actor: Option<RedeemActor>,
}

impl File {
    pub fn read<D>(config_file: D) -> Result<Self, config_rs::ConfigError>
    where
        D: AsRef<OsStr>,
    {
        let config_file = Path::new(&config_file);

        let mut config = config_rs::Config::new();
        config.merge(config_rs::File::from(config_file))?;
        config.try_into()
    }
}

impl Default for File {
    fn default() -> Self {
        File {
            data: None,
            logging: None,
            cardano: None,
            ethereum: None,
            signer: None,
            swap: None,
        }
    }
}
