use crate::{
    cardano,
    config::{file, Data, File},
    coordinator::{ExecutionSettings, RedeemActor},
    ethereum::ChainId,
    fs,
    monitor::PollSettings,
};
use anyhow::{Context, Result};
use std::time::Duration;
use url::Url;

/// The validated configuration the application runs with: every option of
/// [`File`] with the defaults filled in.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub data: Data,
    pub logging: Logging,
    pub cardano: Cardano,
    pub ethereum: Ethereum,
    pub signer: Signer,
    pub swap: Swap,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Logging {
    pub level: file::Level,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: file::Level::Info,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cardano {
    pub network: cardano::Network,
    pub gateway_url: Url,
}

impl Default for Cardano {
    fn default() -> Self {
        Cardano {
            network: cardano::Network::default(),
            gateway_url: "http://localhost:9090"
                .parse()
                .expect("static string to be a valid url"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ethereum {
    pub chain_id: ChainId,
    pub gateway_url: Url,
}

impl Default for Ethereum {
    fn default() -> Self {
        Ethereum {
            chain_id: ChainId::SEPOLIA,
            gateway_url: "http://localhost:9091"
                .parse()
                .expect("static string to be a valid url"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Signer {
    pub url: Url,
}

impl Default for Signer {
    fn default() -> Self {
        Signer {
            url: "http://localhost:9092"
                .parse()
                .expect("static string to be a valid url"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Swap {
    pub alpha_expiry: Duration,
    pub beta_expiry: Duration,
    pub margin: Duration,
    pub poll_interval: Duration,
    pub lock_wait: Duration,
    pub redeem_actor: RedeemActor,
}

impl Default for Swap {
    fn default() -> Self {
        Swap {
            alpha_expiry: Duration::from_secs(24 * 3600),
            beta_expiry: Duration::from_secs(12 * 3600),
            margin: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(1),
            lock_wait: Duration::from_secs(3600),
            redeem_actor: RedeemActor::default(),
        }
    }
}

impl Swap {
    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            poll: PollSettings {
                interval: self.poll_interval,
                ..PollSettings::default()
            },
            lock_wait: self.lock_wait,
            redeem_retry_interval: Duration::from_secs(10),
            refund_retry_timeout: Duration::from_secs(3600),
            redeem_actor: self.redeem_actor,
        }
    }
}

impl Settings {
    pub fn from_config_file_and_defaults(config_file: File) -> Result<Self> {
        let File {
            data,
            logging,
            cardano,
            ethereum,
            signer,
            swap,
        } = config_file;

        let data = match data {
            Some(data) => data,
            None => Data {
                dir: fs::data_dir().context("unable to determine default data dir")?,
            },
        };

        let logging = logging
            .and_then(|logging| logging.level)
            .map(|level| Logging { level })
            .unwrap_or_default();

        let cardano = cardano
            .map(|cardano| Cardano {
                network: cardano.network,
                gateway_url: cardano
                    .gateway_url
                    .unwrap_or_else(|| Cardano::default().gateway_url),
            })
            .unwrap_or_default();

        let ethereum = ethereum
            .map(|ethereum| Ethereum {
                chain_id: ethereum.chain_id,
                gateway_url: ethereum
                    .gateway_url
                    .unwrap_or_else(|| Ethereum::default().gateway_url),
            })
            .unwrap_or_default();

        let signer = signer
            .map(|signer| Signer { url: signer.url })
            .unwrap_or_default();

        let swap = swap
            .map(|swap| {
                let defaults = Swap::default();
                Swap {
                    alpha_expiry: swap
                        .alpha_expiry_secs
                        .map(|secs| Duration::from_secs(u64::from(secs)))
                        .unwrap_or(defaults.alpha_expiry),
                    beta_expiry: swap
                        .beta_expiry_secs
                        .map(|secs| Duration::from_secs(u64::from(secs)))
                        .unwrap_or(defaults.beta_expiry),
                    margin: swap
                        .margin_secs
                        .map(|secs| Duration::from_secs(u64::from(secs)))
                        .unwrap_or(defaults.margin),
                    poll_interval: swap
                        .poll_interval_secs
                        .map(|secs| Duration::from_secs(u64::from(secs)))
                        .unwrap_or(defaults.poll_interval),
                    lock_wait: swap
                        .lock_wait_secs
                        .map(|secs| Duration::from_secs(u64::from(secs)))
                        .unwrap_or(defaults.lock_wait),
                    redeem_actor: swap.redeem_actor.unwrap_or_default(),
                }
            })
            .unwrap_or_default();

        Ok(Settings {
            data,
            logging,
            cardano,
            ethereum,
            signer,
            swap,
        })
    }
}

#[allow(clippy::cast_possible_truncation)]
impl From<Settings> for File {
    fn from(settings: Settings) -> Self {
        let Settings {
            data,
            logging,
            cardano,
            ethereum,
            signer,
            swap,
        } = settings;

        File {
            data: Some(data),
            logging: Some(file::Logging {
                level: Some(logging.level),
            }),
            cardano: Some(file::Cardano {
                network: cardano.network,
                gateway_url: Some(cardano.gateway_url),
            }),
            ethereum: Some(file::Ethereum {
                chain_id: ethereum.chain_id,
                gateway_url: Some(ethereum.gateway_url),
            }),
            signer: Some(file::Signer { url: signer.url }),
            swap: Some(file::Swap {
                alpha_expiry_secs: Some(swap.alpha_expiry.as_secs() as u32),
                beta_expiry_secs: Some(swap.beta_expiry.as_secs() as u32),
                margin_secs: Some(swap.margin.as_secs() as u32),
                poll_interval_secs: Some(swap.poll_interval.as_secs() as u32),
                lock_wait_secs: Some(swap.lock_wait.as_secs() as u32),
                redeem_actor: Some(swap.redeem_actor),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;

    #[test]
    fn defaults_fill_an_empty_file() {
        let settings = Settings::from_config_file_and_defaults(File::default()).unwrap();

        assert_that(&settings.logging.level).is_equal_to(file::Level::Info);
        assert_that(&settings.cardano.network).is_equal_to(cardano::Network::Preprod);
        assert_that(&settings.swap.alpha_expiry).is_equal_to(Duration::from_secs(86_400));
        assert_that(&settings.swap.beta_expiry).is_equal_to(Duration::from_secs(43_200));
        assert_that(&settings.swap.margin).is_equal_to(Duration::from_secs(3_600));
        assert_that(&settings.swap.redeem_actor).is_equal_to(RedeemActor::Initiator);
    }

    #[test]
    fn file_values_win_over_defaults() {
        let file = File {
            swap: Some(file::Swap {
                alpha_expiry_secs: Some(7_200),
                beta_expiry_secs: Some(3_600),
                margin_secs: Some(600),
                poll_interval_secs: None,
                lock_wait_secs: None,
                redeem_actor: Some(RedeemActor::Counterparty),
            }),
            ..File::default()
        };

        let settings = Settings::from_config_file_and_defaults(file).unwrap();

        assert_that(&settings.swap.alpha_expiry).is_equal_to(Duration::from_secs(7_200));
        assert_that(&settings.swap.poll_interval).is_equal_to(Duration::from_secs(1));
        assert_that(&settings.swap.redeem_actor).is_equal_to(RedeemActor::Counterparty);
    }

    #[test]
    fn settings_round_trip_through_file() {
        let settings = Settings::from_config_file_and_defaults(File::default()).unwrap();
        let file = File::from(settings.clone());
        let rinsed = Settings::from_config_file_and_defaults(file).unwrap();

        assert_eq!(settings, rinsed);
    }
}
