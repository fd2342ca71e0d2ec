pub mod file;
pub mod settings;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use self::{file::File, settings::*};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Data {
    pub dir: PathBuf,
}

pub fn read_config<T>(config_file: &Option<PathBuf>, default_config_path: T) -> anyhow::Result<File>
where
    T: FnOnce() -> anyhow::Result<PathBuf>,
{
    let path = config_file
        .as_ref()
        .map(|path| {
            eprintln!("Using config file {}", path.display());
            path
        })
        .map_or_else(
            || {
                // try to load default config
                let default_path = default_config_path()?;

                if default_path.exists() {
                    eprintln!(
                        "Using config file at default path: {}",
                        default_path.display()
                    );
                    Ok(default_path)
                } else {
                    eprintln!("Config file default path is {}", default_path.display());
                    Err(anyhow!("internal error (unreachable)"))
                }
            },
            |path| Ok(path.to_path_buf()),
        )
        .ok();
    match path {
        Some(path) => File::read(&path)
            .with_context(|| format!("failed to read config file {}", path.display())),
        None => Ok(File::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cardano, config::file::Level, ethereum::ChainId};
    use std::{fs, io::Write};

    #[test]
    fn sample_config_deserializes_correctly() {
        let expected = File {
            data: Some(Data {
                dir: "/home/alice/.local/share/adaswap".parse().unwrap(),
            }),
            logging: Some(file::Logging {
                level: Some(Level::Info),
            }),
            cardano: Some(file::Cardano {
                network: cardano::Network::Preprod,
                gateway_url: Some("http://localhost:9090/".parse().unwrap()),
            }),
            ethereum: Some(file::Ethereum {
                chain_id: ChainId::SEPOLIA,
                gateway_url: Some("http://localhost:9091/".parse().unwrap()),
            }),
            signer: Some(file::Signer {
                url: "http://localhost:9092/".parse().unwrap(),
            }),
            swap: Some(file::Swap {
                alpha_expiry_secs: Some(86_400),
                beta_expiry_secs: Some(43_200),
                margin_secs: Some(3_600),
                poll_interval_secs: Some(1),
                lock_wait_secs: Some(3_600),
                redeem_actor: Some(crate::coordinator::RedeemActor::Initiator),
            }),
        };

        let config = read_config(&Some(PathBuf::from("sample-config.toml")), || {
            unreachable!()
        })
        .unwrap();

        assert_eq!(config, expected);
    }

    #[test]
    fn read_config_uses_default_path() {
        let tmp_dir = tempfile::TempDir::new().unwrap();
        let default_path = tmp_dir.path().join("config.toml");

        let mut file = fs::File::create(default_path.clone()).unwrap();
        file.write_all(b"[data]\ndir = \"/not/a/default/location/\"")
            .unwrap();

        let default_path_fn = || Ok(default_path);

        let config = read_config(&None, default_path_fn).unwrap();
        assert_eq!(
            config.data.unwrap().dir,
            PathBuf::from("/not/a/default/location/")
        )
    }

    #[test]
    fn read_config_returns_default_config_if_default_path_errors() {
        let default_path_fn = || Err(anyhow!("Some error"));

        let config = read_config(&None, default_path_fn).unwrap();
        assert_eq!(config, File::default())
    }

    #[test]
    fn read_config_errors_if_passed_path_doesnt_exist() {
        let default_path_fn = || unreachable!();

        let config = read_config(
            &Some(PathBuf::from("/this/path/doesnt/exist")),
            default_path_fn,
        );
        assert!(config.is_err())
    }
}
