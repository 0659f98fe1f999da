use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Ok, Result};
use colored::Colorize;
use serde::Deserialize;

use crate::ledger::DEFAULT_STORAGE_KEY;
use crate::transaction::Chain;

/// Overrides `store.dir`
pub const ENV_STORE_DIR: &str = "XCHAIN_LEDGER_DIR";
/// Overrides `store.key`
pub const ENV_STORE_KEY: &str = "XCHAIN_LEDGER_KEY";

#[derive(Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SectionStore {
    pub dir: PathBuf,
    pub key: String,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SectionExplorer {
    pub sepolia: String,
    pub kopli: String,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SectionWatch {
    pub interval_ms: u64,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: SectionStore,
    pub explorer: SectionExplorer,
    pub watch: SectionWatch,
}

impl Default for SectionStore {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".xchain-ledger"),
            key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl Default for SectionExplorer {
    fn default() -> Self {
        Self {
            sepolia: "https://sepolia.etherscan.io/tx/".to_string(),
            kopli: "https://kopli.reactscan.net/tx/".to_string(),
        }
    }
}

impl Default for SectionWatch {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

impl SectionExplorer {
    /// Link to the transaction page of `tx_hash` on the explorer of `chain`.
    pub fn link(&self, chain: Chain, tx_hash: &str) -> String {
        let base = match chain {
            Chain::Sepolia => &self.sepolia,
            Chain::Kopli => &self.kopli,
        };
        format!("{base}{tx_hash}")
    }
}

impl SectionWatch {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Config> {
        Ok(toml::from_str(content)?)
    }

    /// Applies `XCHAIN_LEDGER_DIR` and `XCHAIN_LEDGER_KEY` if they are set.
    pub fn apply_env(&mut self) {
        if let Some(dir) = env::var_os(ENV_STORE_DIR).filter(|v| !v.is_empty()) {
            self.store.dir = PathBuf::from(dir);
        }
        if let Some(key) = env::var(ENV_STORE_KEY).ok().filter(|v| !v.is_empty()) {
            self.store.key = key;
        }
    }
}

/// Reads a configuration file. The status line goes to stderr so that stdout
/// stays machine readable.
pub fn load(path: impl AsRef<Path>) -> Result<Config> {
    eprintln!(
        "{:>12} config ({}) [{} {}]",
        "Loading".green(),
        path.as_ref().display(),
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    let content = fs::read_to_string(&path).context(format!("Could not read config {}", path.as_ref().display()))?;
    Config::from_toml(&content).context(format!("Invalid config {}", path.as_ref().display()))
}

/// Loads `path` if given, otherwise starts from the defaults. Environment
/// overrides are applied on top in both cases.
pub fn resolve(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load(path)?,
        None => Config::default(),
    };
    config.apply_env();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempdir::TempDir;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.store.key, "cross_chain_transactions");
        assert_eq!(config.watch.interval(), Duration::from_millis(500));
    }

    #[test]
    fn sections_override_defaults_individually() {
        let config = Config::from_toml(
            r#"
            [store]
            dir = "/var/lib/xchain"

            [explorer]
            kopli = "https://explorer.example/tx/"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.dir, PathBuf::from("/var/lib/xchain"));
        assert_eq!(config.store.key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.explorer.sepolia, "https://sepolia.etherscan.io/tx/");
        assert_eq!(
            config.explorer.link(Chain::Kopli, "0x12"),
            "https://explorer.example/tx/0x12"
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Config::from_toml("[store]\npath = \"x\"").is_err());
        assert!(Config::from_toml("[metrics]\nenable = true").is_err());
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = Config::from_toml("[watch]\ninterval_ms = 0").unwrap();
        assert_eq!(config.watch.interval(), Duration::from_millis(1));
    }

    #[test]
    fn load_reads_file_and_reports_missing_ones() {
        let tmp = TempDir::new("xchain-config").unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[store]\nkey = \"history\"\n").unwrap();
        assert_eq!(load(&path).unwrap().store.key, "history");

        let err = load(tmp.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Could not read config"));
    }

    #[test]
    #[serial(env)]
    fn environment_overrides_file() {
        let tmp = TempDir::new("xchain-config").unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[store]\ndir = \"from-file\"\nkey = \"from-file\"\n").unwrap();

        env::set_var(ENV_STORE_DIR, "/tmp/from-env");
        env::remove_var(ENV_STORE_KEY);
        let config = resolve(Some(path.as_path())).unwrap();
        env::remove_var(ENV_STORE_DIR);

        assert_eq!(config.store.dir, PathBuf::from("/tmp/from-env"));
        assert_eq!(config.store.key, "from-file");
    }

    #[test]
    #[serial(env)]
    fn resolve_without_file_uses_defaults() {
        env::remove_var(ENV_STORE_DIR);
        env::set_var(ENV_STORE_KEY, "alt_history");
        let config = resolve(None).unwrap();
        env::remove_var(ENV_STORE_KEY);

        assert_eq!(config.store.dir, PathBuf::from(".xchain-ledger"));
        assert_eq!(config.store.key, "alt_history");
    }
}
