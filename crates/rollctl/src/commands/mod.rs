pub mod init;
pub mod mark;
pub mod register;
pub mod rollout;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::ValueEnum;
use rollguard_core::RollguardConfig;
use rollguard_state::{StateError, StateStore};
use tracing::debug;

use crate::local_store::{OPEN_ATTEMPTS, OPEN_BACKOFF};

/// Store directory used when neither `--data-dir` nor `[store].path` is set.
pub const DEFAULT_DATA_DIR: &str = ".rollguard";
const STORE_FILE: &str = "state.redb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Loaded configuration plus the resolved store location.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: RollguardConfig,
    pub store_path: PathBuf,
}

impl Context {
    pub fn load(config_path: &Path, data_dir: Option<&Path>) -> anyhow::Result<Self> {
        let config = if config_path.exists() {
            RollguardConfig::from_file(config_path)
                .with_context(|| format!("loading {}", config_path.display()))?
        } else {
            debug!(path = %config_path.display(), "no config file, using defaults");
            RollguardConfig::default()
        };

        let store_path = match (data_dir, config.store_path()) {
            (Some(dir), _) => dir.join(STORE_FILE),
            (None, Some(path)) => path.to_path_buf(),
            (None, None) => Path::new(DEFAULT_DATA_DIR).join(STORE_FILE),
        };

        Ok(Self { config, store_path })
    }

    /// Open the store, waiting briefly if a running rollout holds the lock.
    pub fn open_store(&self) -> anyhow::Result<StateStore> {
        if let Some(parent) = self.store_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let mut attempt = 1;
        loop {
            match StateStore::open(&self.store_path) {
                Err(StateError::Locked(_)) if attempt < OPEN_ATTEMPTS => {
                    debug!(path = %self.store_path.display(), attempt, "store locked, retrying");
                    attempt += 1;
                    std::thread::sleep(OPEN_BACKOFF);
                }
                result => {
                    return result.with_context(|| {
                        format!("opening store at {}", self.store_path.display())
                    });
                }
            }
        }
    }
}
