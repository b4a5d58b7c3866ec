//! Bootstrap script handling
//!
//! A PHPUnit bootstrap script is executed before discovery to register
//! autoloading. Without a PHP runtime the closest equivalent is reading the
//! script so the classes it declares become resolvable. Whether a missing
//! script is fatal is an explicit [`BootstrapPolicy`].

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FinderError, Result};

/// What to do with the bootstrap file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapPolicy {
    /// The file must exist and be readable
    #[default]
    Require,
    /// Load the file when present, skip it otherwise
    Optional,
    /// Never touch the file
    Skip,
}

/// A loaded bootstrap script
#[derive(Debug, Clone)]
pub struct BootstrapScript {
    pub path: PathBuf,
    pub source: String,
}

/// Load the bootstrap script at `path` according to `policy`
pub async fn load_bootstrap(path: &Path, policy: BootstrapPolicy) -> Result<Option<BootstrapScript>> {
    if policy == BootstrapPolicy::Skip {
        tracing::debug!(path = %path.display(), "bootstrap skipped by policy");
        return Ok(None);
    }

    match tokio::fs::read(path).await {
        Ok(bytes) => {
            tracing::info!(path = %path.display(), "loaded bootstrap file");
            Ok(Some(BootstrapScript {
                path: path.to_path_buf(),
                source: String::from_utf8_lossy(&bytes).into_owned(),
            }))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => match policy {
            BootstrapPolicy::Optional => {
                tracing::warn!(path = %path.display(), "bootstrap file not found, continuing without it");
                Ok(None)
            }
            _ => Err(FinderError::BootstrapNotFound {
                path: path.to_path_buf(),
            }),
        },
        Err(err) => Err(FinderError::Io(err)),
    }
}
