//! Trust anchor bundles.

use std::path::{Path, PathBuf};

use sockline::TrustAnchorSet;
use tracing::{debug, info};

use crate::error::HttpError;

/// Where the PEM root certificates for a fetcher come from.
#[derive(Debug, Clone)]
pub enum TrustBundle {
    /// PEM text compiled into the binary, e.g. with `include_str!`.
    Embedded(Vec<&'static str>),
    /// PEM files, loaded in the given order.
    Files(Vec<PathBuf>),
    /// Every `*.pem` file in a directory, loaded in file name order.
    Directory(PathBuf),
}

impl TrustBundle {
    /// Load every anchor, one after the other, and build the trust set.
    ///
    /// The first unreadable or unparsable anchor fails the whole load. An
    /// empty bundle is an error.
    pub async fn load(&self) -> Result<TrustAnchorSet, HttpError> {
        let pems: Vec<String> = match self {
            TrustBundle::Embedded(pems) => pems.iter().map(|p| p.to_string()).collect(),
            TrustBundle::Files(paths) => read_all(paths).await?,
            TrustBundle::Directory(dir) => read_all(&pem_files(dir).await?).await?,
        };
        if pems.is_empty() {
            return Err(HttpError::TrustStore("no trust anchors found".into()));
        }

        let count = pems.len();
        let set = TrustAnchorSet::from_pems(pems).map_err(|e| match e {
            sockline::Error::TrustAnchor(msg) => HttpError::TrustStore(msg),
            other => HttpError::Transport(other),
        })?;
        info!(anchors = count, "trust anchors loaded");
        Ok(set)
    }
}

async fn read_all(paths: &[PathBuf]) -> Result<Vec<String>, HttpError> {
    let mut pems = Vec::with_capacity(paths.len());
    for path in paths {
        debug!(path = %path.display(), "reading trust anchor");
        let pem = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HttpError::TrustStore(format!("{}: {e}", path.display())))?;
        pems.push(pem);
    }
    Ok(pems)
}

async fn pem_files(dir: &Path) -> Result<Vec<PathBuf>, HttpError> {
    let io_err = |e: std::io::Error| HttpError::TrustStore(format!("{}: {e}", dir.display()));
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "pem") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
