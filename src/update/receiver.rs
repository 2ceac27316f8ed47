//! Server side of an update upload.
//!
//! ```text
//! AwaitingSecret ──mismatch──▶ Rejected
//!       │
//!     match
//!       ▼
//!   Streaming ──zero bytes / I/O error──▶ Failed
//!       │
//!       ▼
//!     Saved  (the caller answers 200, then hands the file to the applier)
//! ```
//!
//! The payload is staged beside the running executable under a random UUID name so the
//! final swap is a rename within one directory. A failed upload leaves its partial file
//! behind.

use crate::config::ConfigReader;
use crate::constants::keys;
use crate::core::HotError;
use axum::http::StatusCode;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Inputs of one upload request.
pub struct UpdateRequestContext<S> {
    /// Caller address (first `X-Forwarded-For` entry or peer address)
    pub source_ip: String,
    /// Value of the `UpdateSecret` header, if any
    pub presented_secret: Option<String>,
    /// Request body
    pub payload: S,
}

/// An uploaded build staged next to the running executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempExecutable {
    pub path: PathBuf,
    pub bytes_written: u64,
    /// `sha256:<hex>` digest of the payload, recorded for the audit log
    pub sha256: String,
}

/// Result of [`UpdatePayloadReceiver::receive`].
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// Payload stored; ready to be applied.
    Saved(TempExecutable),
    /// Secret mismatch. Nothing was written.
    Rejected(HotError),
    /// Configuration problem, empty payload or I/O failure.
    Failed(HotError),
}

impl ReceiveOutcome {
    /// Status code the HTTP layer answers with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Saved(_) => StatusCode::OK,
            Self::Rejected(err) | Self::Failed(err) => err.http_status(),
        }
    }
}

/// Authenticates uploads by shared secret and stages them on disk.
#[derive(Clone)]
pub struct UpdatePayloadReceiver {
    config: Arc<dyn ConfigReader>,
}

impl UpdatePayloadReceiver {
    pub fn new(config: Arc<dyn ConfigReader>) -> Self {
        Self { config }
    }

    /// Check the secret, then stream the payload into a new temp file.
    pub async fn receive<S, B, E>(&self, ctx: UpdateRequestContext<S>) -> ReceiveOutcome
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let UpdateRequestContext {
            source_ip,
            presented_secret,
            payload,
        } = ctx;

        let expected = match self.config.require(keys::UPDATE_SECRET) {
            Ok(secret) => secret,
            Err(err) => {
                error!(source_ip = %source_ip, "Rejecting upload: {}", err);
                return ReceiveOutcome::Failed(err);
            }
        };

        if presented_secret.as_deref() != Some(expected.as_str()) {
            error!(source_ip = %source_ip, "Rejecting upload: invalid update secret");
            return ReceiveOutcome::Rejected(HotError::Unauthorized { source_ip });
        }

        let executable = match self.config.require(keys::EXECUTABLE_FULL_NAME) {
            Ok(path) => PathBuf::from(path),
            Err(err) => return ReceiveOutcome::Failed(err),
        };
        let temp_path = temp_path_for(&executable);

        match stage_payload(&temp_path, payload).await {
            Ok(staged) if staged.bytes_written == 0 => {
                error!(source_ip = %source_ip, "Rejecting upload: empty payload");
                ReceiveOutcome::Failed(HotError::Transfer {
                    reason: "the uploaded payload is empty".to_string(),
                })
            }
            Ok(staged) => {
                info!(
                    source_ip = %source_ip,
                    bytes = staged.bytes_written,
                    checksum = %staged.sha256,
                    "Update received into {}",
                    staged.path.display()
                );
                ReceiveOutcome::Saved(staged)
            }
            Err(err) => {
                error!(source_ip = %source_ip, "Upload failed: {}", err);
                ReceiveOutcome::Failed(err)
            }
        }
    }
}

/// Random file name in the executable's directory.
pub fn temp_path_for(executable: &Path) -> PathBuf {
    let dir = executable.parent().unwrap_or_else(|| Path::new("."));
    dir.join(Uuid::new_v4().to_string())
}

async fn stage_payload<S, B, E>(path: &Path, mut payload: S) -> Result<TempExecutable, HotError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    debug!("Staging upload into {}", path.display());
    let mut file = File::create(path)
        .await
        .map_err(|e| HotError::io("create temp file", path.display(), &e))?;

    let mut hasher = Sha256::new();
    let mut bytes_written = 0u64;

    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| HotError::Transfer {
            reason: format!("body stream interrupted after {bytes_written} bytes: {e}"),
        })?;
        let data = chunk.as_ref();
        file.write_all(data)
            .await
            .map_err(|e| HotError::io("write temp file", path.display(), &e))?;
        hasher.update(data);
        bytes_written += data.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| HotError::io("flush temp file", path.display(), &e))?;

    Ok(TempExecutable {
        path: path.to_path_buf(),
        bytes_written,
        sha256: format!("sha256:{:x}", hasher.finalize()),
    })
}
