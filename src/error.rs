//! Error types for certificate renewal.
//!
//! Every failure a single renewal job can hit is represented here, grouped
//! by the stage that produces it: local chain inspection, remote lookup and
//! content retrieval, on-disk replacement and service restart.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::CertificateStatus;

/// Result type alias using [`RenewError`].
pub type Result<T> = std::result::Result<T, RenewError>;

/// Errors that can occur while renewing certificates.
#[derive(Debug, Error)]
pub enum RenewError {
    /// The local certificate chain file could not be read.
    #[error("could not read certificate file {}: {source}", path.display())]
    Read {
        /// Chain file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A PEM block or certificate in the chain could not be decoded.
    #[error("failed to parse certificate: {0}")]
    Parse(String),

    /// The chain file contains no certificate blocks.
    #[error("no certificates found in {}", path.display())]
    NoCertificates {
        /// Chain file path.
        path: PathBuf,
    },

    /// Transport or API failure while looking up a certificate.
    #[error("could not list certificates: {0}")]
    Lookup(String),

    /// Failure while retrieving certificate content.
    #[error("could not fetch certificate contents: {0}")]
    Content(String),

    /// No remote certificate carries the requested name.
    #[error("could not find certificate {name} in folder {folder}")]
    CertificateNotFound {
        /// Certificate name.
        name: String,
        /// Folder the lookup was scoped to.
        folder: String,
    },

    /// The remote certificate is not in the issued state.
    #[error("could not renew certificate {name}: abnormal certificate status {status}")]
    AbnormalStatus {
        /// Certificate name.
        name: String,
        /// Status reported by the remote source.
        status: CertificateStatus,
    },

    /// The existing file could not be copied to its backup.
    #[error("error making backup of {}: {source}", path.display())]
    Backup {
        /// File that was being backed up.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// New content could not be written.
    #[error("error writing {}: {source}", path.display())]
    Write {
        /// File that was being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A service restart failed.
    #[error("failed to restart service {service}: {message}")]
    Restart {
        /// Service name.
        service: String,
        /// Failure description.
        message: String,
    },

    /// IAM token could not be obtained.
    #[error("could not obtain IAM token: {0}")]
    Token(String),

    /// Instance metadata could not be obtained.
    #[error("could not fetch instance metadata: {0}")]
    Metadata(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid duration string.
    #[error("invalid duration: {0}")]
    Duration(String),

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Unexpected internal failure (e.g. a panicked task).
    #[error("internal error: {0}")]
    Internal(String),
}

/// The stage of a renewal job an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading the local chain.
    Inspect,
    /// Looking up the remote certificate.
    Lookup,
    /// Fetching remote content.
    Fetch,
    /// Writing chain or key.
    Install,
    /// Restarting a service.
    Restart,
    /// Anything outside a job (config, metadata, token).
    Setup,
}

impl Stage {
    /// Short lowercase name, used as a log field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inspect => "inspect",
            Self::Lookup => "lookup",
            Self::Fetch => "fetch",
            Self::Install => "install",
            Self::Restart => "restart",
            Self::Setup => "setup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RenewError {
    /// Create a read error for the given path.
    pub fn read(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a parse error with the given message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a lookup error with the given message.
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    /// Create a content error with the given message.
    pub fn content(msg: impl Into<String>) -> Self {
        Self::Content(msg.into())
    }

    /// Create a certificate-not-found error.
    pub fn certificate_not_found(name: impl Into<String>, folder: impl Into<String>) -> Self {
        Self::CertificateNotFound {
            name: name.into(),
            folder: folder.into(),
        }
    }

    /// Create an abnormal status error.
    pub fn abnormal_status(name: impl Into<String>, status: CertificateStatus) -> Self {
        Self::AbnormalStatus {
            name: name.into(),
            status,
        }
    }

    /// Create a backup error for the given path.
    pub fn backup(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Backup {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a write error for the given path.
    pub fn write(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a restart error.
    pub fn restart(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Restart {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a token error.
    pub fn token(msg: impl Into<String>) -> Self {
        Self::Token(msg.into())
    }

    /// Create a metadata error.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a duration error.
    pub fn duration(msg: impl Into<String>) -> Self {
        Self::Duration(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The job stage this error is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Read { .. } | Self::Parse(_) | Self::NoCertificates { .. } => Stage::Inspect,
            Self::Lookup(_) | Self::CertificateNotFound { .. } | Self::AbnormalStatus { .. } => {
                Stage::Lookup
            }
            Self::Content(_) => Stage::Fetch,
            Self::Backup { .. } | Self::Write { .. } => Stage::Install,
            Self::Restart { .. } => Stage::Restart,
            Self::Token(_)
            | Self::Metadata(_)
            | Self::Config(_)
            | Self::Duration(_)
            | Self::Cancelled
            | Self::Internal(_) => Stage::Setup,
        }
    }

    /// Returns true if this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
