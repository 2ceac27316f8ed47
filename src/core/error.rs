//! Error handling for hothost
//!
//! The error system follows two rules:
//! 1. **Strongly-typed errors** ([`HotError`]) so request handlers and the update
//!    orchestrator can branch on the failure class.
//! 2. **User-friendly messages** ([`ErrorContext`]) with actionable suggestions for
//!    operators running the CLI.
//!
//! # Error Classes
//!
//! | Variant | Scope | Fatal |
//! |---|---|---|
//! | [`HotError::Configuration`] | missing/invalid `Update:*` and friends | yes |
//! | [`HotError::Unauthorized`] / [`HotError::Forbidden`] | one request | no |
//! | [`HotError::Transfer`] | one upload | no |
//! | [`HotError::VersionMismatch`] | aborts an orchestration | no |
//! | [`HotError::Platform`] | unsupported OS | yes |
//! | [`HotError::Network`] | depends on call site | yes when surfaced |
//!
//! Authorization and transfer failures never leave the request: they are turned into an
//! HTTP status and a log line. Everything else propagates to the CLI, which renders it with
//! [`user_friendly_error`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use hothost::core::{HotError, user_friendly_error};
//!
//! let err = HotError::missing_key("Update:URL");
//! let ctx = user_friendly_error(anyhow::Error::from(err));
//! ctx.display();
//! ```

use axum::http::StatusCode;
use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for hothost operations.
#[derive(Error, Debug, Clone)]
pub enum HotError {
    /// A configuration key required by the current operation is missing or invalid.
    #[error("Configuration error for '{key}': {reason}")]
    Configuration {
        /// The configuration key, in `Section:Key` form
        key: String,
        /// Why the value cannot be used
        reason: String,
    },

    /// A configuration file could not be parsed.
    #[error("Failed to parse configuration file {file}: {reason}")]
    ConfigParse {
        /// The offending file
        file: String,
        /// Parser message
        reason: String,
    },

    /// The presented update secret did not match.
    #[error("Unauthorized request from {source_ip}")]
    Unauthorized {
        /// Caller address as seen by the listener
        source_ip: String,
    },

    /// The caller's address is not on the allow-list.
    #[error("Address {source_ip} is not allowed")]
    Forbidden {
        /// Caller address as seen by the listener
        source_ip: String,
    },

    /// An upload was empty or failed mid-stream.
    #[error("Update transfer failed: {reason}")]
    Transfer {
        /// What went wrong while staging the payload
        reason: String,
    },

    /// Remote and local identities do not allow an update.
    #[error("Update not applicable: {reason}")]
    VersionMismatch {
        /// Human readable description (app name mismatch, versions equal, remote newer)
        reason: String,
    },

    /// The running platform has no update applier.
    #[error("Self-update is not supported on {os}")]
    Platform {
        /// `std::env::consts::OS` of the running process
        os: String,
    },

    /// The remote instance could not be reached or answered unexpectedly.
    #[error("Network error talking to {url}: {reason}")]
    Network {
        /// Target URL
        url: String,
        /// Failure description
        reason: String,
    },

    /// Filesystem error with the operation and path attached.
    #[error("I/O error during {operation} on {path}: {reason}")]
    Io {
        /// What was being attempted (e.g. "create temp file")
        operation: String,
        /// Path involved
        path: String,
        /// Underlying message
        reason: String,
    },

    /// Anything that does not fit the classes above.
    #[error("{message}")]
    Other {
        /// Full message including the cause chain
        message: String,
    },
}

impl HotError {
    /// Shorthand for a required key that has no value.
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            reason: "value is required but not configured".to_string(),
        }
    }

    /// Build an [`HotError::Io`] from a `std::io::Error`.
    pub fn io(operation: impl Into<String>, path: impl fmt::Display, err: &std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.to_string(),
            reason: err.to_string(),
        }
    }

    /// Whether the error should stop the process-level operation that raised it.
    ///
    /// Per-request failures (authorization, transfer) and version mismatches are
    /// recoverable: the caller may retry later.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::ConfigParse { .. }
                | Self::Platform { .. }
                | Self::Network { .. }
                | Self::Io { .. }
        )
    }

    /// HTTP status used when this error terminates a request.
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthorized { .. } | Self::Forbidden { .. } => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error wrapper carrying an operator-facing suggestion and details.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: HotError,
    /// What the operator can do about it
    pub suggestion: Option<String>,
    /// Extra explanation
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: HotError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Whether a command failure needs operator attention.
///
/// Errors that are not a [`HotError`] count as fatal.
#[must_use]
pub fn is_fatal_error(error: &anyhow::Error) -> bool {
    error.downcast_ref::<HotError>().is_none_or(HotError::is_fatal)
}

/// Convert any error into an [`ErrorContext`] suitable for the terminal.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(hot_error) = error.downcast_ref::<HotError>() {
        return create_error_context(hot_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::PermissionDenied
    {
        return ErrorContext::new(HotError::Io {
            operation: "file access".to_string(),
            path: "unknown".to_string(),
            reason: io_error.to_string(),
        })
        .with_suggestion(
            "The executable's directory must be writable by the service account to stage updates",
        );
    }

    // Generic error - include the full error chain
    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(HotError::Other {
        message,
    })
}

fn create_error_context(error: HotError) -> ErrorContext {
    match &error {
        HotError::Configuration { key, .. } => {
            let suggestion = format!(
                "Set '{key}' in appsettings.toml, via HOT_{} or with --set {key}=...",
                key.to_uppercase().replace(':', "__")
            );
            ErrorContext::new(error).with_suggestion(suggestion).with_details(
                "Run 'hothost helpconfig' to list the files and variables that are consulted",
            )
        }
        HotError::ConfigParse { .. } => ErrorContext::new(error)
            .with_suggestion("Check the TOML syntax: quotes, brackets and [Section] headers"),
        HotError::VersionMismatch { .. } => ErrorContext::new(error).with_details(
            "Only a strictly newer build of the same application is pushed to the remote instance",
        ),
        HotError::Platform { .. } => ErrorContext::new(error)
            .with_details("In-place replacement is implemented for Windows and Linux only"),
        HotError::Network { url, .. } => {
            let suggestion = format!("Check that the remote instance is listening on {url}");
            ErrorContext::new(error).with_suggestion(suggestion)
        }
        HotError::Unauthorized { .. } => ErrorContext::new(error).with_suggestion(
            "Both instances must share the same 'Update:Secret' value",
        ),
        HotError::Forbidden { .. } => ErrorContext::new(error).with_suggestion(
            "Add the caller's network to 'Update:AcceptFrom' on the remote instance",
        ),
        HotError::Transfer { .. } | HotError::Io { .. } | HotError::Other { .. } => {
            ErrorContext::new(error)
        }
    }
}
