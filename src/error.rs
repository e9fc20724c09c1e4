// SPDX-License-Identifier: MIT

//! Common error type.
//!
//! Every failure inside the crate is one of these variants.  The public
//! entities (`Process`, `AppContainer`) never hand them back directly: they
//! keep the rendered message and the [`ErrorKind`] of the most recent failure.

use std::path::PathBuf;

use crate::token::Privilege;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to enable {privilege}: {reason}")]
    Privilege { privilege: Privilege, reason: String },

    #[error("no running process matches {0}")]
    NotFound(String),

    #[error("access denied to {target}: {reason}")]
    AccessDenied { target: String, reason: String },

    #[error("unable to open process {pid}: {reason}")]
    ProcessOpen { pid: u32, reason: String },

    #[error("unable to adjust token: {0}")]
    TokenAdjust(String),

    #[error("unknown capability name '{0}'")]
    UnknownCapability(String),

    #[error("appcontainer profile '{name}': {reason}")]
    Profile { name: String, reason: String },

    #[error("unable to grant access to {target}: {reason}")]
    Grant { target: String, reason: String },

    #[error("unable to read manifest {}: {reason}", path.display())]
    ManifestParse { path: PathBuf, reason: String },

    #[error("service {name}: {reason}")]
    Service { name: String, reason: String },

    #[error("unable to launch process: {0}")]
    Launch(String),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

/// Discriminant of [`Error`], kept by the public entities after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Privilege,
    NotFound,
    AccessDenied,
    ProcessOpen,
    TokenAdjust,
    UnknownCapability,
    Profile,
    Grant,
    ManifestParse,
    Service,
    Launch,
    Unsupported,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Privilege { .. } => ErrorKind::Privilege,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::ProcessOpen { .. } => ErrorKind::ProcessOpen,
            Self::TokenAdjust(_) => ErrorKind::TokenAdjust,
            Self::UnknownCapability(_) => ErrorKind::UnknownCapability,
            Self::Profile { .. } => ErrorKind::Profile,
            Self::Grant { .. } => ErrorKind::Grant,
            Self::ManifestParse { .. } => ErrorKind::ManifestParse,
            Self::Service { .. } => ErrorKind::Service,
            Self::Launch(_) => ErrorKind::Launch,
            Self::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    pub(crate) fn profile(name: &str, reason: impl Into<String>) -> Self {
        Self::Profile { name: name.to_string(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;


/// Last-failure record kept by the public entities.
///
/// An empty message means no failure has been recorded since the last call began.
#[derive(Debug, Default, Clone)]
pub(crate) struct Diagnostic {
    message: String,
    kind: Option<ErrorKind>,
}

impl Diagnostic {
    pub fn clear(&mut self) {
        self.message.clear();
        self.kind = None;
    }

    pub fn record(&mut self, err: &Error) {
        self.message = err.to_string();
        self.kind = Some(err.kind());
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.kind
    }
}
