//! Companion presence check against the host's program registry.

use std::ffi::OsString;

use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{0}")]
    Unexpected(String),
}

/// Presence check for the companion application in the host's software registry.
///
/// `Ok(false)` means the registry answered and the companion is absent; only
/// a failed lookup is an error.
pub trait CompanionProbe: Send + Sync {
    fn is_installed(&self, identifier: &str) -> Result<bool, ProbeError>;
}

/// Treats the executable search path as the registry: the companion is
/// installed when its identifier resolves to a program on `PATH` (or on an
/// explicit search path), or names an existing program by path.
#[derive(Clone, Debug, Default)]
pub struct PathProbe {
    search_path: Option<OsString>,
}

impl PathProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(paths: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(paths.into()),
        }
    }
}

impl CompanionProbe for PathProbe {
    fn is_installed(&self, identifier: &str) -> Result<bool, ProbeError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ProbeError::Unexpected("companion identifier is empty".to_string()));
        }

        let lookup = match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir()
                    .map_err(|e| ProbeError::Unexpected(e.to_string()))?;
                which::which_in(identifier, Some(paths), cwd)
            }
            None => which::which(identifier),
        };

        match lookup {
            Ok(path) => {
                debug!(identifier, path = %path.display(), "companion found");
                Ok(true)
            }
            Err(which::Error::CannotFindBinaryPath) => {
                debug!(identifier, "companion not installed");
                Ok(false)
            }
            Err(e) => Err(ProbeError::Unexpected(e.to_string())),
        }
    }
}
