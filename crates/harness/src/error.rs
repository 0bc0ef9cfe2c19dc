//! Fatal phase errors.

use std::io;
use thiserror::Error;

/// Errors that prevent a phase from running at all.
///
/// Configuration mistakes are not here: they are clamped, see
/// [`crate::ConfigError`].
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: String,
        #[source]
        source: io::Error,
    },
}
