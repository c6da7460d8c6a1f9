//! Errors that can abort process bootstrap, distinct from the per-packet
//! [`compositor_core::ProtocolError`]s the dispatcher already logs and
//! recovers from on its own.
use thiserror::Error as ThisError;

/// Failures that can occur while standing the process up, before the main
/// loops start running.
#[derive(Debug, ThisError)]
pub enum StartupError {
    /// Binding or preparing the listening socket failed.
    #[error("failed to bind socket at {path}: {source}")]
    Socket {
        /// Socket path that failed to bind.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Launching the first client (trailing CLI args, or the login shell
    /// if none were given) failed.
    #[error("failed to spawn first client {command:?}: {source}")]
    Spawn {
        /// Command that failed to launch.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
