//! Error types for rendering and serving

use thiserror::Error;

/// Result type alias for renderer and server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering or starting the server
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to launch the browser or open a tab
    #[error("Engine initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load the temporary document
    #[error("Failed to load document: {0}")]
    LoadError(String),

    /// Failed to render or capture content
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// A bounded wait ran out; the render timed out
    #[error("Render timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Filesystem failure (temp document, artifact, static file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binding the listener failed for a reason other than the port being taken
    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Every candidate port was already in use
    #[error("No free port in {start}..={last} after {attempts} retries")]
    PortsExhausted { start: u16, last: u16, attempts: u32 },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error came from a bounded wait expiring
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}
