//! Error types and handling for the boundary core

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error types for the host/DSP boundary core.
///
/// Render-path code never surfaces these directly — transport failures are
/// recorded in status flags and drop counters instead. `CoreError` is the
/// currency of initialization and host-side configuration.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Memory allocation or mapping failures
    #[error("Memory error: {message}")]
    Memory { message: String },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Engine construction failed at init
    #[error("Engine init error: {message}")]
    EngineInit { message: String },

    /// Ring or pool is full (producer-side soft failure)
    #[error("Buffer full: {buffer_type}")]
    BufferFull { buffer_type: String },

    /// Alignment requirements not met
    #[error("Alignment error: address {address:#x} not aligned to {alignment}")]
    Alignment { address: usize, alignment: usize },

    /// Platform-specific errors (memfd, mmap)
    #[error("Platform error: {message}")]
    Platform { message: String },
}

impl CoreError {
    /// Create a memory error
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an engine init error
    pub fn engine_init(message: impl Into<String>) -> Self {
        Self::EngineInit {
            message: message.into(),
        }
    }

    /// Create a buffer full error
    pub fn buffer_full(buffer_type: impl Into<String>) -> Self {
        Self::BufferFull {
            buffer_type: buffer_type.into(),
        }
    }

    /// Create an alignment error
    pub fn alignment(address: usize, alignment: usize) -> Self {
        Self::Alignment { address, alignment }
    }

    /// Create a platform error
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::platform(format!("I/O operation failed: {}", err))
    }
}
