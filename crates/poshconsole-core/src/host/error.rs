/// Error type for host operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Input was closed before a value was read")]
    InputClosed,
}

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;
