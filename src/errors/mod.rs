use thiserror::Error;

/// Typed error hierarchy for larkbridge.
///
/// Use at module boundaries (transport calls, backend calls, session store,
/// config validation). Internal/leaf functions can continue using
/// `anyhow::Result`; the `Internal` variant converts via
/// the `?` operator.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `RelayError`.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

impl RelayError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// Whether this error should terminate the process when raised at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// The message shown to chat users in an error card.
    ///
    /// Uses the innermost message so users don't see the taxonomy prefix.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(m) | Self::Transport(m) | Self::Backend(m) | Self::Persistence(m) => {
                m.clone()
            }
            Self::Internal(e) => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests;
