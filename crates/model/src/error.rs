use std::error::Error;
use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is blocked by the provider's safety filters.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The provider is temporarily unavailable (e.g. HTTP 5xx).
    Unavailable,
    /// The selected model cannot be used with tool definitions.
    ToolsUnsupported,
    /// Any other errors.
    Other,
}

impl ErrorKind {
    /// Returns `true` if retrying the same request later may succeed.
    #[inline]
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::RateLimitExceeded | ErrorKind::Unavailable)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Moderated => write!(f, "content moderated"),
            ErrorKind::RateLimitExceeded => write!(f, "rate limit exceeded"),
            ErrorKind::Unavailable => write!(f, "provider unavailable"),
            ErrorKind::ToolsUnsupported => {
                write!(f, "model does not support tools")
            }
            ErrorKind::Other => write!(f, "other error"),
        }
    }
}

/// Errors reported by a [`ModelProvider`](crate::ModelProvider).
///
/// The agent only looks at the [`ErrorKind`] to decide between retrying,
/// falling back and giving up. The message is for humans.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Classifies this error.
    fn kind(&self) -> ErrorKind;

    /// Shorthand for `self.kind().is_transient()`.
    #[inline]
    fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(ErrorKind::RateLimitExceeded.is_transient());
        assert!(ErrorKind::Unavailable.is_transient());
        assert!(!ErrorKind::ToolsUnsupported.is_transient());
        assert!(!ErrorKind::Moderated.is_transient());
        assert!(!ErrorKind::Other.is_transient());
    }
}
