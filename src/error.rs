use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type CallResult<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    AlreadyExecuted,
    ChainExhausted,
    Canceled,
    InvalidMaxRequests,
    CompletionLost,
    CallFailed,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyExecuted => "already_executed",
            Self::ChainExhausted => "chain_exhausted",
            Self::Canceled => "canceled",
            Self::InvalidMaxRequests => "invalid_max_requests",
            Self::CompletionLost => "completion_lost",
            Self::CallFailed => "call_failed",
        }
    }

    pub const fn all() -> [ErrorCode; 6] {
        [
            Self::AlreadyExecuted,
            Self::ChainExhausted,
            Self::Canceled,
            Self::InvalidMaxRequests,
            Self::CompletionLost,
            Self::CallFailed,
        ]
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The same call object was started a second time. Calls are single-use;
    /// clone the call to run the request again.
    #[error("call already executed")]
    AlreadyExecuted,
    /// An interceptor invoked `proceed` past the end of the chain. The last
    /// pipeline stage must produce a response instead of delegating.
    #[error("interceptor chain exhausted: proceed at index {index} of {len}")]
    ChainExhausted { index: usize, len: usize },
    #[error("call canceled")]
    Canceled,
    #[error("max concurrent requests must be at least 1, got {value}")]
    InvalidMaxRequests { value: usize },
    /// The call's worker went away without delivering a terminal outcome,
    /// typically because an interceptor panicked.
    #[error("call worker dropped before delivering a result")]
    CompletionLost,
    #[error("call failed: {source}")]
    Failed {
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Wraps an operation failure raised by an interceptor or transport stage.
    pub fn failed(source: impl Into<BoxError>) -> Self {
        Self::Failed {
            source: source.into(),
        }
    }

    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyExecuted => ErrorCode::AlreadyExecuted,
            Self::ChainExhausted { .. } => ErrorCode::ChainExhausted,
            Self::Canceled => ErrorCode::Canceled,
            Self::InvalidMaxRequests { .. } => ErrorCode::InvalidMaxRequests,
            Self::CompletionLost => ErrorCode::CompletionLost,
            Self::Failed { .. } => ErrorCode::CallFailed,
        }
    }

    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// True for misuse of the API itself, as opposed to a failed operation.
    pub const fn is_contract_violation(&self) -> bool {
        matches!(self, Self::AlreadyExecuted | Self::ChainExhausted { .. })
    }

    /// Only transient operation failures are worth reattempting; cancellation
    /// and contract violations always pass through.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
