use vfetch_core::path::PathError;

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("GET {url} failed with {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("response exceeds the limit of {limit} bytes")]
    LimitExceeded { limit: u64 },
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Core(#[from] vfetch_core::Error),
    #[error("request cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GatewayError {
    /// Whether the gateway answered 404 for the request.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::Status { status, .. } if *status == reqwest::StatusCode::NOT_FOUND)
    }
}

impl From<GatewayError> for std::io::Error {
    fn from(err: GatewayError) -> Self {
        std::io::Error::other(err)
    }
}

/// Failures reducing a mutable path to an immutable one.
#[derive(thiserror::Error, Debug)]
pub enum ResolutionError {
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("invalid IPNS record for {name}: {reason}")]
    RecordInvalid { name: String, reason: String },
    #[error("DNSLink resolution of {domain} failed: {reason}")]
    DnsLink { domain: String, reason: String },
    #[error("resolution of {path} does not terminate")]
    ResolutionCycle { path: String },
    #[error("fetching name record failed: {0}")]
    Fetch(#[source] Box<GatewayError>),
}

impl ResolutionError {
    pub(crate) fn invalid_name(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ResolutionError::InvalidName {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn record_invalid(name: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        ResolutionError::RecordInvalid {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<GatewayError> for ResolutionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Resolution(inner) => inner,
            other => ResolutionError::Fetch(Box::new(other)),
        }
    }
}

/// Adapts gateway failures to the `Blockstore` error type, keeping
/// verification and lookup failures recognisable.
pub(crate) fn into_core(err: GatewayError) -> vfetch_core::Error {
    match err {
        GatewayError::Core(inner) => inner,
        other => vfetch_core::Error::Transport(Box::new(other)),
    }
}
