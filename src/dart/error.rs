use crate::transport::TransportError;

use tracing::error;

/// Numeric result codes of the runtime's stable surface.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DartErrorCode {
    Ok = 0,
    InvalidArgument = 1,
    NotSupported = 2,
    ResourceExhausted = 3,
    Other = 4,
}

/// The errors reported by the RMA runtime and propagated up to the container layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DartError {
    /// Unknown segment id, out of range offset, unit or team that does not exist, ...
    /// No runtime state was changed.
    InvalidArgument(String),
    /// The operation is not provided by this backend, the caller must use an alternative path.
    NotSupported(&'static str),
    /// The transfer pool or the segment-id stack is empty, the caller may retry after
    /// completing outstanding transfers.
    ResourceExhausted(String),
    /// Transport level failure.
    Other(String),
}

impl DartError {
    pub fn code(&self) -> DartErrorCode {
        match self {
            DartError::InvalidArgument(_) => DartErrorCode::InvalidArgument,
            DartError::NotSupported(_) => DartErrorCode::NotSupported,
            DartError::ResourceExhausted(_) => DartErrorCode::ResourceExhausted,
            DartError::Other(_) => DartErrorCode::Other,
        }
    }
}

impl std::fmt::Display for DartError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DartError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            DartError::NotSupported(op) => write!(f, "{} is not supported by this backend", op),
            DartError::ResourceExhausted(msg) => write!(f, "resource exhausted: {}", msg),
            DartError::Other(msg) => write!(f, "runtime failure: {}", msg),
        }
    }
}

impl std::error::Error for DartError {}

impl From<TransportError> for DartError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::UnknownSegment(..) | TransportError::OutOfBounds { .. } => {
                DartError::InvalidArgument(err.to_string())
            }
            TransportError::SegmentExists(..) => DartError::InvalidArgument(err.to_string()),
            TransportError::QueueFull(_) | TransportError::AllocFailed(_) => {
                DartError::ResourceExhausted(err.to_string())
            }
            TransportError::InvalidQueue(_) | TransportError::InvalidUnit(_) => {
                DartError::InvalidArgument(err.to_string())
            }
            TransportError::GroupMismatch(_) | TransportError::Shutdown => {
                error!("transport failure: {}", err);
                DartError::Other(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for DartError {
    fn from(err: anyhow::Error) -> Self {
        error!("{}", err);
        DartError::Other(err.to_string())
    }
}

pub type DartResult<T> = Result<T, DartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(
            DartError::InvalidArgument("x".into()).code(),
            DartErrorCode::InvalidArgument
        );
        assert_eq!(DartError::NotSupported("wait").code() as i32, 2);
        assert_eq!(
            DartError::ResourceExhausted("pool".into()).code(),
            DartErrorCode::ResourceExhausted
        );
        assert_eq!(DartError::Other("x".into()).code() as i32, 4);
    }

    #[test]
    fn transport_errors_map_to_kinds() {
        let err: DartError = TransportError::QueueFull(3).into();
        assert_eq!(err.code(), DartErrorCode::ResourceExhausted);
        let err: DartError = TransportError::UnknownSegment(1, 7).into();
        assert_eq!(err.code(), DartErrorCode::InvalidArgument);
        let err: DartError = TransportError::Shutdown.into();
        assert_eq!(err.code(), DartErrorCode::Other);
    }
}
