use std::any::Any;

use thiserror::Error;

use crate::device::{ErrorKind, GraphicsError};

/// Error returned across the host boundary: a stable kind plus a
/// human-readable diagnostic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}: {}", .kind.name(), .diagnostic)]
pub struct HostError {
    pub kind: ErrorKind,
    pub diagnostic: String,
}

pub type HostResult<T> = Result<T, HostError>;

impl HostError {
    pub fn new(kind: ErrorKind, diagnostic: impl Into<String>) -> Self {
        Self { kind, diagnostic: diagnostic.into() }
    }

    /// Integer code of the kind, for foreign callers.
    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    pub(crate) fn precondition(diagnostic: impl Into<String>) -> Self {
        Self::new(ErrorKind::Precondition, diagnostic)
    }

    /// Reports a render-thread panic. The unwind stops at the thread boundary.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_owned());
        Self::precondition(format!("render thread panicked: {message}"))
    }
}

impl From<GraphicsError> for HostError {
    fn from(err: GraphicsError) -> Self {
        Self { kind: err.kind(), diagnostic: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphics_errors_keep_their_kind() {
        let host = HostError::from(GraphicsError::StaleResource("texture 3".into()));
        assert_eq!(host.kind, ErrorKind::StaleResource);
        assert_eq!(host.code(), 4);
        assert_eq!(host.diagnostic, "stale resource: texture 3");
        assert_eq!(host.to_string(), "stale_resource: stale resource: texture 3");
    }

    #[test]
    fn panic_payloads_become_diagnostics() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let err = HostError::from_panic(payload.as_ref());
        assert_eq!(err.kind, ErrorKind::Precondition);
        assert!(err.diagnostic.ends_with("boom"));

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert!(HostError::from_panic(payload.as_ref()).diagnostic.ends_with("owned boom"));
    }
}
