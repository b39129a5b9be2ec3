use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

/// Boxed error returned by user supplied callbacks.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Error related to invalid configuration or arguments
    Validation,
    /// Error related to WebSocket connections
    WebSocket,
    /// A connect or heartbeat deadline elapsed
    Timeout,
    /// Outbound payload could not be serialized
    Serialization,
    /// An interceptor callback failed or panicked
    Interceptor,
    /// Internal error from dependencies or the runtime
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<BoxError>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    /// Wrap an already boxed source, e.g. one returned from an interceptor.
    #[must_use]
    pub fn with_boxed_source(kind: Kind, source: BoxError) -> Self {
        Self {
            kind,
            source: Some(source),
            backtrace: Backtrace::capture(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }

    pub fn interceptor<S: Into<String>>(message: S) -> Self {
        Interceptor {
            reason: message.into(),
        }
        .into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

/// An interceptor panicked or otherwise failed without a typed error.
#[non_exhaustive]
#[derive(Debug)]
pub struct Interceptor {
    pub reason: String,
}

impl fmt::Display for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interceptor failed: {}", self.reason)
    }
}

impl StdError for Interceptor {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Serialization, e)
    }
}

#[cfg(feature = "ws")]
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}

impl From<tokio::runtime::TryCurrentError> for Error {
    fn from(e: tokio::runtime::TryCurrentError) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<Interceptor> for Error {
    fn from(err: Interceptor) -> Self {
        Error::with_source(Kind::Interceptor, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_should_succeed() {
        let error = Error::validation("reconnect decay must be >= 1");

        assert_eq!(error.kind(), Kind::Validation);
        assert_eq!(
            error.to_string(),
            "Validation: invalid: reconnect decay must be >= 1"
        );
    }

    #[test]
    fn boxed_source_should_be_downcastable() {
        let source: BoxError = Box::new(Interceptor {
            reason: "boom".to_owned(),
        });
        let error = Error::with_boxed_source(Kind::Interceptor, source);

        assert_eq!(error.kind(), Kind::Interceptor);
        let inner = error.downcast_ref::<Interceptor>().unwrap();
        assert_eq!(inner.reason, "boom");
    }

    #[test]
    fn serde_json_error_maps_to_serialization() {
        let e = serde_json::from_str::<u8>("nope").unwrap_err();
        let error: Error = e.into();

        assert_eq!(error.kind(), Kind::Serialization);
    }
}
