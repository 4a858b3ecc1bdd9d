//! Error types and result definitions for extraction runs.
//!
//! [`EtlError`] carries a classification ([`ErrorKind`]), a static description, optional dynamic
//! detail and source error, plus the call-site location and backtrace where it was created.
//! Several errors can be aggregated into one, which is used when many parents of a run fail.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for extraction operations using [`EtlError`] as the error type.
pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for extraction operations.
#[derive(Debug, Clone)]
pub struct EtlError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Multiple aggregated errors, e.g. one per failed parent id.
    Many {
        errors: Vec<EtlError>,
        location: &'static Location<'static>,
    },
}

/// Categories of errors that can occur while extracting and loading endpoints.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Upstream API errors
    SourceConnectionFailed,
    SourceTimeout,
    SourceRateLimited,
    SourceServerError,
    SourceClientError,
    SourceRequestFailed,

    // Payload errors
    MalformedPayload,

    // Destination errors
    DestinationConnectionFailed,
    DestinationQueryFailed,
    DestinationSchemaMismatch,

    // Data & conversion errors
    ConversionError,
    InvalidData,

    // Configuration errors
    ConfigError,
    EndpointNotFound,

    // IO & serialization errors
    IoError,
    SerializationError,
    DeserializationError,

    // Workflow errors
    InvalidState,

    Unknown,
}

impl ErrorKind {
    /// Returns `true` for failures that are worth retrying with the same request.
    ///
    /// Timeouts, connection problems, throttling and server side errors are transient. Client
    /// errors and malformed payloads are not, repeating the request yields the same answer.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::SourceConnectionFailed
                | ErrorKind::SourceTimeout
                | ErrorKind::SourceRateLimited
                | ErrorKind::SourceServerError
                | ErrorKind::SourceRequestFailed
        )
    }
}

impl EtlError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the dynamic detail, for aggregates the first one available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn from_source<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail", detail)?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented(f, "Backtrace", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, label: &str, text: &str) -> fmt::Result {
    if text.trim().is_empty() {
        return write!(f, "\n  {label}: <empty>");
    }

    write!(f, "\n  {label}:")?;
    for line in text.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates an [`EtlError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`EtlError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for EtlError
where
    E: Into<EtlError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> EtlError {
        let location = Location::caller();
        let mut errors: Vec<EtlError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        EtlError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        EtlError::from_source(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => {
                (ErrorKind::DeserializationError, "JSON deserialization failed")
            }
        };

        EtlError::from_source(kind, description, err)
    }
}

impl From<std::str::Utf8Error> for EtlError {
    #[track_caller]
    fn from(err: std::str::Utf8Error) -> EtlError {
        EtlError::from_source(ErrorKind::MalformedPayload, "UTF-8 conversion failed", err)
    }
}

impl From<std::num::ParseIntError> for EtlError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> EtlError {
        EtlError::from_source(ErrorKind::ConversionError, "Integer parsing failed", err)
    }
}

impl From<std::num::ParseFloatError> for EtlError {
    #[track_caller]
    fn from(err: std::num::ParseFloatError) -> EtlError {
        EtlError::from_source(ErrorKind::ConversionError, "Float parsing failed", err)
    }
}

impl From<chrono::ParseError> for EtlError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> EtlError {
        EtlError::from_source(ErrorKind::ConversionError, "Timestamp parsing failed", err)
    }
}

impl From<quick_xml::Error> for EtlError {
    #[track_caller]
    fn from(err: quick_xml::Error) -> EtlError {
        EtlError::from_source(ErrorKind::MalformedPayload, "XML parsing failed", err)
    }
}

/// Converts [`reqwest::Error`] to [`EtlError`], classifying it for the retry loops.
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let (kind, description) = if err.is_timeout() {
            (ErrorKind::SourceTimeout, "API request timed out")
        } else if err.is_connect() {
            (ErrorKind::SourceConnectionFailed, "API connection failed")
        } else if let Some(status) = err.status() {
            (classify_status(status.as_u16()), "API request failed")
        } else if err.is_builder() {
            (ErrorKind::ConfigError, "API request could not be built")
        } else {
            (ErrorKind::SourceRequestFailed, "API request failed")
        };

        EtlError::from_source(kind, description, err)
    }
}

/// Maps a non-success HTTP status code to an [`ErrorKind`].
pub(crate) fn classify_status(status: u16) -> ErrorKind {
    match status {
        429 => ErrorKind::SourceRateLimited,
        408 => ErrorKind::SourceTimeout,
        500..=599 => ErrorKind::SourceServerError,
        _ => ErrorKind::SourceClientError,
    }
}

/// Converts [`sqlx::Error`] to [`EtlError`] with the appropriate destination error kind.
impl From<sqlx::Error> for EtlError {
    #[track_caller]
    fn from(err: sqlx::Error) -> EtlError {
        let kind = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut => ErrorKind::DestinationConnectionFailed,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                ErrorKind::ConversionError
            }
            _ => ErrorKind::DestinationQueryFailed,
        };

        EtlError::from_source(kind, "Database operation failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl_error;

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(ErrorKind::SourceTimeout.is_transient());
        assert!(ErrorKind::SourceRateLimited.is_transient());
        assert!(ErrorKind::SourceServerError.is_transient());
        assert!(!ErrorKind::SourceClientError.is_transient());
        assert!(!ErrorKind::MalformedPayload.is_transient());
        assert!(!ErrorKind::DestinationQueryFailed.is_transient());
    }

    #[test]
    fn status_codes_are_classified() {
        assert_eq!(classify_status(429), ErrorKind::SourceRateLimited);
        assert_eq!(classify_status(503), ErrorKind::SourceServerError);
        assert_eq!(classify_status(404), ErrorKind::SourceClientError);
        assert_eq!(classify_status(401), ErrorKind::SourceClientError);
    }

    #[test]
    fn single_error_vector_is_not_wrapped() {
        let err = EtlError::from(vec![etl_error!(ErrorKind::InvalidData, "bad row")]);

        assert_eq!(err.kinds(), vec![ErrorKind::InvalidData]);
        assert!(!err.to_string().starts_with("[Many]"));
    }

    #[test]
    fn aggregated_errors_report_every_kind() {
        let err = EtlError::from(vec![
            etl_error!(ErrorKind::SourceTimeout, "probe timed out", "campaign 1"),
            etl_error!(ErrorKind::SourceClientError, "probe rejected", "campaign 2"),
        ]);

        assert_eq!(err.kind(), ErrorKind::SourceTimeout);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::SourceTimeout, ErrorKind::SourceClientError]
        );
        assert_eq!(err.detail(), Some("campaign 1"));
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
    }

    #[test]
    fn detail_is_rendered() {
        let err = etl_error!(ErrorKind::ConversionError, "Invalid cell", "column `id`");

        assert!(err.to_string().contains("Detail:\n    column `id`"));
    }
}
