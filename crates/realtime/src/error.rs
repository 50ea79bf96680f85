//! Tracking service errors

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = anyhow::Result<T, Error>;

/// Result type returned by HTTP handlers.
pub type HttpResult<T> = anyhow::Result<T, HttpError>;

/// Domain level error type returned by the tracking core.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Error {
    /// The request payload is invalid or missing required fields.
    #[error("code: 400, description: {0}")]
    BadRequest(String),

    /// A lifecycle mutation referenced a record that was never created.
    #[error("code: 404, description: {0}")]
    NotFound(String),

    /// The backing store rejected or failed a read or write.
    #[error("code: 502, description: storage_error {0}")]
    Storage(String),

    /// A non recoverable internal error occurred.
    #[error("code: 500, description: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the stable error code associated with the variant.
    #[must_use]
    pub const fn code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// True when the error is a [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        let chain = err.chain().map(ToString::to_string).collect::<Vec<_>>().join(" -> ");

        // if type is Error, return it with the newly added context
        if let Some(inner) = err.downcast_ref::<Self>() {
            tracing::debug!("Error: {err}, caused by: {inner}");

            return match inner {
                Self::BadRequest(_) => Self::BadRequest(chain),
                Self::NotFound(_) => Self::NotFound(chain),
                Self::Storage(e) => Self::Storage(format!("{err}: {e}")),
                Self::Internal(_) => Self::Internal(chain),
            };
        }

        // anything else escaping a provider is a store failure
        Self::Storage(chain)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("invalid document: {err}"))
    }
}

pub struct HttpError {
    status: StatusCode,
    error: String,
}

impl From<Error> for HttpError {
    fn from(e: Error) -> Self {
        Self { status: e.code(), error: e.to_string() }
    }
}

impl From<anyhow::Error> for HttpError {
    fn from(e: anyhow::Error) -> Self {
        let error = format!("{e}, caused by: {}", e.root_cause());
        let status = e.downcast_ref().map_or(StatusCode::INTERNAL_SERVER_ERROR, Error::code);
        Self { status, error }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, self.error).into_response()
    }
}

#[macro_export]
macro_rules! bad_request {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::BadRequest(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::BadRequest(format!($err))
    };
}

#[macro_export]
macro_rules! not_found {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::NotFound(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::NotFound(format!($err))
    };
}

#[macro_export]
macro_rules! storage {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Storage(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::Storage(format!($err))
    };
}

#[cfg(test)]
mod tests {
    use anyhow::{Context, Result, anyhow};
    use http::StatusCode;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Registry, fmt};

    use super::Error;

    #[test]
    fn error_display() {
        let err = Error::BadRequest("invalid input".to_string());
        assert_eq!(format!("{err}",), "code: 400, description: invalid input");
    }

    #[test]
    fn with_context() {
        let _ = Registry::default().with(EnvFilter::new("debug")).with(fmt::layer()).try_init();

        let context_error = || -> Result<(), Error> {
            Err::<(), Error>(Error::NotFound("session S1".to_string()))
                .context("marking seen")
                .context("more context")?;
            Ok(())
        };

        let result = context_error();
        assert_eq!(
            result.unwrap_err(),
            Error::NotFound(
                "more context -> marking seen -> code: 404, description: session S1".to_string()
            )
        );
    }

    #[test]
    fn storage_context() {
        let result =
            Err::<(), Error>(Error::Storage("write refused".to_string())).context("merging record");
        let err: Error = result.unwrap_err().into();

        assert_eq!(
            err.to_string(),
            "code: 502, description: storage_error merging record: write refused"
        );
        assert_eq!(err.code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn anyhow_context() {
        let result = Err::<(), anyhow::Error>(anyhow!("connection reset")).context("error context");
        let err: Error = result.unwrap_err().into();

        assert_eq!(
            err.to_string(),
            "code: 502, description: storage_error error context -> connection reset"
        );
    }

    #[test]
    fn macros() {
        let err = bad_request!("missing {}", "BUS-01");
        assert_eq!(err, Error::BadRequest("missing BUS-01".into()));
        assert!(not_found!("session {}", "S1").is_not_found());
        assert_eq!(storage!("offline").code(), StatusCode::BAD_GATEWAY);
    }
}
