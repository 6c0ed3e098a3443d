use chrono::NaiveDate;
use thiserror::Error;

/// Why a pipeline stage produced no table
///
/// Every stage returns one of these instead of panicking; downstream stages
/// treat a failed upstream as "no input" and degrade to `NoData`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    /// Requested feed date lies after today
    #[error("requested date {requested} is after today ({today})")]
    InvalidDate {
        requested: NaiveDate,
        today: NaiveDate,
    },

    /// Price feed could not be downloaded
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Race-card site unreachable, or the scrape came back empty
    #[error("connection error: {0}")]
    Connection(String),

    /// Expected columns or types are missing from an input table
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// An upstream stage produced nothing
    #[error("no data: {0}")]
    NoData(String),
}

impl StageError {
    /// Human-readable notice for interactive surfaces
    pub fn notice(&self) -> String {
        match self {
            StageError::InvalidDate { .. } => {
                "The date you provided is after the current date".to_string()
            }
            StageError::Fetch { .. } => {
                "You need a connection to the internet to fetch Betfair data".to_string()
            }
            StageError::Connection(msg) | StageError::MalformedInput(msg) | StageError::NoData(msg) => {
                msg.clone()
            }
        }
    }
}

impl From<polars::prelude::PolarsError> for StageError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        StageError::MalformedInput(e.to_string())
    }
}

#[cfg(feature = "api")]
pub use api::{validate_date_param, AppError};

#[cfg(feature = "api")]
mod api {
    use actix_web::{http::StatusCode, HttpResponse, ResponseError};
    use chrono::NaiveDate;
    use std::fmt;

    use super::StageError;
    use crate::models::ErrorResponse;

    /// Application error types
    #[derive(Debug)]
    pub enum AppError {
        /// Invalid request data
        ValidationError(String),
        /// A pipeline stage yielded no table
        Stage(StageError),
        /// Internal server error
        InternalError(String),
    }

    impl fmt::Display for AppError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
                AppError::Stage(e) => write!(f, "Stage error: {}", e),
                AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            }
        }
    }

    impl std::error::Error for AppError {}

    impl From<StageError> for AppError {
        fn from(e: StageError) -> Self {
            AppError::Stage(e)
        }
    }

    impl ResponseError for AppError {
        fn status_code(&self) -> StatusCode {
            match self {
                AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
                AppError::Stage(StageError::InvalidDate { .. }) => StatusCode::BAD_REQUEST,
                AppError::Stage(StageError::MalformedInput(_)) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                AppError::Stage(StageError::NoData(_)) => StatusCode::NOT_FOUND,
                AppError::Stage(StageError::Fetch { .. })
                | AppError::Stage(StageError::Connection(_)) => StatusCode::BAD_GATEWAY,
                AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }

        fn error_response(&self) -> HttpResponse {
            let (error_code, message) = match self {
                AppError::ValidationError(msg) => ("validation_error", msg.clone()),
                AppError::Stage(e) => ("stage_error", e.notice()),
                AppError::InternalError(msg) => ("internal_error", msg.clone()),
            };

            HttpResponse::build(self.status_code()).json(ErrorResponse {
                error: error_code.to_string(),
                message,
            })
        }
    }

    /// Parse a `YYYY-MM-DD` query parameter
    pub fn validate_date_param(date: &str) -> Result<NaiveDate, AppError> {
        NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
            AppError::ValidationError(format!(
                "Date must be in YYYY-MM-DD format, got {}",
                date
            ))
        })
    }
}
