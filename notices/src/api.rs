use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use uuid::Uuid;

use crate::parser::ParseError;

#[derive(Error, Debug)]
pub enum NoticesError {
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("maximum payload size exceeded")]
    PayloadTooLarge,

    #[error("No events were found.")]
    NoEvents,
    #[error("No valid events were found.")]
    NoValidEvents,

    #[error("Your API key is unknown.")]
    ApiKeyUnknown,

    #[error("transient error, please retry")]
    StoreUnavailable,
}

impl From<ParseError> for NoticesError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::NoEvents => NoticesError::NoEvents,
            // NoException never leaves the parser, it is counted per event instead
            ParseError::NoValidEvents | ParseError::NoException => NoticesError::NoValidEvents,
        }
    }
}

impl IntoResponse for NoticesError {
    fn into_response(self) -> Response {
        match self {
            NoticesError::RequestDecodingError(_)
            | NoticesError::RequestParsingError(_)
            | NoticesError::NoEvents
            | NoticesError::NoValidEvents => (StatusCode::BAD_REQUEST, self.to_string()),

            NoticesError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),

            NoticesError::ApiKeyUnknown => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),

            NoticesError::StoreUnavailable => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
        }
        .into_response()
    }
}

/// Outcome of a processed request, rendered as the plain text response body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NoticesSummary {
    pub saved: Vec<Uuid>,
    pub invalid: usize,
    pub old_app: usize,
}

impl fmt::Display for NoticesSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut messages = Vec::with_capacity(3);

        if !self.saved.is_empty() {
            let ids: Vec<String> = self
                .saved
                .iter()
                .map(|id| id.simple().to_string())
                .collect();
            messages.push(format!("Notices with ids {} were saved.", ids.join(", ")));
        }
        if self.invalid != 0 {
            messages.push(format!("{} invalid events were found.", self.invalid));
        }
        if self.old_app != 0 {
            messages.push(format!("{} old app notices were found.", self.old_app));
        }

        write!(f, "{}", messages.join(" "))
    }
}
