use std::error::Error;
use std::fmt::Display;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::report::{is_present, BacktraceLine, Report, ServerEnvironment, UserAttributes};

pub mod memory;
pub mod postgres;

/// An application registered to report errors, identified by its API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct App {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub current_app_version: Option<String>,
}

/// A notice ready to be written, built from a report that passed the API key and
/// app version checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNotice {
    pub app_id: Uuid,
    pub error_class: Option<String>,
    pub message: String,
    pub backtrace: Vec<BacktraceLine>,
    pub request: Map<String, Value>,
    pub server_environment: ServerEnvironment,
    pub notifier: Option<Value>,
    pub user_attributes: UserAttributes,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub id: Uuid,
    #[serde(flatten)]
    pub notice: NewNotice,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InvalidNoticeReason {
    MissingNotifier,
    MissingServerEnvironment,
}

impl InvalidNoticeReason {
    pub fn reason(&self) -> &str {
        match *self {
            Self::MissingNotifier => "missing_notifier",
            Self::MissingServerEnvironment => "missing_server_environment",
        }
    }
}

impl Display for InvalidNoticeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

impl Error for InvalidNoticeReason {}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("notice is not valid: {0}")]
    InvalidNotice(#[from] InvalidNoticeReason),
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
}

impl NewNotice {
    pub fn new(report: Report, app: &App, created_at: DateTime<Utc>) -> NewNotice {
        NewNotice {
            app_id: app.id,
            error_class: report.error_class,
            message: report.message,
            backtrace: report.backtrace,
            request: report.request,
            server_environment: report.server_environment,
            notifier: report.notifier,
            user_attributes: report.user_attributes,
            created_at,
        }
    }

    /// Stores call this before writing, a rejected notice is never persisted.
    pub fn validate(&self) -> Result<(), InvalidNoticeReason> {
        if !self.notifier.as_ref().is_some_and(is_present) {
            return Err(InvalidNoticeReason::MissingNotifier);
        }

        if self.server_environment.is_empty() {
            return Err(InvalidNoticeReason::MissingServerEnvironment);
        }

        Ok(())
    }
}

#[async_trait]
pub trait AppStore {
    /// Returns None when no app owns this API key.
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<App>, StoreError>;
}

#[async_trait]
pub trait NoticeStore {
    /// Validates and writes one notice, returning it with its generated id.
    async fn create(&self, notice: NewNotice) -> Result<Notice, StoreError>;
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::{json, Map};
    use uuid::Uuid;

    use super::{App, InvalidNoticeReason, NewNotice};
    use crate::report::{Report, ServerEnvironment, UserAttributes};

    fn report() -> Report {
        Report {
            error_class: Some("TypeError".to_string()),
            message: "undefined is not a function".to_string(),
            backtrace: vec![],
            request: Map::new(),
            server_environment: ServerEnvironment {
                environment_name: Some(json!("staging")),
                ..Default::default()
            },
            api_key: Some("key".to_string()),
            notifier: Some(json!({"name": "Bugsnag JavaScript"})),
            user_attributes: UserAttributes::default(),
        }
    }

    fn app() -> App {
        App {
            id: Uuid::now_v7(),
            name: "web".to_string(),
            api_key: "key".to_string(),
            current_app_version: None,
        }
    }

    #[test]
    fn new_notice_keeps_report_fields() {
        let app = app();
        let notice = NewNotice::new(report(), &app, Utc::now());

        assert_eq!(notice.app_id, app.id);
        assert_eq!(notice.error_class.as_deref(), Some("TypeError"));
        assert_eq!(notice.message, "undefined is not a function");
        assert_eq!(notice.validate(), Ok(()));
    }

    #[test]
    fn notice_without_notifier_is_invalid() {
        let mut report = report();
        report.notifier = Some(json!({}));
        let notice = NewNotice::new(report, &app(), Utc::now());

        assert_eq!(notice.validate(), Err(InvalidNoticeReason::MissingNotifier));
    }

    #[test]
    fn notice_without_server_environment_is_invalid() {
        let mut report = report();
        report.server_environment = ServerEnvironment::default();
        let notice = NewNotice::new(report, &app(), Utc::now());

        assert_eq!(
            notice.validate(),
            Err(InvalidNoticeReason::MissingServerEnvironment)
        );
    }
}
