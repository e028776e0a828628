use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::stores::App;
use crate::version::AppVersion;

/// Normalized form of one notifier event, before it is turned into a notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub error_class: Option<String>,
    pub message: String,
    pub backtrace: Vec<BacktraceLine>,
    pub request: Map<String, Value>,
    pub server_environment: ServerEnvironment,
    pub api_key: Option<String>,
    pub notifier: Option<Value>,
    pub user_attributes: UserAttributes,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktraceLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<Value>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEnvironment {
    #[serde(rename = "os-version", skip_serializing_if = "Option::is_none")]
    pub os_version: Option<Value>,
    #[serde(rename = "environment-name", skip_serializing_if = "Option::is_none")]
    pub environment_name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<Value>,
    #[serde(rename = "app-version", skip_serializing_if = "Option::is_none")]
    pub app_version: Option<Value>,
}

impl ServerEnvironment {
    pub fn is_empty(&self) -> bool {
        self.os_version.is_none()
            && self.environment_name.is_none()
            && self.hostname.is_none()
            && self.app_version.is_none()
    }

    pub fn app_version(&self) -> Option<AppVersion> {
        self.app_version
            .as_ref()
            .and_then(|v| AppVersion::parse(&value_to_string(v)))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Value>,
}

impl Report {
    /// Whether the report was captured by a version of the app that is still supported.
    ///
    /// Apps without a current version accept everything. Once an app has one, reports
    /// that do not carry a version, or carry an older one, are stale.
    pub fn should_keep(&self, app: &App) -> bool {
        let Some(current) = app.current_app_version.as_deref().and_then(AppVersion::parse) else {
            return true;
        };

        match self.server_environment.app_version() {
            Some(reported) => reported >= current,
            None => false,
        }
    }
}

/// Client values are blank when null, false, whitespace-only strings or empty containers.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub fn present(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| is_present(v)).cloned()
}

/// Renders a client value as text: strings as-is, null as empty, anything else as JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
