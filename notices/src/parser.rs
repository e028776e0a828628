use serde_json::{Map, Value};
use thiserror::Error;
use tracing::instrument;

use crate::payload::{Payload, RawEvent, RawException, RawFrame};
use crate::report::{
    present, value_to_string, BacktraceLine, Report, ServerEnvironment, UserAttributes,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("payload holds no events")]
    NoEvents,
    #[error("payload holds no event with exception data")]
    NoValidEvents,
    #[error("event submitted without exceptions")]
    NoException,
}

#[derive(Debug, Default)]
pub struct ParsedReports {
    pub reports: Vec<Report>,
    /// Events skipped because they carried no exception.
    pub invalid_events: usize,
}

/// Normalizes every event of a payload into a report.
///
/// Events without exception data are skipped and counted. The whole payload is rejected
/// when it has no events at all, or when every event was skipped.
#[instrument(skip_all, fields(events))]
pub fn parse(payload: &Payload) -> Result<ParsedReports, ParseError> {
    let events = payload.events();
    if events.is_empty() {
        return Err(ParseError::NoEvents);
    }
    tracing::Span::current().record("events", events.len());

    let mut parsed = ParsedReports::default();
    for event in events {
        match parse_event(payload, event) {
            Ok(report) => parsed.reports.push(report),
            Err(err) => {
                tracing::debug!("skipping event: {}", err);
                parsed.invalid_events += 1;
            }
        }
    }

    if parsed.invalid_events == events.len() {
        return Err(ParseError::NoValidEvents);
    }

    Ok(parsed)
}

fn parse_event(payload: &Payload, event: &RawEvent) -> Result<Report, ParseError> {
    let exception = primary_exception(event)?;
    let scope = EventScope::new(event);

    Ok(Report {
        error_class: present(exception.error_class.as_ref()).map(|v| value_to_string(&v)),
        message: exception
            .message
            .as_ref()
            .map(value_to_string)
            .unwrap_or_default(),
        backtrace: backtrace(exception),
        request: scope.request(),
        server_environment: scope.server_environment(),
        api_key: payload.api_key.clone(),
        notifier: payload.notifier.clone(),
        user_attributes: scope.user_attributes(),
    })
}

/// The first exception of the event is the one reported, later ones are its causes.
fn primary_exception(event: &RawEvent) -> Result<&RawException, ParseError> {
    event
        .exceptions
        .as_deref()
        .and_then(|exceptions| exceptions.first())
        .ok_or(ParseError::NoException)
}

fn backtrace(exception: &RawException) -> Vec<BacktraceLine> {
    exception
        .stacktrace
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(backtrace_line)
        .collect()
}

fn backtrace_line(frame: &RawFrame) -> BacktraceLine {
    BacktraceLine {
        method: present(frame.method.as_ref()),
        file: present(frame.file.as_ref()),
        number: present(frame.line_number.as_ref()),
        column: present(frame.column_number.as_ref()),
    }
}

/// Lookups into one event, resolved once while that event is normalized.
/// Sections that are not objects are treated as absent.
struct EventScope<'a> {
    event: &'a RawEvent,
    app: Option<&'a Map<String, Value>>,
    device: Option<&'a Map<String, Value>>,
    meta_data: Option<&'a Map<String, Value>>,
}

impl<'a> EventScope<'a> {
    fn new(event: &'a RawEvent) -> Self {
        EventScope {
            event,
            app: event.app.as_ref().and_then(Value::as_object),
            device: event.device.as_ref().and_then(Value::as_object),
            meta_data: event.meta_data.as_ref().and_then(Value::as_object),
        }
    }

    fn tab(&self, name: &str) -> Option<&'a Value> {
        self.meta_data.and_then(|m| m.get(name))
    }

    fn app_field(&self, key: &str) -> Option<Value> {
        present(self.app.and_then(|a| a.get(key)))
    }

    fn device_field(&self, key: &str) -> Option<Value> {
        present(self.device.and_then(|d| d.get(key)))
    }

    fn server_environment(&self) -> ServerEnvironment {
        ServerEnvironment {
            os_version: self.device_field("osVersion"),
            environment_name: self.app_field("releaseStage"),
            hostname: self.device_field("hostname"),
            app_version: self.app_field("version"),
        }
    }

    fn request(&self) -> Map<String, Value> {
        let request_tab = self.tab("request").and_then(Value::as_object);
        let request_field = |key: &str| request_tab.and_then(|r| r.get(key));

        let entries = [
            ("cgi-data", self.tab("environment")),
            ("session", self.tab("session")),
            ("params", request_field("params")),
            ("url", request_field("url")),
            ("component", self.event.context.as_ref()),
            ("referer", request_field("clientIp")),
            ("httpMethod", request_field("httpMethod")),
            ("headers", request_field("headers")),
            ("cookies", self.tab("cookies")),
            ("threads", self.event.threads.as_ref()),
        ];

        entries
            .into_iter()
            .filter_map(|(key, value)| present(value).map(|v| (key.to_owned(), v)))
            .collect()
    }

    fn user_attributes(&self) -> UserAttributes {
        let user = self.event.user.as_ref().and_then(Value::as_object);
        let field = |key: &str| user.and_then(|u| u.get(key)).filter(|v| !v.is_null()).cloned();

        UserAttributes {
            id: field("id"),
            name: field("name"),
            email: field("email"),
        }
    }
}
