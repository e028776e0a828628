use axum::extract::State;
use axum::http::header::{CONTENT_ENCODING, USER_AGENT};
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::instrument;

use crate::api::{NoticesError, NoticesSummary};
use crate::api_key::validate_api_key;
use crate::parser::{self, ParseError, ParsedReports};
use crate::payload::{Compression, Payload};
use crate::prometheus::{
    report_dropped_events, NOTICES_BATCH_SIZE, NOTICES_EVENTS_RECEIVED_TOTAL, NOTICES_SAVED_TOTAL,
};
use crate::router;
use crate::stores::{App, AppStore, NewNotice, StoreError};

#[instrument(
    skip_all,
    fields(api_key, batch_size, user_agent, content_encoding)
)]
pub async fn notice(
    state: State<router::State>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<String, NoticesError> {
    let user_agent = headers
        .get(USER_AGENT)
        .map_or("unknown", |v| v.to_str().unwrap_or("unknown"));
    let content_encoding = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok());

    tracing::Span::current().record("user_agent", user_agent);
    tracing::Span::current().record("content_encoding", content_encoding.unwrap_or("none"));

    let payload = Payload::from_bytes(
        Compression::from_header(content_encoding),
        body,
        state.max_body_size,
    )
    .map_err(|err| {
        tracing::warn!("rejected undecodable payload: {}", err);
        err
    })?;

    let batch_size = payload.events().len();
    tracing::Span::current().record("batch_size", batch_size);
    if let Some(api_key) = &payload.api_key {
        tracing::Span::current().record("api_key", api_key.as_str());
    }
    counter!(NOTICES_EVENTS_RECEIVED_TOTAL).increment(batch_size as u64);
    histogram!(NOTICES_BATCH_SIZE).record(batch_size as f64);

    tracing::debug!(payload=?payload, "decoded request");

    let parsed = parser::parse(&payload).map_err(|err| {
        if err == ParseError::NoValidEvents {
            report_dropped_events("no_exception", batch_size as u64);
        }
        tracing::warn!("rejected payload: {}", err);
        NoticesError::from(err)
    })?;
    if parsed.invalid_events != 0 {
        report_dropped_events("no_exception", parsed.invalid_events as u64);
    }

    let summary = process_reports(&state, parsed).await?;

    Ok(summary.to_string())
}

pub async fn options() -> StatusCode {
    StatusCode::OK
}

/// Classifies and persists reports in order.
///
/// The first report whose API key does not resolve aborts the request: reports after it
/// are never looked at, while notices saved before it are kept.
#[instrument(skip_all, fields(reports = parsed.reports.len()))]
pub async fn process_reports(
    state: &router::State,
    parsed: ParsedReports,
) -> Result<NoticesSummary, NoticesError> {
    let total = parsed.reports.len();
    let mut summary = NoticesSummary::default();
    let mut invalid_notices = 0;

    for (index, report) in parsed.reports.into_iter().enumerate() {
        let app = resolve_app(state.apps.as_ref(), report.api_key.as_deref())
            .await
            .map_err(|err| {
                if matches!(err, NoticesError::ApiKeyUnknown) {
                    report_dropped_events("unknown_api_key", (total - index) as u64);
                }
                err
            })?;

        if !report.should_keep(&app) {
            tracing::debug!(app = %app.id, "ignoring notice for an old app version");
            report_dropped_events("old_app_version", 1);
            summary.old_app += 1;
            continue;
        }

        let notice = NewNotice::new(report, &app, state.timesource.current_time());
        match state.notices.create(notice).await {
            Ok(notice) => {
                counter!(NOTICES_SAVED_TOTAL).increment(1);
                summary.saved.push(notice.id);
            }
            Err(StoreError::InvalidNotice(reason)) => {
                tracing::info!(app = %app.id, "notice rejected: {}", reason);
                report_dropped_events("invalid_notice", 1);
                invalid_notices += 1;
            }
            Err(err) => {
                tracing::error!("failed to save notice: {}", err);
                return Err(NoticesError::StoreUnavailable);
            }
        }
    }

    if invalid_notices == total {
        return Err(NoticesError::NoValidEvents);
    }

    summary.invalid = parsed.invalid_events + invalid_notices;
    Ok(summary)
}

async fn resolve_app(
    apps: &(dyn AppStore + Send + Sync),
    api_key: Option<&str>,
) -> Result<App, NoticesError> {
    let api_key = validate_api_key(api_key).map_err(|reason| {
        tracing::warn!("rejected malformed api key: {}", reason);
        NoticesError::ApiKeyUnknown
    })?;

    match apps.find_by_api_key(api_key).await {
        Ok(Some(app)) => Ok(app),
        Ok(None) => {
            tracing::warn!("rejected unknown api key");
            Err(NoticesError::ApiKeyUnknown)
        }
        Err(err) => {
            tracing::error!("failed to look up app: {}", err);
            Err(NoticesError::StoreUnavailable)
        }
    }
}
