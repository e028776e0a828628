use std::future::ready;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN};
use axum::http::HeaderValue;
use axum::{
    routing::{get, post, MethodRouter},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::prometheus::track_metrics;
use crate::{endpoint, stores, time::TimeSource};

#[derive(Clone)]
pub struct State {
    pub apps: Arc<dyn stores::AppStore + Send + Sync>,
    pub notices: Arc<dyn stores::NoticeStore + Send + Sync>,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
    pub max_body_size: usize,
}

async fn index() -> &'static str {
    "notices"
}

fn notice_route(max_body_size: usize) -> MethodRouter<State> {
    post(endpoint::notice)
        .options(endpoint::options)
        .layer(DefaultBodyLimit::max(max_body_size))
}

pub fn router<
    TZ: TimeSource + Send + Sync + 'static,
    A: stores::AppStore + Send + Sync + 'static,
    N: stores::NoticeStore + Send + Sync + 'static,
>(
    timesource: TZ,
    apps: A,
    notices: N,
    max_body_size: usize,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let state = State {
        apps: Arc::new(apps),
        notices: Arc::new(notices),
        timesource: Arc::new(timesource),
        max_body_size,
    };

    let router = Router::new()
        .route("/", get(index).merge(notice_route(max_body_size)))
        .route("/_readiness", get(index))
        .route("/_liveness", get(index))
        .route("/notify", notice_route(max_body_size))
        .route("/notify/", notice_route(max_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // The global recorder is only installed by the server, tests route without one.
    let router = match metrics {
        Some(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        None => router,
    };

    // Notifiers post from browsers too, every response allows any origin.
    router
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("origin, content-type, accept"),
        ))
}
