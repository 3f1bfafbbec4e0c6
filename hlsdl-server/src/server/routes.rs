use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use hlsdl_engine::hls::RequestHeaders;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::warn;

use super::{AppContext, TaskRequest, pages};
use crate::task::TaskInfo;

/// Request header that stops the caller's `Referer` from being forwarded.
const IGNORE_REFERRER_HEADER: &str = "ignore_referrer";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AddQuery {
    pub url: String,
    pub filename: String,
    pub source: String,
}

/// `Referer` and `User-Agent` of the submitting request, passed on to the media server.
fn forwarded_headers(headers: &HeaderMap) -> RequestHeaders {
    let value = |name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let ignore_referrer = headers
        .get(IGNORE_REFERRER_HEADER)
        .is_some_and(|v| v.as_bytes() == b"true");
    let referer = if ignore_referrer {
        None
    } else {
        value(header::REFERER)
    };
    RequestHeaders::new(referer, value(header::USER_AGENT))
}

pub async fn add_handler(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Query(query): Query<AddQuery>,
) -> Response {
    if query.url.is_empty() {
        return (StatusCode::BAD_REQUEST, "URL is empty").into_response();
    }

    let request = TaskRequest {
        url: query.url,
        filename: query.filename,
        source: query.source,
        headers: forwarded_headers(&headers),
    };
    match ctx.start_task(request).await {
        Ok(id) => (StatusCode::FOUND, [(header::LOCATION, format!("/{id}/"))]).into_response(),
        Err(e) => {
            warn!(error = %e, "Can't start download");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub async fn index_handler(State(ctx): State<AppContext>) -> Html<String> {
    Html(pages::render_index(&ctx.tasks()))
}

fn info_event(info: TaskInfo) -> Result<Event, Infallible> {
    let data = serde_json::to_string(&info)
        .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {e}"}}"#));
    Ok(Event::default().data(data))
}

pub async fn task_handler(
    State(ctx): State<AppContext>,
    Path(task): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(task) = task.parse().ok().and_then(|id| ctx.task(id)) else {
        return (StatusCode::NOT_FOUND, format!("Task {task} not found")).into_response();
    };

    let wants_events = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"));
    if !wants_events {
        return Html(pages::render_task(&task)).into_response();
    }

    // Starts with the current state and ends when the download does
    let stream = WatchStream::new(task.subscribe()).map(info_event);
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
