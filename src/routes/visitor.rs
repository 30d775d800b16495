use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::{Html, Json};
use chrono::Local;
use serde::Serialize;

use crate::client_ip::extract_client_ip;
use crate::error::AppError;
use crate::geo::PlaceGeo;
use crate::journal;
use crate::visitor::{self, VisitorRecord, VisitorSubmission};
use crate::{db, AppState};

pub const SUBMIT_OK: &str = "Data logged successfully";

#[derive(Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
    pub browser_place: Option<PlaceGeo>,
}

/// Listing page: every stored visit, newest first.
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let logs = db::list_visitors(&state.db).await?;

    let mut ctx = tera::Context::new();
    ctx.insert("logs", &logs);
    let html = state.tera.render("index.html", &ctx)?;
    Ok(Html(html))
}

/// Enrich a device report and store it. Lookup and sink failures are logged,
/// the client always gets a 200.
pub async fn submit_device_info(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<SubmitResponse> {
    let ip = extract_client_ip(&headers, &remote);
    let submission = VisitorSubmission::from_body(&body);

    let record = visitor::assemble(
        &ip,
        submission,
        state.ip_geo.as_ref(),
        state.reverse_geo.as_ref(),
        Local::now(),
    )
    .await;

    persist(&state, &record).await;

    Json(SubmitResponse {
        status: SUBMIT_OK,
        browser_place: record.browser_place,
    })
}

/// Write the record to the text log and the database. Each sink fails on its own.
async fn persist(state: &AppState, record: &VisitorRecord) {
    match journal::render_entry(record) {
        Ok(entry) => tracing::info!("New visitor log:\n{entry}"),
        Err(e) => tracing::warn!("Failed to render visitor record: {e}"),
    }

    if let Err(e) = state.journal.append(record).await {
        tracing::error!("Failed to append visitor log for {}: {e}", record.ip);
    }

    match db::insert_visitor(&state.db, &record.row()).await {
        Ok(id) => tracing::debug!("Stored visitor row {id}"),
        Err(e) => tracing::error!("Failed to store visitor row for {}: {e}", record.ip),
    }
}
