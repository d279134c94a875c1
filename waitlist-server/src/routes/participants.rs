//! Participant listing behind the secret admin path

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    extract::json::Json,
    models::participant::Participant,
    routes::fallback::notfound_404,
    setups::{ServerSetup, StoreError},
};
use axum::{
    self,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Rendering of the participant list
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListFormat {
    /// `{participants, count}` JSON object
    #[default]
    Json,
    /// CSV download
    Csv,
}

/// Paging and format of the participant list
#[derive(Deserialize, Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Index of the first participant to return
    pub offset: Option<usize>,
    /// Maximum number of participants to return, requires `offset`
    pub max: Option<usize>,
    /// `json` (default) or `csv`
    #[param(value_type = Option<String>)]
    pub mime: Option<ListFormat>,
}

/// A page of participants
#[derive(ToSchema, Debug, Deserialize, Serialize)]
pub struct ParticipantList {
    /// Participants in activation order
    pub participants: Vec<Participant>,
    /// Number of participants in this page
    pub count: usize,
}

const CSV_HEADER: &str = "address,email,uuid,timestamp,sponsor";

/// GET handler listing participants
#[utoipa::path(
    get,
    path = "/{path1}/{path2}/list",
    params(
        ("path1" = String, Path, description = "First secret segment"),
        ("path2" = String, Path, description = "Second secret segment"),
        ListQuery,
    ),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Participants", body = ParticipantList),
        (status = 200, description = "Participants as CSV", content_type = "text/csv", body = String),
        (status = 400, description = "Bad paging or format", body = ErrorResponse),
        (status = 404, description = "Unknown path", body = ErrorResponse),
    )
)]
pub async fn list<S: ServerSetup>(
    State(state): State<AppState<S>>,
    path: Result<Path<(String, String)>, PathRejection>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> AppResult<Response> {
    let Path((path1, path2)) = path?;
    let (expected1, expected2) = &*state.list_path;
    if &path1 != expected1 || &path2 != expected2 {
        return Err(notfound_404().await);
    }

    let Query(query) = query?;
    if query.max.is_some() && query.offset.is_none() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            Some("max requires offset"),
        ));
    }

    let participants = state
        .registrar
        .participants(query.offset, query.max)
        .await
        .map_err(|err| match err {
            StoreError::OutOfRange { .. } => AppError::new(StatusCode::BAD_REQUEST, Some(err)),
            err => AppError::from(anyhow::Error::from(err)),
        })?;

    tracing::debug!(count = participants.len(), format = ?query.mime, "listed participants");

    match query.mime.unwrap_or_default() {
        ListFormat::Json => Ok(Json(ParticipantList {
            count: participants.len(),
            participants,
        })
        .into_response()),
        ListFormat::Csv => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"participants.csv\"",
                ),
            ],
            to_csv(&participants),
        )
            .into_response()),
    }
}

fn to_csv(participants: &[Participant]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push_str("\r\n");

    for p in participants {
        let timestamp = p.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        let uuid = p.uuid.to_string();
        let row = [
            p.address.as_str(),
            p.email.as_str(),
            uuid.as_str(),
            timestamp.as_str(),
            p.sponsor.as_str(),
        ]
        .map(csv_field)
        .join(",");

        out.push_str(&row);
        out.push_str("\r\n");
    }

    out
}

// RFC 4180 quoting
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
