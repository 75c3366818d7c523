//! # Tag Catalog Handler
//!
//! `GET /tags` streams the tool's whole tag catalog as
//! `{"tags":[ ... ]}`, one record per tag, flushed as tables are decoded.

use super::{AppError, AppState};
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use tagstream::CancellationToken;
use tracing::info;

/// The handler for the `/tags` endpoint.
///
/// The tool is started before the response head is produced, so a startup
/// failure still turns into a plain-text 500. After that the status is 200
/// and later failures only truncate the body.
///
/// The request token is tied to the body: when the client goes away, hyper
/// drops the body, the token is cancelled and the tool is killed.
pub async fn tags_handler(State(app_state): State<AppState>) -> Result<Response, AppError> {
    info!("Received tag catalog request");

    let stream = app_state
        .transcoder
        .stream(CancellationToken::new())
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(stream),
    )
        .into_response())
}
