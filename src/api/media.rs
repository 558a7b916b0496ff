//! `/media/{kind}/{file}`: streams assets kept by the local media host.

use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{Path as AxumPath, State},
    http::header,
    response::{IntoResponse, Response},
};
use mime_guess::MimeGuess;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::media::MediaKind;

use super::{ApiError, ApiResult, AppState};

pub async fn serve(
    State(state): State<AppState>,
    AxumPath((kind, file)): AxumPath<(String, String)>,
) -> ApiResult<Response> {
    let kind = MediaKind::from_dir_name(&kind)
        .ok_or_else(|| ApiError::not_found("Media not found"))?;
    let path = state
        .media
        .local_path(kind, &file)
        .ok_or_else(|| ApiError::not_found("Media not found"))?;
    stream_file(path).await
}

async fn stream_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("Media not found"))?;

    let stream = ReaderStream::new(file);
    let mut response = Body::from_stream(stream).into_response();
    if let Some(mime) = MimeGuess::from_path(&path).first() {
        if let Ok(value) = mime.to_string().parse() {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
    }
    Ok(response)
}
