//! Request extractors that answer with the API error envelope instead of
//! axum's plain-text rejections.

use std::{collections::HashMap, path::Path};

use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Multipart, Request},
    http::{HeaderMap, StatusCode, header, request::Parts},
};
use serde::de::DeserializeOwned;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{models::UserProfile, store::users};

use super::{ApiError, ApiResult, AppState};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// The caller, resolved from the `accessToken` cookie or a bearer header.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserProfile);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let token = access_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;
        let claims = state.sessions.verify_access(&token).map_err(|err| {
            debug!("rejecting access token: {err:#}");
            ApiError::unauthorized("Invalid access token")
        })?;

        let id = claims.id;
        let profile = state
            .db(move |conn| Ok(users::find_profile(conn, &id)?))
            .await?;
        profile
            .map(AuthUser)
            .ok_or_else(|| ApiError::unauthorized("Invalid access token"))
    }
}

fn access_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = cookie_value(headers, ACCESS_COOKIE) {
        return Some(token);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Looks `name` up across every `Cookie` header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// JSON body whose rejections become 400s in the envelope, or 413 past the
/// body limit.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> ApiResult<Self> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(ApiError::new(rejection.status(), rejection.body_text()))
            }
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

/// Raw request body, for routes where an empty body means something.
pub struct BodyBytes(pub Bytes);

impl<S> FromRequest<S> for BodyBytes
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> ApiResult<Self> {
        Bytes::from_request(req, state)
            .await
            .map(Self)
            .map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))
    }
}

/// Parses a body that may legitimately be empty.
pub fn optional_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<Option<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|err| ApiError::bad_request(format!("Invalid JSON body: {err}")))
}

/// A file part, buffered to a temp file that is removed when dropped.
#[derive(Debug)]
pub struct UploadedFile {
    pub path: TempPath,
    pub file_name: String,
}

/// A multipart form with its text fields in memory and its files on disk
/// under `DATA_ROOT/tmp`.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl UploadForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    async fn collect(mut multipart: Multipart, temp_dir: &Path) -> ApiResult<Self> {
        let mut form = Self::default();
        while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            let Some(file_name) = field.file_name().map(str::to_string) else {
                let text = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, text);
                continue;
            };

            let (file, path) = tempfile::Builder::new()
                .prefix("upload-")
                .tempfile_in(temp_dir)
                .map_err(|err| ApiError::internal(format!("creating upload temp file: {err}")))?
                .into_parts();
            let mut file = tokio::fs::File::from_std(file);
            let mut written = 0usize;
            while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                written += chunk.len();
                file.write_all(&chunk)
                    .await
                    .map_err(|err| ApiError::internal(format!("buffering upload: {err}")))?;
            }
            file.flush()
                .await
                .map_err(|err| ApiError::internal(format!("buffering upload: {err}")))?;

            // Browsers send an empty part for an untouched file input.
            if written == 0 && file_name.is_empty() {
                continue;
            }
            form.files.insert(name, UploadedFile { path, file_name });
        }
        Ok(form)
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}

impl FromRequest<AppState> for UploadForm {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> ApiResult<Self> {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))?;
        Self::collect(multipart, &state.config.temp_dir()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_lookup_scans_all_pairs() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; accessToken=abc"));
        headers.append(header::COOKIE, HeaderValue::from_static("refreshToken=xyz"));
        assert_eq!(cookie_value(&headers, ACCESS_COOKIE).as_deref(), Some("abc"));
        assert_eq!(cookie_value(&headers, REFRESH_COOKIE).as_deref(), Some("xyz"));
        assert!(cookie_value(&headers, "missing").is_none());
    }

    #[test]
    fn bearer_header_is_a_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(access_token(&headers).as_deref(), Some("tok"));

        headers.insert(header::COOKIE, HeaderValue::from_static("accessToken=cookie"));
        assert_eq!(access_token(&headers).as_deref(), Some("cookie"));

        let mut empty = HeaderMap::new();
        empty.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(access_token(&empty).is_none());
    }

    #[test]
    fn optional_json_accepts_empty_bodies() {
        let parsed: Option<serde_json::Value> = optional_json(&Bytes::from_static(b" \n")).unwrap();
        assert!(parsed.is_none());
        let parsed: Option<serde_json::Value> =
            optional_json(&Bytes::from_static(br#"{"a":1}"#)).unwrap();
        assert_eq!(parsed.unwrap()["a"], 1);
        assert!(optional_json::<serde_json::Value>(&Bytes::from_static(b"{")).is_err());
    }
}
