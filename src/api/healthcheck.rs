//! `GET /api/v1/healthcheck`.

use serde_json::{Value, json};

use super::ApiResponse;

pub async fn healthcheck() -> ApiResponse<Value> {
    ApiResponse::ok(json!({ "status": "OK" }), "Health check passed")
}
