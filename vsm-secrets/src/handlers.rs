//! HTTP handlers for the secret manager

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use vsm_core::{ApiError, ErrorCode, RequestId, REQUEST_ID_HEADER};
use zeroize::{Zeroize, Zeroizing};

use crate::error::SecretError;
use crate::manager::SecretManager;
use crate::model::SecretEntry;

/// State for secret handlers
pub struct SecretsState {
    pub manager: Arc<SecretManager>,
}

impl SecretsState {
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self { manager }
    }
}

// === Request/Response types ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSecretRequest {
    /// Base64 payload
    secret_data: String,
    owner: String,
    expiration_time: DateTime<Utc>,
}

impl Drop for CreateSecretRequest {
    fn drop(&mut self) {
        self.secret_data.zeroize();
    }
}

#[derive(Debug, Serialize)]
struct CreateSecretResponse {
    id: String,
}

/// The encoded body is handed to the transport and is not zeroed after send.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SecretEntryResponse<'a> {
    id: &'a str,
    secret_data: String,
    owner: &'a str,
    expiration_time: DateTime<Utc>,
}

// === Handlers ===

/// `POST /secrets`
pub async fn handle_create_secret(State(state): State<Arc<SecretsState>>, body: Bytes) -> Response {
    let request_id = RequestId::new();

    let req: CreateSecretRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(
                &request_id,
                ErrorCode::MalformedRequest,
                e.to_string(),
            )
        }
    };

    let secret_data = match STANDARD.decode(req.secret_data.as_bytes()) {
        Ok(bytes) => Zeroizing::new(bytes),
        Err(e) => {
            return error_response(
                &request_id,
                ErrorCode::MalformedRequest,
                format!("secretData is not valid base64: {e}"),
            )
        }
    };

    info!(request_id = %request_id, owner = %req.owner, "Create secret request");

    let entry = SecretEntry {
        id: String::new(),
        secret_data,
        owner: req.owner.clone(),
        expiration_time: req.expiration_time,
    };

    match state.manager.create_secret(&entry).await {
        Ok(id) => json_response(&request_id, StatusCode::CREATED, &CreateSecretResponse { id }),
        Err(e) => secret_error_response(&request_id, &e),
    }
}

/// `GET /secrets/:id`
pub async fn handle_get_secret(
    State(state): State<Arc<SecretsState>>,
    Path(id): Path<String>,
) -> Response {
    let request_id = RequestId::new();
    info!(request_id = %request_id, id = %id, "Get secret request");

    match state.manager.get_secret(&id).await {
        Ok(entry) => {
            let response = SecretEntryResponse {
                id: &entry.id,
                secret_data: STANDARD.encode(entry.secret_data.as_slice()),
                owner: &entry.owner,
                expiration_time: entry.expiration_time,
            };
            json_response(&request_id, StatusCode::OK, &response)
        }
        Err(e) => secret_error_response(&request_id, &e),
    }
}

/// `DELETE /secrets/:id`
pub async fn handle_delete_secret(
    State(state): State<Arc<SecretsState>>,
    Path(id): Path<String>,
) -> Response {
    let request_id = RequestId::new();
    info!(request_id = %request_id, id = %id, "Delete secret request");

    match state.manager.delete_secret(&id).await {
        Ok(()) => (
            StatusCode::NO_CONTENT,
            [(REQUEST_ID_HEADER, request_id.to_string())],
        )
            .into_response(),
        Err(e) => secret_error_response(&request_id, &e),
    }
}

// === Helpers ===

fn json_response<T: Serialize>(request_id: &RequestId, status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(body) => (
            status,
            [
                ("content-type", "application/json".to_string()),
                (REQUEST_ID_HEADER, request_id.to_string()),
            ],
            body,
        )
            .into_response(),
        Err(e) => error_response(
            request_id,
            ErrorCode::InternalError,
            format!("response encoding failed: {e}"),
        ),
    }
}

fn secret_error_response(request_id: &RequestId, err: &SecretError) -> Response {
    let code = err.code();
    if code.http_status() >= 500 {
        warn!(request_id = %request_id, error = %err, "Secret operation failed");
    }
    error_response(request_id, code, err.to_string())
}

fn error_response(request_id: &RequestId, code: ErrorCode, message: impl Into<String>) -> Response {
    let error = ApiError::new(code, message, request_id);
    let status =
        StatusCode::from_u16(error.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [
            ("content-type", "application/json".to_string()),
            (REQUEST_ID_HEADER, request_id.to_string()),
        ],
        error.to_json(),
    )
        .into_response()
}
