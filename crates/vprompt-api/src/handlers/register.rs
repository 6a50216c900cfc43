//! Owner registration.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use vprompt_models::OwnerToken;
use vprompt_store::OwnerStore;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_TARGET_LENGTH: usize = 2048;

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Existing token to re-register; a fresh one is minted when absent
    #[serde(default)]
    pub token: Option<String>,
    /// URL (or device handle) that receives completion notices
    pub notification_target: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub token: OwnerToken,
}

/// Register a notification target. Re-registering a token updates its target.
pub async fn register_owner(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let target = request.notification_target.trim();
    if target.is_empty() {
        return Err(ApiError::bad_request("notification_target must not be empty"));
    }
    if target.len() > MAX_TARGET_LENGTH {
        return Err(ApiError::bad_request("notification_target is too long"));
    }

    let token = match request.token.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::bad_request("token must not be blank")),
        Some(t) => Some(OwnerToken::from(t)),
        None => None,
    };
    let reused = token.is_some();

    let token = state.store.register(token, target).await?;
    info!(token = ?token, reused, "Owner registered");

    Ok(Json(RegisterResponse { token }))
}
