pub mod admin;
pub mod checkout;
pub mod discount;
pub mod order;

pub use admin::admin_config;
pub use checkout::checkout_config;
pub use discount::discount_config;
pub use order::order_config;

use crate::error::{AppError, AppResult};
use crate::middlewares::AuthenticatedUser;
use crate::session::Identity;
use actix_web::{HttpMessage, HttpRequest, HttpResponse};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// Header carrying the client's session key. Sent back on every checkout
/// response so a new client can keep it.
pub const SESSION_HEADER: &str = "X-Session-Id";

pub(crate) fn current_user(req: &HttpRequest) -> Option<AuthenticatedUser> {
    req.extensions().get::<AuthenticatedUser>().copied()
}

pub(crate) fn require_user(req: &HttpRequest) -> AppResult<AuthenticatedUser> {
    current_user(req).ok_or_else(|| AppError::AuthError("Missing access token".to_string()))
}

pub(crate) fn require_admin(req: &HttpRequest) -> AppResult<AuthenticatedUser> {
    let user = require_user(req)?;
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }
    Ok(user)
}

/// Session key from the header, or a fresh one for first-time clients.
pub(crate) fn identity_from_request(req: &HttpRequest) -> Identity {
    let session_key = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= 64)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    Identity::new(session_key, current_user(req).map(|u| u.id))
}

pub(crate) fn session_response<T: Serialize>(identity: &Identity, data: T) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((SESSION_HEADER, identity.session_key.clone()))
        .json(json!({
            "success": true,
            "data": data
        }))
}
