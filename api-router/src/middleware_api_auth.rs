use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::ApiError;

/// Identity of the caller, as asserted by the identity provider in front of
/// this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

pub async fn require_owner(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let owner = extract_owner(&request)
        .ok_or_else(|| ApiError::Unauthorized("You have to be authenticated".to_string()))?;

    request.extensions_mut().insert(Owner(owner));

    Ok(next.run(request).await)
}

fn extract_owner(request: &Request) -> Option<String> {
    request
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|auth| auth.strip_prefix("Bearer "))
        })
        .map(str::trim)
        .filter(|owner| !owner.is_empty())
        .map(String::from)
}
