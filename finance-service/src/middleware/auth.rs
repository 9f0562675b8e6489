use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::IntoResponse,
};
use service_core::error::AppError;

use crate::{services::identity::IdentityClaims, AppState};

/// Middleware requiring a verified bearer identity token.
///
/// On the first successful verification for an unknown subject a user row
/// is created from the token claims; on every later one the email and name
/// are refreshed unconditionally.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Missing or invalid Authorization header"
        )));
    };

    let claims = state.verifier.verify(token.trim()).await.map_err(|e| {
        tracing::warn!(error = %e, "Identity token verification failed");
        AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
    })?;

    state
        .db
        .upsert_user_identity(
            &claims.sub,
            claims.email.as_deref().unwrap_or(""),
            claims.name.as_deref().unwrap_or(""),
        )
        .await?;

    // Store claims in request extensions so handlers can access them
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extractor to easily get claims in handlers
pub struct AuthUser(pub IdentityClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<IdentityClaims>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth claims missing from request extensions"
            ))
        })?;

        Ok(AuthUser(claims.clone()))
    }
}
