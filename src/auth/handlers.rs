use axum::{
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, GoogleLoginRequest, LoginRequest, PasswordForgotRequest,
            PasswordResetRequest, RegisterRequest,
        },
        jwt::{AuthUser, JwtKeys},
        password::random_password,
        tokens::{PurposeTokens, TokenPurpose},
    },
    error::ApiError,
    mailing::sync_best_effort,
    state::AppState,
    users::model::{User, UserRole},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/login_google", post(login_google))
        .route("/auth/profile", get(profile))
        .route("/auth/check_token", get(check_token))
        .route("/auth/password/request", post(request_password_reset))
        .route("/auth/password/reset/:token", get(show_reset_form))
        .route("/auth/password/reset", post(reset_password))
        .route("/auth/verify", get(verify_email))
}

fn purpose_tokens(state: &AppState) -> PurposeTokens {
    PurposeTokens::new(&state.config.jwt.secret)
}

/// Issue the verification link and hand it to the mailer, best-effort.
fn send_verification(state: &AppState, user: &User) {
    let tokens = purpose_tokens(state);
    let Ok(token) = tokens.issue(TokenPurpose::EmailVerify, user.id) else {
        warn!(user_id = user.id, "could not issue verification token");
        return;
    };
    let url = format!("{}/auth/verify?token={}", state.config.base_url, token);
    let mailer = state.mailer.clone();
    let (email, name) = (user.email.clone(), user.name.clone());
    tokio::spawn(async move {
        if let Err(e) = mailer.send_verification(&email, &name, &url).await {
            warn!(error = %e, email = %email, "verification email failed");
        }
    });
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;

    let user = User::create(
        &state.db,
        &payload.name,
        &payload.email,
        &payload.password,
        UserRole::Client,
        payload.marketing_allowed,
    )
    .await?;

    sync_best_effort(
        state.mailing.clone(),
        user.email.clone(),
        user.name.clone(),
        user.marketing_allowed,
    );
    send_verification(&state, &user);

    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    let variant = user.load_variant(&state.db).await?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: crate::users::model::serialize_user(&user, &variant),
            message: "User registered successfully".into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = User::authenticate(&state.db, &payload.email, &payload.password).await?;

    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    let variant = user.load_variant(&state.db).await?;

    info!(user_id = user.id, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: crate::users::model::serialize_user(&user, &variant),
        message: "Login successful".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login_google(
    State(state): State<AppState>,
    Json(payload): Json<GoogleLoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Some(client_id) = state.config.google_client_id.clone() else {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "GOOGLE_CLIENT_ID missing"
        )));
    };

    let identity = state
        .google
        .verify(&payload.credential, &client_id)
        .await?
        .ok_or_else(|| ApiError::Auth("Invalid token".into()))?;

    let user = match User::find_by_email(&state.db, &identity.email).await? {
        Some(user) => user,
        None => {
            // First Google login: provision a customer with a throwaway
            // password; the reset flow can set a real one later.
            let user = User::create(
                &state.db,
                &identity.name,
                &identity.email,
                &random_password(),
                UserRole::Client,
                payload.marketing_allowed,
            )
            .await?;
            sync_best_effort(
                state.mailing.clone(),
                user.email.clone(),
                user.name.clone(),
                user.marketing_allowed,
            );
            user
        }
    };

    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    let variant = user.load_variant(&state.db).await?;

    info!(user_id = user.id, "google login");
    Ok(Json(AuthResponse {
        token,
        user: crate::users::model::serialize_user(&user, &variant),
        message: "Success".into(),
    }))
}

#[instrument(skip(state))]
pub async fn profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    let variant = user.load_variant(&state.db).await?;
    Ok(Json(crate::users::model::serialize_user(&user, &variant)))
}

#[instrument(skip(state))]
pub async fn check_token(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(json!({
        "message": "Token válido",
        "user": { "id": user.id, "role": user.role },
        "status": "ok",
    })))
}

/// Always answers 200 with the same body so callers cannot probe which
/// emails have accounts.
#[instrument(skip(state, payload))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordForgotRequest>,
) -> Json<serde_json::Value> {
    let generic = Json(json!({
        "message": "Si el email existe, enviaremos instrucciones para restablecer la contraseña."
    }));

    let email = payload.email.trim().to_lowercase();
    if email.is_empty() {
        return generic;
    }

    let user = match User::find_by_email(&state.db, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => return generic,
        Err(e) => {
            warn!(error = %e, "reset lookup failed");
            return generic;
        }
    };

    let tokens = purpose_tokens(&state);
    let Ok(token) = tokens.issue(TokenPurpose::PasswordReset, user.id) else {
        warn!(user_id = user.id, "could not issue reset token");
        return generic;
    };
    let url = format!(
        "{}/auth/password/reset/{}",
        state.config.base_url, token
    );
    let mailer = state.mailer.clone();
    let (email, name) = (user.email.clone(), user.name.clone());
    tokio::spawn(async move {
        if let Err(e) = mailer.send_password_reset(&email, &name, &url).await {
            warn!(error = %e, email = %email, "reset email failed");
        }
    });

    generic
}

#[instrument(skip(state))]
pub async fn show_reset_form(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<axum::response::Response, ApiError> {
    let tokens = purpose_tokens(&state);
    let Ok(user_id) = tokens.verify(TokenPurpose::PasswordReset, &token) else {
        return Ok(reset_form_response(&token, None));
    };
    let user = User::find_by_id(&state.db, user_id).await?;
    Ok(reset_form_response(&token, user.as_ref()))
}

/// Every failure mode of the reset form shares one shape: a redirect back
/// to the request form with an error flag. A valid token whose account
/// has since been deleted counts as a failure too.
fn reset_form_response(token: &str, user: Option<&User>) -> axum::response::Response {
    match user {
        Some(user) => Json(json!({ "token": token, "email": user.email })).into_response(),
        None => Redirect::to("/password/forgot?error=invalid_token").into_response(),
    }
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<axum::response::Response, ApiError> {
    payload.validate()?;

    let tokens = purpose_tokens(&state);
    let user_id = tokens
        .verify(TokenPurpose::PasswordReset, &payload.token)
        .map_err(|_| ApiError::Conflict("Invalid or expired token".into()))?;

    User::change_password(&state.db, user_id, &payload.password).await?;
    info!(user_id, "password reset applied");

    // Privileged users land on the dashboard; everyone else on the public
    // completion page. Missing roles fall through to the public page.
    let privileged = crate::roles::has_any_role(&state.db, user_id, &["editor", "admin"])
        .await
        .unwrap_or(false);
    let target = if privileged {
        "/admin/dashboard"
    } else {
        "/password/reset/complete"
    };
    Ok(Redirect::to(target).into_response())
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(default)]
    pub token: String,
}

#[instrument(skip(state, params))]
pub async fn verify_email(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<axum::response::Response, ApiError> {
    let tokens = purpose_tokens(&state);
    let Ok(user_id) = tokens.verify(TokenPurpose::EmailVerify, &params.token) else {
        return Ok(Redirect::to("/?flash=verify_invalid").into_response());
    };

    let Some(user) = User::find_by_id(&state.db, user_id).await? else {
        return Ok(Redirect::to("/?flash=verify_invalid").into_response());
    };

    User::set_email_verified(&state.db, user.id).await?;
    sync_best_effort(
        state.mailing.clone(),
        user.email.clone(),
        user.name.clone(),
        user.marketing_allowed,
    );
    info!(user_id = user.id, "email verified");
    Ok(Redirect::to("/?flash=verify_ok").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;
    use time::macros::datetime;

    fn user() -> User {
        User {
            id: 1,
            name: "Ana Pérez".into(),
            email: "ana@example.com".into(),
            password_hash: "hash".into(),
            role: "client".into(),
            variant: "customer".into(),
            is_active: true,
            email_verified: false,
            marketing_allowed: false,
            profile_photo_path: None,
            vehicle_id: None,
            created_at: datetime!(2024-03-01 10:00 UTC),
            updated_at: datetime!(2024-03-01 10:00 UTC),
        }
    }

    #[test]
    fn reset_form_returns_token_and_email_for_live_account() {
        let res = reset_form_response("tok123", Some(&user()));
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn reset_form_redirects_when_account_is_gone() {
        // A valid token for a deleted user takes the same failure shape as
        // an invalid token.
        let res = reset_form_response("tok123", None);
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            res.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
            Some("/password/forgot?error=invalid_token")
        );
    }
}
