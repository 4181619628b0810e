use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::{
    auth::jwt::AuthUser,
    error::ApiError,
    mailing::sync_best_effort,
    roles,
    state::AppState,
    users::{
        dto::{
            AccountEditRequest, AdminCreateUserRequest, AssignVehicleRequest, ChangeRoleRequest,
            ListUsersQuery, ListUsersResponse,
        },
        model::{serialize_user, User, UserRole},
    },
};

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/account/edit",
            put(edit_account).patch(edit_account),
        )
        .route("/api/account/me", get(me))
        .route("/api/account/:id", get(show_user))
        .route("/api/account/:id/permissions", get(list_permissions))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/user/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/user/:id/role", put(change_role))
        .route("/api/user/:id/vehicle", put(assign_vehicle))
}

/// Privileged operations gate on the role graph and fail closed.
async fn require_admin(state: &AppState, user_id: i64) -> Result<(), ApiError> {
    if roles::has_any_role(&state.db, user_id, &["admin"]).await? {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

async fn profile_of(state: &AppState, user: &User) -> Result<Value, ApiError> {
    let variant = user.load_variant(&state.db).await?;
    Ok(serialize_user(user, &variant))
}

#[instrument(skip(state, payload))]
pub async fn edit_account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(mut payload): Json<AccountEditRequest>,
) -> Result<Json<Value>, ApiError> {
    payload.validate()?;

    let current = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    // Advisory duplicate check; the unique constraint stays authoritative.
    if let Some(email) = payload.email.as_deref() {
        if email != current.email {
            if let Some(other) = User::find_by_email(&state.db, email).await? {
                if other.id != user_id {
                    return Err(ApiError::EmailTaken);
                }
            }
        }
    }

    let user = User::update_profile(
        &state.db,
        user_id,
        payload.name.as_deref(),
        payload.email.as_deref(),
    )
    .await?;

    sync_best_effort(
        state.mailing.clone(),
        user.email.clone(),
        user.name.clone(),
        user.marketing_allowed,
    );

    info!(user_id, "account updated");
    Ok(Json(json!({
        "user": profile_of(&state, &user).await?,
        "message": "Success",
    })))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(profile_of(&state, &user).await?))
}

/// Self or admin only; everyone else gets 403.
#[instrument(skip(state))]
pub async fn show_user(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if requester_id != user_id {
        require_admin(&state, requester_id).await?;
    }
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(profile_of(&state, &user).await?))
}

/// Effective permission set: the deduplicated union across every role of
/// the user. Self or admin only.
#[instrument(skip(state))]
pub async fn list_permissions(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<roles::Permission>>, ApiError> {
    if requester_id != user_id {
        require_admin(&state, requester_id).await?;
    }
    if User::find_by_id(&state.db, user_id).await?.is_none() {
        return Err(ApiError::NotFound("User"));
    }
    Ok(Json(roles::effective_permissions(&state.db, user_id).await?))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<ListUsersResponse>, ApiError> {
    require_admin(&state, requester_id).await?;

    let per_page = query.per_page.clamp(1, 100);
    let page = query.page.max(1);
    let (users, total) = User::list(&state.db, query.role.as_deref(), page, per_page).await?;

    let mut serialized = Vec::with_capacity(users.len());
    for user in &users {
        serialized.push(profile_of(&state, user).await?);
    }

    Ok(Json(ListUsersResponse {
        users: serialized,
        total,
        page,
        pages: (total + per_page - 1) / per_page,
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    Json(mut payload): Json<AdminCreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_admin(&state, requester_id).await?;
    payload.validate()?;

    let role = payload
        .role
        .as_deref()
        .and_then(UserRole::parse)
        .unwrap_or(UserRole::Client);

    let user = User::create(
        &state.db,
        &payload.name,
        &payload.email,
        &payload.password,
        role,
        payload.marketing_allowed,
    )
    .await?;

    sync_best_effort(
        state.mailing.clone(),
        user.email.clone(),
        user.name.clone(),
        user.marketing_allowed,
    );

    info!(user_id = user.id, role = role.as_str(), "user created by admin");
    Ok((StatusCode::CREATED, Json(profile_of(&state, &user).await?)))
}

/// Admin view: the profile plus the user's graph roles.
#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, requester_id).await?;
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let mut profile = profile_of(&state, &user).await?;
    let assigned = roles::roles_of(&state.db, user_id).await?;
    if let Some(map) = profile.as_object_mut() {
        map.insert(
            "roles".into(),
            serde_json::to_value(&assigned).map_err(anyhow::Error::from)?,
        );
    }
    Ok(Json(profile))
}

/// Admin edit of another user's name/email, same partial semantics as the
/// self-service edit.
#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    Path(user_id): Path<i64>,
    Json(mut payload): Json<AccountEditRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, requester_id).await?;
    payload.validate()?;

    if User::find_by_id(&state.db, user_id).await?.is_none() {
        return Err(ApiError::NotFound("User"));
    }

    let user = User::update_profile(
        &state.db,
        user_id,
        payload.name.as_deref(),
        payload.email.as_deref(),
    )
    .await?;

    sync_best_effort(
        state.mailing.clone(),
        user.email.clone(),
        user.name.clone(),
        user.marketing_allowed,
    );

    info!(user_id, "user updated by admin");
    Ok(Json(profile_of(&state, &user).await?))
}

/// Mutates only the flat role string; the stored variant keeps the shape
/// chosen at creation.
#[instrument(skip(state, payload))]
pub async fn change_role(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    Path(user_id): Path<i64>,
    Json(payload): Json<ChangeRoleRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, requester_id).await?;
    if UserRole::parse(&payload.role).is_none() {
        return Err(ApiError::validation(
            "role must be one of client, driver, admin",
        ));
    }

    User::set_role(&state.db, user_id, &payload.role).await?;

    if let Some(user) = User::find_by_id(&state.db, user_id).await? {
        sync_best_effort(
            state.mailing.clone(),
            user.email.clone(),
            user.name.clone(),
            user.marketing_allowed,
        );
    }

    info!(user_id, role = %payload.role, "role changed");
    Ok(Json(json!({
        "message": format!("Role updated to {}", payload.role)
    })))
}

/// Hand a catalog vehicle to a driver. A vehicle held by another driver
/// is a conflict; the current pairing stays untouched.
#[instrument(skip(state, payload))]
pub async fn assign_vehicle(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    Path(user_id): Path<i64>,
    Json(payload): Json<AssignVehicleRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, requester_id).await?;

    if crate::fleet::repo::find_vehicle(&state.db, payload.vehicle_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("Vehicle"));
    }
    crate::fleet::repo::assign_to_driver(&state.db, payload.vehicle_id, user_id).await?;

    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    info!(user_id, vehicle_id = payload.vehicle_id, "vehicle assigned");
    Ok(Json(profile_of(&state, &user).await?))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, requester_id).await?;
    User::delete(&state.db, user_id).await?;
    info!(user_id, "user deleted");
    Ok(Json(json!({
        "message": format!("User {user_id} deleted")
    })))
}
