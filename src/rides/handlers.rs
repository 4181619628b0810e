use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::Value;
use tracing::{info, instrument};

use crate::{
    auth::jwt::AuthUser,
    error::ApiError,
    roles,
    state::AppState,
    users::model::User,
};

use super::dto::{CreateRideRequest, ListRidesQuery, RecordTransactionRequest, UpdateStatusRequest};
use super::repo::{self, RideFilters};
use super::{RideStatus, Transaction};

pub fn ride_routes() -> Router<AppState> {
    Router::new()
        .route("/api/rides", get(list_rides).post(create_ride))
        .route("/api/ride/:id", get(get_ride))
        .route("/api/ride/:id/status", put(update_status))
        .route("/api/ride/:id/accept", put(accept_ride))
        .route("/api/transactions", post(record_transaction))
        .route("/api/users/:id/transactions", get(list_transactions))
}

async fn load_caller(state: &AppState, user_id: i64) -> Result<User, ApiError> {
    User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::Unauthorized)
}

async fn is_admin(state: &AppState, user_id: i64) -> Result<bool, ApiError> {
    Ok(roles::has_any_role(&state.db, user_id, &["admin"]).await?)
}

/// Customer booking. The ride enters the ledger in `created` with no
/// driver attached.
#[instrument(skip(state, payload))]
pub async fn create_ride(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateRideRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    payload.validate()?;

    let caller = load_caller(&state, user_id).await?;
    let variant = caller.load_variant(&state.db).await?;
    if !variant.can_make_reservations() && !variant.can_manage_reservations() {
        return Err(ApiError::Forbidden);
    }

    if repo::find_city(&state.db, payload.city_id).await?.is_none() {
        return Err(ApiError::NotFound("City"));
    }
    if let Some(category_id) = payload.service_requested_id {
        if crate::fleet::repo::find_category(&state.db, category_id)
            .await?
            .is_none()
        {
            return Err(ApiError::NotFound("Vehicle category"));
        }
    }

    let ride = repo::create_ride(
        &state.db,
        caller.id,
        &payload.pickup,
        &payload.destination,
        payload.stop.as_ref(),
        payload.city_id,
        payload.service_requested_id,
    )
    .await?;

    info!(ride_id = ride.id, customer_id = caller.id, "ride created");
    Ok((
        StatusCode::CREATED,
        Json(repo::ride_details(&state.db, &ride).await?),
    ))
}

/// Admins see everything; drivers and customers see their own rides.
#[instrument(skip(state))]
pub async fn list_rides(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListRidesQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let caller = load_caller(&state, user_id).await?;
    let status = match query.status.as_deref() {
        Some(s) => Some(
            RideStatus::parse(s)
                .ok_or_else(|| ApiError::validation("status must be one of created, active, done, canceled"))?,
        ),
        None => None,
    };

    let mut filters = RideFilters {
        city_id: query.city_id,
        customer_id: query.customer_id,
        driver_id: query.driver_id,
        status,
    };
    if !is_admin(&state, user_id).await? {
        if caller.is_driver() {
            filters.driver_id = Some(caller.id);
        } else {
            filters.customer_id = Some(caller.id);
        }
    }

    let rides = repo::list_rides(&state.db, &filters).await?;
    let mut out = Vec::with_capacity(rides.len());
    for ride in &rides {
        out.push(repo::ride_details(&state.db, ride).await?);
    }
    Ok(Json(out))
}

#[instrument(skip(state))]
pub async fn get_ride(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(ride_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let ride = repo::find_ride(&state.db, ride_id)
        .await?
        .ok_or(ApiError::NotFound("Ride"))?;

    let involved = ride.customer_id == user_id || ride.driver_id == Some(user_id);
    if !involved && !is_admin(&state, user_id).await? {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(repo::ride_details(&state.db, &ride).await?))
}

/// Direct status write by an admin or the ride's driver; no transition
/// rules are enforced here.
#[instrument(skip(state, payload))]
pub async fn update_status(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(ride_id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, ApiError> {
    let status = RideStatus::parse(&payload.status)
        .ok_or_else(|| ApiError::validation("status must be one of created, active, done, canceled"))?;

    let ride = repo::find_ride(&state.db, ride_id)
        .await?
        .ok_or(ApiError::NotFound("Ride"))?;
    if ride.driver_id != Some(user_id) && !is_admin(&state, user_id).await? {
        return Err(ApiError::Forbidden);
    }

    repo::set_status(&state.db, ride_id, status).await?;
    info!(ride_id, status = status.as_str(), "ride status updated");

    let ride = repo::find_ride(&state.db, ride_id)
        .await?
        .ok_or(ApiError::NotFound("Ride"))?;
    Ok(Json(repo::ride_details(&state.db, &ride).await?))
}

/// A driver takes an unassigned ride.
#[instrument(skip(state))]
pub async fn accept_ride(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(ride_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let caller = load_caller(&state, user_id).await?;
    let variant = caller.load_variant(&state.db).await?;
    if !variant.can_view_assigned_trips() {
        return Err(ApiError::Forbidden);
    }

    let ride = repo::find_ride(&state.db, ride_id)
        .await?
        .ok_or(ApiError::NotFound("Ride"))?;
    // Advisory check; the guarded claim in the repo is authoritative
    // under races.
    if let Some(existing) = ride.driver_id {
        if existing != caller.id {
            return Err(ApiError::Conflict("Ride already has a driver".into()));
        }
    }

    repo::set_driver(&state.db, ride_id, caller.id).await?;
    info!(ride_id, driver_id = caller.id, "ride accepted");

    let ride = repo::find_ride(&state.db, ride_id)
        .await?
        .ok_or(ApiError::NotFound("Ride"))?;
    Ok(Json(repo::ride_details(&state.db, &ride).await?))
}

#[instrument(skip(state, payload))]
pub async fn record_transaction(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    Json(payload): Json<RecordTransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    if !is_admin(&state, requester_id).await? {
        return Err(ApiError::Forbidden);
    }
    payload.validate()?;

    if User::find_by_id(&state.db, payload.user_id).await?.is_none() {
        return Err(ApiError::NotFound("User"));
    }
    if let Some(ride_id) = payload.ride_id {
        if repo::find_ride(&state.db, ride_id).await?.is_none() {
            return Err(ApiError::NotFound("Ride"));
        }
    }

    let tx = repo::record_transaction(
        &state.db,
        payload.user_id,
        payload.ride_id,
        payload.amount,
        &payload.kind,
        payload.currency.as_deref().unwrap_or("USD"),
    )
    .await?;

    info!(transaction_id = tx.id, user_id = tx.user_id, "transaction recorded");
    Ok((StatusCode::CREATED, Json(tx)))
}

#[instrument(skip(state))]
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    if requester_id != user_id && !is_admin(&state, requester_id).await? {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(repo::transactions_for_user(&state.db, user_id).await?))
}
