use serde_json::{json, Value};
use sqlx::types::Decimal;
use sqlx::PgPool;

use super::{money, City, Ride, RideExtra, RideStatus, Transaction};
use crate::error::ApiError;
use crate::users::model::{serialize_user, User};

const RIDE_COLUMNS: &str = "id, pickup, destination, stop, status, city_id, driver_id, \
     customer_id, service_requested_id, created_at";

/// New rides always enter the ledger as `created`.
#[allow(clippy::too_many_arguments)]
pub async fn create_ride(
    db: &PgPool,
    customer_id: i64,
    pickup: &Value,
    destination: &Value,
    stop: Option<&Value>,
    city_id: i64,
    service_requested_id: Option<i64>,
) -> anyhow::Result<Ride> {
    let ride = sqlx::query_as::<_, Ride>(&format!(
        r#"
        INSERT INTO rides (pickup, destination, stop, status, city_id, customer_id, service_requested_id)
        VALUES ($1, $2, $3, 'created', $4, $5, $6)
        RETURNING {RIDE_COLUMNS}
        "#
    ))
    .bind(pickup)
    .bind(destination)
    .bind(stop)
    .bind(city_id)
    .bind(customer_id)
    .bind(service_requested_id)
    .fetch_one(db)
    .await?;
    Ok(ride)
}

pub async fn find_ride(db: &PgPool, id: i64) -> anyhow::Result<Option<Ride>> {
    let ride = sqlx::query_as::<_, Ride>(&format!(
        "SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(ride)
}

/// Direct status write. Deliberately permissive: any status can replace
/// any other, matching the observed lifecycle behavior (DESIGN.md).
pub async fn set_status(db: &PgPool, ride_id: i64, status: RideStatus) -> Result<(), ApiError> {
    let res = sqlx::query(r#"UPDATE rides SET status = $1 WHERE id = $2"#)
        .bind(status.as_str())
        .bind(ride_id)
        .execute(db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("Ride"));
    }
    Ok(())
}

/// Claim the ride for a driver. The guard in the UPDATE makes the claim
/// atomic: when two drivers race, only one row is written and the loser
/// gets the conflict. Re-claiming a ride you already hold is a no-op.
pub async fn set_driver(db: &PgPool, ride_id: i64, driver_id: i64) -> Result<(), ApiError> {
    let res = sqlx::query(
        r#"
        UPDATE rides
        SET driver_id = $1
        WHERE id = $2 AND (driver_id IS NULL OR driver_id = $1)
        "#,
    )
    .bind(driver_id)
    .bind(ride_id)
    .execute(db)
    .await?;
    if res.rows_affected() == 0 {
        let exists = find_ride(db, ride_id).await?.is_some();
        return Err(claim_failure(exists));
    }
    Ok(())
}

/// Zero rows from the guarded claim: the ride is either gone or already
/// held by another driver.
fn claim_failure(ride_exists: bool) -> ApiError {
    if ride_exists {
        ApiError::Conflict("Ride already has a driver".into())
    } else {
        ApiError::NotFound("Ride")
    }
}

pub struct RideFilters {
    pub city_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub driver_id: Option<i64>,
    pub status: Option<RideStatus>,
}

pub async fn list_rides(db: &PgPool, filters: &RideFilters) -> anyhow::Result<Vec<Ride>> {
    let rides = sqlx::query_as::<_, Ride>(&format!(
        r#"
        SELECT {RIDE_COLUMNS}
        FROM rides
        WHERE ($1::bigint IS NULL OR city_id = $1)
          AND ($2::bigint IS NULL OR customer_id = $2)
          AND ($3::bigint IS NULL OR driver_id = $3)
          AND ($4::text IS NULL OR status = $4)
        ORDER BY created_at DESC
        "#
    ))
    .bind(filters.city_id)
    .bind(filters.customer_id)
    .bind(filters.driver_id)
    .bind(filters.status.map(RideStatus::as_str))
    .fetch_all(db)
    .await?;
    Ok(rides)
}

pub async fn ride_extras(db: &PgPool, ride_id: i64) -> anyhow::Result<Vec<RideExtra>> {
    let extras = sqlx::query_as::<_, RideExtra>(
        r#"
        SELECT e.id, e.name, e.price
        FROM ride_extras e
        JOIN rides_ride_extras p ON p.ride_extra_id = e.id
        WHERE p.ride_id = $1
        ORDER BY e.id
        "#,
    )
    .bind(ride_id)
    .fetch_all(db)
    .await?;
    Ok(extras)
}

pub async fn find_city(db: &PgPool, id: i64) -> anyhow::Result<Option<City>> {
    let city = sqlx::query_as::<_, City>(
        r#"SELECT id, name, display_name, created_at, updated_at FROM cities WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(city)
}

/// Full ride representation: the row plus embedded city, customer, driver
/// and extras, each serialized in full.
pub async fn ride_details(db: &PgPool, ride: &Ride) -> anyhow::Result<Value> {
    let city = find_city(db, ride.city_id).await?;

    let customer = match User::find_by_id(db, ride.customer_id).await? {
        Some(user) => {
            let variant = user.load_variant(db).await?;
            serialize_user(&user, &variant)
        }
        None => Value::Null,
    };

    let driver = match ride.driver_id {
        Some(driver_id) => match User::find_by_id(db, driver_id).await? {
            Some(user) => {
                let variant = user.load_variant(db).await?;
                serialize_user(&user, &variant)
            }
            None => Value::Null,
        },
        None => Value::Null,
    };

    let service_requested = match ride.service_requested_id {
        Some(category_id) => crate::fleet::repo::find_category(db, category_id)
            .await?
            .map(|c| c.serialize())
            .unwrap_or(Value::Null),
        None => Value::Null,
    };

    let extras = ride_extras(db, ride.id).await?;

    Ok(json!({
        "id": ride.id,
        "pickup": ride.pickup,
        "destination": ride.destination,
        "stop": ride.stop,
        "status": ride.status,
        "status_translation": RideStatus::translation(&ride.status),
        "created_at": super::iso(&ride.created_at),
        "city": city.map(|c| c.serialize()).unwrap_or(Value::Null),
        "service_requested": service_requested,
        "customer": customer,
        "driver": driver,
        "extras": extras.iter().map(|e| e.serialize()).collect::<Vec<_>>(),
    }))
}

/// Append a ledger row. Amounts are quantized to two places on the way
/// in; there is no update or delete path.
pub async fn record_transaction(
    db: &PgPool,
    user_id: i64,
    ride_id: Option<i64>,
    amount: Decimal,
    kind: &str,
    currency: &str,
) -> anyhow::Result<Transaction> {
    let tx = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (user_id, ride_id, amount, type, currency)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_id, ride_id, amount, type, currency, created_at
        "#,
    )
    .bind(user_id)
    .bind(ride_id)
    .bind(money::quantize(amount))
    .bind(kind)
    .bind(currency)
    .fetch_one(db)
    .await?;
    Ok(tx)
}

pub async fn transactions_for_user(db: &PgPool, user_id: i64) -> anyhow::Result<Vec<Transaction>> {
    let rows = sqlx::query_as::<_, Transaction>(
        r#"
        SELECT id, user_id, ride_id, amount, type, currency, created_at
        FROM transactions
        WHERE user_id = $1
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn losing_driver_claim_is_a_conflict_not_a_silent_overwrite() {
        // The guarded UPDATE touches zero rows for the losing driver; that
        // outcome must surface as a conflict when the ride still exists.
        match claim_failure(true) {
            ApiError::Conflict(msg) => assert_eq!(msg, "Ride already has a driver"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(claim_failure(false), ApiError::NotFound("Ride")));
    }
}
