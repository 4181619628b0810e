use sqlx::PgPool;

use super::{Vehicle, VehicleCategory, VehicleDetails};
use crate::error::{conflict_on_unique, ApiError};

pub async fn find_vehicle(db: &PgPool, id: i64) -> anyhow::Result<Option<Vehicle>> {
    let row = sqlx::query_as::<_, Vehicle>(
        r#"
        SELECT id, name, license_plate, model_id, color_id, category_id
        FROM vehicles
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Vehicle with model/color/category names resolved, as embedded in
/// driver profiles.
pub async fn vehicle_details(db: &PgPool, id: i64) -> anyhow::Result<Option<VehicleDetails>> {
    let row = sqlx::query_as::<_, VehicleDetails>(
        r#"
        SELECT v.id, v.name, v.license_plate,
               m.name AS model, c.name AS color, k.name AS category
        FROM vehicles v
        LEFT JOIN vehicle_models m ON m.id = v.model_id
        LEFT JOIN vehicle_colors c ON c.id = v.color_id
        LEFT JOIN vehicle_categories k ON k.id = v.category_id
        WHERE v.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn find_category(db: &PgPool, id: i64) -> anyhow::Result<Option<VehicleCategory>> {
    let row = sqlx::query_as::<_, VehicleCategory>(
        r#"
        SELECT id, img, name, rate, min_rate, airport_min_rate
        FROM vehicle_categories
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Hand the vehicle to a driver, enforcing the mirrored 1:1: a vehicle
/// already held by another driver is a conflict, never a silent
/// reassignment. The advisory check catches the common case; the unique
/// constraint on users.vehicle_id is authoritative under races.
pub async fn assign_to_driver(db: &PgPool, vehicle_id: i64, driver_id: i64) -> Result<(), ApiError> {
    let holder = sqlx::query_scalar::<_, i64>(
        r#"SELECT id FROM users WHERE vehicle_id = $1 AND id <> $2"#,
    )
    .bind(vehicle_id)
    .bind(driver_id)
    .fetch_optional(db)
    .await?;
    if holder.is_some() {
        return Err(ApiError::VehicleAlreadyAssigned);
    }

    let updated = sqlx::query(
        r#"
        UPDATE users
        SET vehicle_id = $1, updated_at = now()
        WHERE id = $2 AND role = 'driver'
        "#,
    )
    .bind(vehicle_id)
    .bind(driver_id)
    .execute(db)
    .await
    .map_err(|e| conflict_on_unique(e, ApiError::VehicleAlreadyAssigned))?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("Driver"));
    }
    Ok(())
}
