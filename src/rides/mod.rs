use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::types::Decimal;
use sqlx::FromRow;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod money;
pub mod repo;

pub fn router() -> Router<AppState> {
    handlers::ride_routes()
}

/// Ride lifecycle status. Stored as text; transitions are caller-driven
/// direct writes, any status is settable from any other (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Created,
    Active,
    Done,
    Canceled,
}

impl RideStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RideStatus::Created => "created",
            RideStatus::Active => "active",
            RideStatus::Done => "done",
            RideStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(RideStatus::Created),
            "active" => Some(RideStatus::Active),
            "done" => Some(RideStatus::Done),
            "canceled" => Some(RideStatus::Canceled),
            _ => None,
        }
    }

    /// Human display mapping carried over from the product copy.
    pub fn translation(s: &str) -> &str {
        match s {
            "created" => "creado",
            "active" => "activo",
            "done" => "completado",
            "canceled" => "cancelado",
            other => other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ride {
    pub id: i64,
    pub pickup: Option<Value>,
    pub destination: Option<Value>,
    pub stop: Option<Value>,
    pub status: String,
    pub city_id: i64,
    pub driver_id: Option<i64>,
    pub customer_id: i64,
    pub service_requested_id: Option<i64>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub display_name: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl City {
    pub fn serialize(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "display_name": self.display_name,
            "created_at": iso(&self.created_at),
            "updated_at": iso(&self.updated_at),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RideExtra {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
}

impl RideExtra {
    pub fn serialize(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "price": money::to_fixed_string(self.price),
        })
    }
}

/// Append-only ledger row; no update or delete exists for it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub ride_id: Option<i64>,
    #[serde(serialize_with = "money::serialize_amount")]
    pub amount: Decimal,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub currency: String,
    pub created_at: OffsetDateTime,
}

pub(crate) fn iso(t: &OffsetDateTime) -> Value {
    t.format(&Rfc3339).map(Value::String).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use time::macros::datetime;

    #[test]
    fn status_roundtrips_through_text() {
        for status in [
            RideStatus::Created,
            RideStatus::Active,
            RideStatus::Done,
            RideStatus::Canceled,
        ] {
            assert_eq!(RideStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RideStatus::parse("pending"), None);
    }

    #[test]
    fn translation_maps_known_statuses() {
        assert_eq!(RideStatus::translation("created"), "creado");
        assert_eq!(RideStatus::translation("done"), "completado");
        // Unknown stored values pass through untouched.
        assert_eq!(RideStatus::translation("weird"), "weird");
    }

    #[test]
    fn transaction_amount_serializes_as_fixed_string() {
        let tx = Transaction {
            id: 1,
            user_id: 2,
            ride_id: None,
            amount: Decimal::from_str("19.999").unwrap(),
            kind: "ride_fare".into(),
            currency: "EUR".into(),
            created_at: datetime!(2024-03-01 10:00 UTC),
        };
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["amount"], "20.00");
        assert_eq!(value["type"], "ride_fare");
    }
}
