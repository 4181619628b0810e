use serde::Deserialize;
use serde_json::Value;
use sqlx::types::Decimal;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateRideRequest {
    pub pickup: Value,
    pub destination: Value,
    pub stop: Option<Value>,
    pub city_id: i64,
    pub service_requested_id: Option<i64>,
}

impl CreateRideRequest {
    /// Pickup and destination are opaque structured payloads, but they
    /// must at least be present and object-shaped.
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        if !self.pickup.is_object() {
            errors.push("pickup must be an object".into());
        }
        if !self.destination.is_object() {
            errors.push("destination must be an object".into());
        }
        if let Some(stop) = &self.stop {
            if !stop.is_object() {
                errors.push("stop must be an object".into());
            }
        }
        if self.city_id < 1 {
            errors.push("city_id must be a positive integer".into());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordTransactionRequest {
    pub user_id: i64,
    pub ride_id: Option<i64>,
    /// Accepted as a decimal string ("19.99") to keep amounts exact.
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: String,
    pub currency: Option<String>,
}

impl RecordTransactionRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.kind.trim().is_empty() {
            return Err(ApiError::validation("type is required"));
        }
        if let Some(currency) = &self.currency {
            if currency.len() > 10 || currency.is_empty() {
                return Err(ApiError::validation("currency must be 1-10 characters"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRidesQuery {
    pub city_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub driver_id: Option<i64>,
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ride_request_requires_object_payloads() {
        let req = CreateRideRequest {
            pickup: json!("Calle Mayor 1"),
            destination: json!({ "lat": 40.4, "lng": -3.7 }),
            stop: None,
            city_id: 1,
            service_requested_id: None,
        };
        assert!(matches!(req.validate(), Err(ApiError::Validation(_))));

        let req = CreateRideRequest {
            pickup: json!({ "lat": 40.4, "lng": -3.7 }),
            destination: json!({ "lat": 40.5, "lng": -3.6 }),
            stop: None,
            city_id: 1,
            service_requested_id: None,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn transaction_amount_parses_from_string() {
        let req: RecordTransactionRequest = serde_json::from_value(json!({
            "user_id": 1,
            "amount": "19.999",
            "type": "ride_fare",
        }))
        .expect("deserializes");
        assert_eq!(req.amount.to_string(), "19.999");
        assert!(req.validate().is_ok());
    }
}
