use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::types::Decimal;
use sqlx::FromRow;

pub mod repo;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vehicle {
    pub id: i64,
    pub name: String,
    pub license_plate: String,
    pub model_id: i64,
    pub color_id: i64,
    pub category_id: i64,
}

/// Vehicle joined with the names of its model, color and category, the
/// shape embedded into driver profiles.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VehicleDetails {
    pub id: i64,
    pub name: String,
    pub license_plate: String,
    pub model: Option<String>,
    pub color: Option<String>,
    pub category: Option<String>,
}

impl VehicleDetails {
    pub fn serialize(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "license_plate": self.license_plate,
            "model": self.model,
            "color": self.color,
            "category": self.category,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VehicleCategory {
    pub id: i64,
    pub img: Option<String>,
    pub name: String,
    pub rate: Decimal,
    pub min_rate: Option<Decimal>,
    pub airport_min_rate: Option<Decimal>,
}

impl VehicleCategory {
    pub fn serialize(&self) -> Value {
        json!({
            "id": self.id,
            "img": self.img,
            "name": self.name,
            "rate": crate::rides::money::to_fixed_string(self.rate),
            "min_rate": self.min_rate.map(crate::rides::money::to_fixed_string),
            "airport_min_rate": self.airport_min_rate.map(crate::rides::money::to_fixed_string),
        })
    }
}
