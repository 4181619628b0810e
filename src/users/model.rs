use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::fleet::VehicleDetails;

/// Role discriminator stored on the user row. Free text in the store;
/// this enum covers the three values the application writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Client,
    Driver,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Client => "client",
            UserRole::Driver => "driver",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "client" => Some(UserRole::Client),
            "driver" => Some(UserRole::Driver),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// Base user record shared by every variant.
///
/// `role` and `variant` are persisted independently: changing the role
/// string does not migrate the variant, so the two can drift (see
/// DESIGN.md). The variant is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub variant: String,
    pub is_active: bool,
    pub email_verified: bool,
    pub marketing_allowed: bool,
    pub profile_photo_path: Option<String>,
    pub vehicle_id: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_driver(&self) -> bool {
        self.role == "driver"
    }

    pub fn is_client(&self) -> bool {
        self.role == "client"
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DriverDocument {
    pub id: i64,
    pub user_id: i64,
    pub document_type: String,
    pub file_path: String,
    pub uploaded_at: OffsetDateTime,
}

impl DriverDocument {
    pub fn serialize(&self) -> Value {
        json!({
            "id": self.id,
            "user_id": self.user_id,
            "document_type": self.document_type,
            "file_path": self.file_path,
            "uploaded_at": iso(&self.uploaded_at),
        })
    }
}

/// Variant-specific payload. Selected permanently at creation by the
/// `variant` tag on the row; capability checks dispatch on this enum.
#[derive(Debug, Clone)]
pub enum UserVariant {
    Customer,
    Driver {
        vehicle: Option<VehicleDetails>,
        documents: Vec<DriverDocument>,
    },
    Admin,
}

impl UserVariant {
    pub fn tag(&self) -> &'static str {
        match self {
            UserVariant::Customer => "customer",
            UserVariant::Driver { .. } => "driver",
            UserVariant::Admin => "admin",
        }
    }

    pub fn can_make_reservations(&self) -> bool {
        matches!(self, UserVariant::Customer)
    }

    pub fn can_view_assigned_trips(&self) -> bool {
        matches!(self, UserVariant::Driver { .. })
    }

    pub fn can_edit_content(&self) -> bool {
        matches!(self, UserVariant::Admin)
    }

    pub fn can_manage_reservations(&self) -> bool {
        matches!(self, UserVariant::Admin)
    }

    pub fn assigned_vehicle(&self) -> Option<&VehicleDetails> {
        match self {
            UserVariant::Driver { vehicle, .. } => vehicle.as_ref(),
            _ => None,
        }
    }
}

/// Structured profile output. Base fields for every variant; Driver embeds
/// its documents and vehicle in full, Customer surfaces marketing consent
/// explicitly. The password hash is never included.
pub fn serialize_user(user: &User, variant: &UserVariant) -> Value {
    let mut base = json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "role": user.role,
        "is_active": user.is_active,
        "email_verified": user.email_verified,
        "marketing_allowed": user.marketing_allowed,
        "profile_photo_path": user.profile_photo_path,
        "type": variant.tag(),
        "created_at": iso(&user.created_at),
        "updated_at": iso(&user.updated_at),
    });
    if let Some(map) = base.as_object_mut() {
        match variant {
            UserVariant::Driver { vehicle, documents } => {
                map.insert(
                    "documents".into(),
                    Value::Array(documents.iter().map(|d| d.serialize()).collect()),
                );
                map.insert(
                    "vehicle".into(),
                    vehicle.as_ref().map(|v| v.serialize()).unwrap_or(Value::Null),
                );
            }
            UserVariant::Customer => {
                map.insert("marketing_allowed".into(), json!(user.marketing_allowed));
            }
            UserVariant::Admin => {}
        }
    }
    base
}

fn iso(t: &OffsetDateTime) -> Value {
    t.format(&Rfc3339).map(Value::String).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn base_user(role: &str, variant: &str) -> User {
        User {
            id: 1,
            name: "Ana Pérez".into(),
            email: "ana@example.com".into(),
            password_hash: "hash".into(),
            role: role.into(),
            variant: variant.into(),
            is_active: true,
            email_verified: false,
            marketing_allowed: true,
            profile_photo_path: None,
            vehicle_id: None,
            created_at: datetime!(2024-03-01 10:00 UTC),
            updated_at: datetime!(2024-03-02 11:30 UTC),
        }
    }

    #[test]
    fn capabilities_dispatch_on_variant() {
        let customer = UserVariant::Customer;
        assert!(customer.can_make_reservations());
        assert!(!customer.can_edit_content());

        let driver = UserVariant::Driver {
            vehicle: None,
            documents: vec![],
        };
        assert!(driver.can_view_assigned_trips());
        assert!(!driver.can_make_reservations());

        let admin = UserVariant::Admin;
        assert!(admin.can_edit_content());
        assert!(admin.can_manage_reservations());
    }

    #[test]
    fn serialize_never_exposes_password() {
        let user = base_user("client", "customer");
        let value = serialize_user(&user, &UserVariant::Customer);
        let text = value.to_string();
        assert!(!text.contains("hash"));
        assert!(!text.contains("password"));
    }

    #[test]
    fn driver_profile_embeds_documents_and_vehicle() {
        let user = base_user("driver", "driver");
        let doc = DriverDocument {
            id: 5,
            user_id: 1,
            document_type: "license".into(),
            file_path: "/docs/license.pdf".into(),
            uploaded_at: datetime!(2024-03-01 10:00 UTC),
        };
        let variant = UserVariant::Driver {
            vehicle: None,
            documents: vec![doc],
        };
        let value = serialize_user(&user, &variant);
        assert_eq!(value["vehicle"], Value::Null);
        assert_eq!(value["documents"][0]["document_type"], "license");
        assert_eq!(value["type"], "driver");
    }

    #[test]
    fn customer_profile_surfaces_marketing_consent() {
        let user = base_user("client", "customer");
        let value = serialize_user(&user, &UserVariant::Customer);
        assert_eq!(value["marketing_allowed"], json!(true));
    }

    #[test]
    fn serialize_is_idempotent() {
        let user = base_user("admin", "admin");
        let a = serialize_user(&user, &UserVariant::Admin).to_string();
        let b = serialize_user(&user, &UserVariant::Admin).to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn role_string_and_variant_can_drift() {
        // Role reassignment mutates only the flat string; the stored
        // variant stays what it was at creation.
        let mut user = base_user("client", "customer");
        user.role = "admin".into();
        assert!(user.is_admin());
        let value = serialize_user(&user, &UserVariant::Customer);
        assert_eq!(value["role"], "admin");
        assert_eq!(value["type"], "customer");
    }

    #[test]
    fn timestamps_render_as_rfc3339() {
        let user = base_user("client", "customer");
        let value = serialize_user(&user, &UserVariant::Customer);
        assert_eq!(value["created_at"], "2024-03-01T10:00:00Z");
    }
}
