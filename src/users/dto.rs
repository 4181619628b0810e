use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::dto::{is_valid_email, normalize_name, validate_name, validate_password};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AccountEditRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl AccountEditRequest {
    /// Partial update: only provided fields are validated and normalized.
    pub fn validate(&mut self) -> Result<(), ApiError> {
        if self.name.is_none() && self.email.is_none() {
            return Err(ApiError::Conflict("No editable fields provided".into()));
        }
        let mut errors = Vec::new();
        if let Some(name) = &self.name {
            let name = normalize_name(name);
            validate_name(&name, &mut errors);
            self.name = Some(name);
        }
        if let Some(email) = &self.email {
            let email = email.trim().to_lowercase();
            if !is_valid_email(&email) {
                errors.push("email is not valid".into());
            }
            self.email = Some(email);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminCreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    #[serde(default)]
    pub marketing_allowed: bool,
}

impl AdminCreateUserRequest {
    pub fn validate(&mut self) -> Result<(), ApiError> {
        self.name = normalize_name(&self.name);
        self.email = self.email.trim().to_lowercase();

        let mut errors = Vec::new();
        validate_name(&self.name, &mut errors);
        if !is_valid_email(&self.email) {
            errors.push("email is not valid".into());
        }
        validate_password(&self.password, &mut errors);
        if let Some(role) = &self.role {
            if crate::users::model::UserRole::parse(role).is_none() {
                errors.push("role must be one of client, driver, admin".into());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignVehicleRequest {
    pub vehicle_id: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    pub users: Vec<Value>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_with_no_fields_is_rejected() {
        let mut req = AccountEditRequest {
            name: None,
            email: None,
        };
        assert!(matches!(req.validate(), Err(ApiError::Conflict(_))));
    }

    #[test]
    fn edit_normalizes_provided_email_only() {
        let mut req = AccountEditRequest {
            name: None,
            email: Some(" New@Mail.COM ".into()),
        };
        req.validate().expect("valid");
        assert_eq!(req.email.as_deref(), Some("new@mail.com"));
        assert!(req.name.is_none());
    }

    #[test]
    fn admin_create_rejects_unknown_role() {
        let mut req = AdminCreateUserRequest {
            name: "Ana Pérez".into(),
            email: "ana@example.com".into(),
            password: "secret1".into(),
            role: Some("superuser".into()),
            marketing_allowed: false,
        };
        assert!(matches!(req.validate(), Err(ApiError::Validation(_))));
    }
}
