use sqlx::PgPool;
use tracing::debug;

use super::model::{DriverDocument, User, UserRole, UserVariant};
use crate::auth::password::{hash_password, verify_password};
use crate::error::{conflict_on_unique, ApiError};
use crate::{fleet, roles};

/// Canonical form used for every lookup and uniqueness check.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Variant tag fixed at creation from the role discriminator.
fn variant_for_role(role: UserRole) -> &'static str {
    match role {
        UserRole::Client => "customer",
        UserRole::Driver => "driver",
        UserRole::Admin => "admin",
    }
}

/// Name of the graph role assigned alongside the discriminator.
fn default_role_name(role: UserRole) -> &'static str {
    match role {
        UserRole::Client => "cliente",
        UserRole::Driver => "driver",
        UserRole::Admin => "admin",
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, variant, is_active, \
     email_verified, marketing_allowed, profile_photo_path, vehicle_id, created_at, updated_at";

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Insert the user and its default graph role as one atomic unit.
    /// The unique constraint on email is authoritative: a lost race with a
    /// concurrent insert still comes back as `EmailTaken`.
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        raw_password: &str,
        role: UserRole,
        marketing_allowed: bool,
    ) -> Result<User, ApiError> {
        let email = normalize_email(email);
        let password_hash = hash_password(raw_password)?;

        let mut tx = db.begin().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, role, variant, marketing_allowed)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(&email)
        .bind(&password_hash)
        .bind(role.as_str())
        .bind(variant_for_role(role))
        .bind(marketing_allowed)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, ApiError::EmailTaken))?;

        roles::assign(&mut tx, user.id, default_role_name(role)).await?;
        tx.commit().await?;

        debug!(user_id = user.id, email = %user.email, "user created");
        Ok(user)
    }

    /// Fails closed with one indistinct `Unauthorized` for unknown email,
    /// wrong password and deactivated accounts alike.
    pub async fn authenticate(db: &PgPool, email: &str, raw_password: &str) -> Result<User, ApiError> {
        let Some(user) = User::find_by_email(db, email).await? else {
            return Err(ApiError::Unauthorized);
        };
        if !user.is_active || !verify_password(raw_password, &user.password_hash)? {
            return Err(ApiError::Unauthorized);
        }
        Ok(user)
    }

    pub async fn change_password(db: &PgPool, user_id: i64, raw_password: &str) -> Result<(), ApiError> {
        let password_hash = hash_password(raw_password)?;
        let res = sqlx::query(
            r#"UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2"#,
        )
        .bind(&password_hash)
        .bind(user_id)
        .execute(db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::NotFound("User"));
        }
        Ok(())
    }

    /// Partial self-edit of name and email. The email path re-normalizes
    /// and maps the store's unique violation to a conflict.
    pub async fn update_profile(
        db: &PgPool,
        user_id: i64,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, ApiError> {
        let email = email.map(normalize_email);
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($1, name),
                email = COALESCE($2, email),
                updated_at = now()
            WHERE id = $3
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(email.as_deref())
        .bind(user_id)
        .fetch_optional(db)
        .await
        .map_err(|e| conflict_on_unique(e, ApiError::EmailTaken))?
        .ok_or(ApiError::NotFound("User"))?;
        Ok(user)
    }

    /// Flat role-string change. Deliberately does not touch the stored
    /// variant (see DESIGN.md on role/variant drift).
    pub async fn set_role(db: &PgPool, user_id: i64, role: &str) -> Result<(), ApiError> {
        let res = sqlx::query(r#"UPDATE users SET role = $1, updated_at = now() WHERE id = $2"#)
            .bind(role)
            .bind(user_id)
            .execute(db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::NotFound("User"));
        }
        Ok(())
    }

    pub async fn set_email_verified(db: &PgPool, user_id: i64) -> Result<(), ApiError> {
        let res = sqlx::query(
            r#"UPDATE users SET email_verified = TRUE, updated_at = now() WHERE id = $1"#,
        )
        .bind(user_id)
        .execute(db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::NotFound("User"));
        }
        Ok(())
    }

    pub async fn delete(db: &PgPool, user_id: i64) -> Result<(), ApiError> {
        let res = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(user_id)
            .execute(db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(ApiError::NotFound("User"));
        }
        Ok(())
    }

    pub async fn list(
        db: &PgPool,
        role: Option<&str>,
        page: i64,
        per_page: i64,
    ) -> anyhow::Result<(Vec<User>, i64)> {
        let offset = (page.max(1) - 1) * per_page;
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE ($1::text IS NULL OR role = $1)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(role)
        .bind(per_page)
        .bind(offset)
        .fetch_all(db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM users WHERE ($1::text IS NULL OR role = $1)"#,
        )
        .bind(role)
        .fetch_one(db)
        .await?;

        Ok((users, total))
    }

    /// Materialize the variant payload for the stored tag. Drivers pull
    /// their document list and assigned vehicle in full.
    pub async fn load_variant(&self, db: &PgPool) -> anyhow::Result<UserVariant> {
        match self.variant.as_str() {
            "driver" => {
                let documents = sqlx::query_as::<_, DriverDocument>(
                    r#"
                    SELECT id, user_id, document_type, file_path, uploaded_at
                    FROM driver_documents
                    WHERE user_id = $1
                    ORDER BY id
                    "#,
                )
                .bind(self.id)
                .fetch_all(db)
                .await?;
                let vehicle = match self.vehicle_id {
                    Some(vid) => fleet::repo::vehicle_details(db, vid).await?,
                    None => None,
                };
                Ok(UserVariant::Driver { vehicle, documents })
            }
            "admin" => Ok(UserVariant::Admin),
            _ => Ok(UserVariant::Customer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Ana@Example.com "), "ana@example.com");
        assert_eq!(normalize_email("ANA@EXAMPLE.COM"), "ana@example.com");
    }

    #[test]
    fn variant_is_fixed_by_role_at_creation() {
        assert_eq!(variant_for_role(UserRole::Client), "customer");
        assert_eq!(variant_for_role(UserRole::Driver), "driver");
        assert_eq!(variant_for_role(UserRole::Admin), "admin");
    }

    #[test]
    fn default_graph_role_matches_discriminator() {
        assert_eq!(default_role_name(UserRole::Client), "cliente");
        assert_eq!(default_role_name(UserRole::Admin), "admin");
    }
}
