use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: i64,
    pub name: String,
}

/// Attach a named role to the user, inside the caller's transaction so a
/// failed follow-up statement rolls the assignment back too. Unknown role
/// names and repeat assignments are no-ops.
pub async fn assign(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    role_name: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO roles_users (role_id, user_id)
        SELECT id, $2 FROM roles WHERE name = $1
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(role_name)
    .bind(user_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Roles attached to the user, in assignment-table order.
pub async fn roles_of(db: &PgPool, user_id: i64) -> anyhow::Result<Vec<Role>> {
    let rows = sqlx::query_as::<_, Role>(
        r#"
        SELECT r.id, r.name, r.display_name
        FROM roles r
        JOIN roles_users ru ON ru.role_id = r.id
        WHERE ru.user_id = $1
        ORDER BY r.id
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Union of permissions across every role of the user, deduplicated by
/// permission id (two roles may reference the same permission row).
pub async fn effective_permissions(db: &PgPool, user_id: i64) -> anyhow::Result<Vec<Permission>> {
    let rows = sqlx::query_as::<_, Permission>(
        r#"
        SELECT p.id, p.name
        FROM permissions p
        JOIN roles_permissions rp ON rp.permission_id = p.id
        JOIN roles_users ru ON ru.role_id = rp.role_id
        WHERE ru.user_id = $1
        ORDER BY p.id
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(dedup_by_id(rows))
}

/// The sole authorization gate for privileged operations. A user with no
/// roles (or no matching role) is denied.
pub async fn has_any_role(db: &PgPool, user_id: i64, role_names: &[&str]) -> anyhow::Result<bool> {
    if role_names.is_empty() {
        return Ok(false);
    }
    let names: Vec<String> = role_names.iter().map(|s| s.to_string()).collect();
    let found = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1
            FROM roles_users ru
            JOIN roles r ON r.id = ru.role_id
            WHERE ru.user_id = $1 AND r.name = ANY($2)
        )
        "#,
    )
    .bind(user_id)
    .bind(&names)
    .fetch_one(db)
    .await?;
    Ok(found)
}

/// Identity is the permission row id, not its name.
fn dedup_by_id(mut permissions: Vec<Permission>) -> Vec<Permission> {
    permissions.sort_by_key(|p| p.id);
    permissions.dedup_by_key(|p| p.id);
    permissions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(id: i64, name: &str) -> Permission {
        Permission {
            id,
            name: name.into(),
        }
    }

    #[test]
    fn shared_permission_appears_once() {
        // Two roles referencing permission 7 collapse to a single entry.
        let joined = vec![perm(7, "rides.view"), perm(3, "users.edit"), perm(7, "rides.view")];
        let effective = dedup_by_id(joined);
        assert_eq!(effective.len(), 2);
        assert_eq!(effective.iter().filter(|p| p.id == 7).count(), 1);
    }

    #[test]
    fn dedup_keys_on_id_not_name() {
        // Same name under two different rows stays two permissions.
        let joined = vec![perm(1, "manage"), perm(2, "manage")];
        assert_eq!(dedup_by_id(joined).len(), 2);
    }

    #[test]
    fn empty_set_stays_empty() {
        assert!(dedup_by_id(Vec::new()).is_empty());
    }
}
