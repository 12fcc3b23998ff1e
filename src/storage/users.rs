use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, StoreError, User, UserDbRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserExists`] if the name is taken.
    pub async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let now = to_millis(Utc::now());
        let row = sqlx::query_as::<_, UserDbRow>(
            r#"
            INSERT INTO users (name, created_at, updated_at)
            VALUES (?, ?, ?)
            RETURNING id, name, created_at
        "#,
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if StoreError::is_unique_violation(&e) {
                StoreError::UserExists(name.to_string())
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(row.into_user())
    }

    /// Look up a user by name, `StoreError::NotFound` if absent
    pub async fn get_user_by_name(&self, name: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, UserDbRow>("SELECT id, name, created_at FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(UserDbRow::into_user)
            .ok_or(StoreError::NotFound)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows =
            sqlx::query_as::<_, UserDbRow>("SELECT id, name, created_at FROM users ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(UserDbRow::into_user).collect())
    }
}
