//! Row operations for resolved identities.

use sqlx::SqliteConnection;

use crate::{
    error::Error,
    identity::{self, DirectoryUser, Identity},
    message::UserId,
};

impl Identity {
    pub async fn fetch(
        db: &mut SqliteConnection,
        user_id: &UserId,
    ) -> Result<Option<Identity>, Error> {
        Ok(sqlx::query_as(
            "SELECT user_id, internal_id, display_name, department
             FROM identities WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(db)
        .await?)
    }

    /// Inserts the identity row for `user_id`, synthesizing the short
    /// address from the directory record.
    ///
    /// Short-address collisions are arbitrated by the unique index: on a
    /// unique violation the local part gets a numeric suffix
    /// (`jane2@students`, then `jane3@students`, ...) and the insert is
    /// retried. A concurrent insert of the same user id wins quietly and
    /// the winner's row is returned.
    pub async fn create(
        db: &mut SqliteConnection,
        user_id: &UserId,
        record: &DirectoryUser,
    ) -> Result<Identity, Error> {
        let display_name = identity::display_name(record);
        let department = identity::department_code(&record.role).to_owned();
        let base = identity::internal_address(record);
        let created_at = chrono::Utc::now().timestamp_millis();

        let mut attempt: u32 = 0;

        loop {
            let internal_id = if attempt == 0 {
                base.clone()
            } else {
                identity::with_suffix(&base, attempt + 1)
            };

            let result = sqlx::query(
                "INSERT INTO identities (user_id, internal_id, display_name, department, created_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT(user_id) DO NOTHING",
            )
            .bind(user_id)
            .bind(&internal_id)
            .bind(&display_name)
            .bind(&department)
            .bind(created_at)
            .execute(&mut *db)
            .await;

            match result {
                Ok(done) if done.rows_affected() == 0 => {
                    // Lost the user_id race; serve whatever won.
                    return Self::fetch(db, user_id)
                        .await?
                        .ok_or_else(|| Error::not_found(format!("identity {user_id}")));
                }
                Ok(_) => {
                    return Ok(Identity {
                        user_id: user_id.clone(),
                        internal_id,
                        display_name,
                        department,
                    });
                }
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
