use sqlx::PgConnection;
use uuid::Uuid;

use crate::model::notification::{Notification, NotificationCreateInput};

use super::DatabasePagination;

#[derive(Clone)]
pub struct NotificationRepo;

impl NotificationRepo {
    pub async fn create_one(
        input: NotificationCreateInput,
        db: &mut PgConnection,
    ) -> sqlx::Result<Notification> {
        sqlx::query_as::<_, Notification>(
            r#"INSERT INTO notification (user_id, actor_id, type, payload) VALUES ($1, $2, $3, $4) RETURNING *"#,
        )
        .bind(input.user_id)
        .bind(input.actor_id)
        .bind(input.notification_type)
        .bind(input.payload)
        .fetch_one(db)
        .await
    }

    pub async fn list_for_user(
        user_id: Uuid,
        unread_only: bool,
        options: DatabasePagination,
        db: &mut PgConnection,
    ) -> sqlx::Result<Vec<Notification>> {
        if unread_only {
            sqlx::query_as::<_, Notification>(
                r#"SELECT * FROM notification WHERE user_id = $1 AND read = false AND deleted_at IS NULL
                   ORDER BY created_at DESC LIMIT $2 OFFSET $3"#,
            )
            .bind(user_id)
            .bind(options.limit)
            .bind(options.offset)
            .fetch_all(db)
            .await
        } else {
            sqlx::query_as::<_, Notification>(
                r#"SELECT * FROM notification WHERE user_id = $1 AND deleted_at IS NULL
                   ORDER BY created_at DESC LIMIT $2 OFFSET $3"#,
            )
            .bind(user_id)
            .bind(options.limit)
            .bind(options.offset)
            .fetch_all(db)
            .await
        }
    }

    pub async fn count_for_user(
        user_id: Uuid,
        unread_only: bool,
        db: &mut PgConnection,
    ) -> sqlx::Result<i64> {
        if unread_only {
            sqlx::query_scalar::<_, i64>(
                r#"SELECT COUNT(*) FROM notification WHERE user_id = $1 AND read = false AND deleted_at IS NULL"#,
            )
            .bind(user_id)
            .fetch_one(db)
            .await
        } else {
            sqlx::query_scalar::<_, i64>(
                r#"SELECT COUNT(*) FROM notification WHERE user_id = $1 AND deleted_at IS NULL"#,
            )
            .bind(user_id)
            .fetch_one(db)
            .await
        }
    }

    /// Only the recipient can mark their notification; returns 0 rows when
    /// the id does not exist or belongs to someone else.
    pub async fn mark_read(id: Uuid, user_id: Uuid, db: &mut PgConnection) -> sqlx::Result<u64> {
        sqlx::query(
            r#"UPDATE notification SET read = true, updated_at = now()
               WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"#,
        )
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await
        .map(|r| r.rows_affected())
    }

    pub async fn mark_all_read(user_id: Uuid, db: &mut PgConnection) -> sqlx::Result<u64> {
        sqlx::query(
            r#"UPDATE notification SET read = true, updated_at = now()
               WHERE user_id = $1 AND read = false AND deleted_at IS NULL"#,
        )
        .bind(user_id)
        .execute(db)
        .await
        .map(|r| r.rows_affected())
    }
}
