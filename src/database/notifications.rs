use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::{
    error::AppError,
    models::{DbNotification, Notification, NotificationKind},
};

pub const DEFAULT_NOTIFICATION_LIMIT: i64 = 10;

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationFeed {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

/// Writes a notification on the caller's connection so it commits with the
/// change that caused it.
#[instrument(skip(conn))]
pub async fn insert_notification(
    conn: &mut SqliteConnection,
    student_id: i64,
    kind: NotificationKind,
    title: &str,
    message: &str,
) -> Result<i64, AppError> {
    info!("Creating student notification");
    let res = sqlx::query(
        "INSERT INTO student_notifications (student_id, title, message, notification_type, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(student_id)
    .bind(title)
    .bind(message)
    .bind(kind.as_str())
    .bind(Utc::now().naive_utc())
    .execute(&mut *conn)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn list_notifications(
    pool: &Pool<Sqlite>,
    student_id: i64,
    limit: Option<i64>,
) -> Result<NotificationFeed, AppError> {
    info!("Listing notifications");
    let limit = limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_NOTIFICATION_LIMIT);

    let rows = sqlx::query_as::<_, DbNotification>(
        "SELECT id, title, message, notification_type, created_at, read_at
         FROM student_notifications
         WHERE student_id = ?
         ORDER BY created_at DESC, id DESC
         LIMIT ?",
    )
    .bind(student_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let (unread_count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM student_notifications WHERE student_id = ? AND read_at IS NULL",
    )
    .bind(student_id)
    .fetch_one(pool)
    .await?;

    Ok(NotificationFeed {
        notifications: rows.into_iter().map(Notification::from).collect(),
        unread_count,
    })
}

#[instrument]
pub async fn mark_notification_read(
    pool: &Pool<Sqlite>,
    student_id: i64,
    notification_id: i64,
) -> Result<u64, AppError> {
    info!("Marking notification as read");
    let owned: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM student_notifications WHERE id = ? AND student_id = ?",
    )
    .bind(notification_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    if owned.is_none() {
        return Err(AppError::NotFound(format!(
            "Notification {} not found",
            notification_id
        )));
    }

    let result = sqlx::query(
        "UPDATE student_notifications SET read_at = ? WHERE id = ? AND read_at IS NULL",
    )
    .bind(Utc::now().naive_utc())
    .bind(notification_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[instrument]
pub async fn mark_all_notifications_read(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<u64, AppError> {
    info!("Marking all notifications as read");
    let result = sqlx::query(
        "UPDATE student_notifications SET read_at = ? WHERE student_id = ? AND read_at IS NULL",
    )
    .bind(Utc::now().naive_utc())
    .bind(student_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
