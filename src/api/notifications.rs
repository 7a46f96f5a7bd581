use rocket::State;
use rocket::serde::{Serialize, Deserialize, json::Json};
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, User};
use crate::database::{
    NotificationFeed, list_notifications, mark_all_notifications_read, mark_notification_read,
};
use crate::validation::{ApiError, AppErrorExt, PermissionCheckExt};

#[derive(Serialize, Deserialize)]
pub struct MarkedReadResponse {
    pub success: bool,
    pub updated: u64,
}

#[get("/notifications?<limit>")]
pub async fn api_list_notifications(
    limit: Option<i64>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<NotificationFeed>, ApiError> {
    user.require_permission(Permission::ViewOwnNotifications)
        .validate_custom()?;
    Ok(Json(
        list_notifications(db, user.id, limit)
            .await
            .validate_custom()?,
    ))
}

#[put("/notifications/<id>/read")]
pub async fn api_mark_notification_read(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MarkedReadResponse>, ApiError> {
    user.require_permission(Permission::ViewOwnNotifications)
        .validate_custom()?;
    let updated = mark_notification_read(db, user.id, id)
        .await
        .validate_custom()?;
    Ok(Json(MarkedReadResponse {
        success: true,
        updated,
    }))
}

#[put("/notifications/read-all")]
pub async fn api_mark_all_notifications_read(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MarkedReadResponse>, ApiError> {
    user.require_permission(Permission::ViewOwnNotifications)
        .validate_custom()?;
    let updated = mark_all_notifications_read(db, user.id)
        .await
        .validate_custom()?;
    Ok(Json(MarkedReadResponse {
        success: true,
        updated,
    }))
}
