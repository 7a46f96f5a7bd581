use rocket::State;
use rocket::serde::{Deserialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Permission, User};
use crate::database::{
    adjust_sessions, consume_session, create_global_subscription, get_global_subscription,
    low_session_alerts, reconcile_subscription, refill_sessions,
};
use crate::ledger::Adjustment;
use crate::models::{LowSessionAlert, SubscriptionSummary};
use crate::validation::{ApiError, AppErrorExt, JsonValidateExt, PermissionCheckExt};

#[derive(Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    #[validate(range(min = 1, max = 24, message = "Plan must be between 1 and 24 months"))]
    months: i64,
}

#[derive(Deserialize, Validate)]
pub struct AdjustSessionsRequest {
    #[serde(rename = "type")]
    adjustment: Adjustment,
    #[validate(range(min = 1, message = "Number of sessions must be at least 1"))]
    sessions: i64,
    group_title: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct RefillRequest {
    #[validate(range(min = 1, message = "Number of sessions must be at least 1"))]
    sessions: i64,
}

#[get("/students/<student_id>/subscription")]
pub async fn api_student_subscription(
    student_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Option<SubscriptionSummary>>, ApiError> {
    user.require_permission(Permission::ManageSubscriptions)
        .validate_custom()?;
    Ok(Json(
        get_global_subscription(db, student_id)
            .await
            .validate_custom()?,
    ))
}

#[get("/my/subscription")]
pub async fn api_my_subscription(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Option<SubscriptionSummary>>, ApiError> {
    user.require_permission(Permission::ViewOwnCourses)
        .validate_custom()?;
    Ok(Json(
        get_global_subscription(db, user.id)
            .await
            .validate_custom()?,
    ))
}

#[post("/students/<student_id>/subscription", data = "<request>")]
pub async fn api_create_subscription(
    student_id: i64,
    user: User,
    request: Json<CreateSubscriptionRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    user.require_permission(Permission::ManageSubscriptions)
        .validate_custom()?;
    let req = request.validate_custom()?;

    let summary = create_global_subscription(db, student_id, req.months, user.id)
        .await
        .validate_custom()?;
    Ok(Json(summary))
}

#[post("/students/<student_id>/subscription/adjust", data = "<request>")]
pub async fn api_adjust_sessions(
    student_id: i64,
    user: User,
    request: Json<AdjustSessionsRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    user.require_permission(Permission::ManageSubscriptions)
        .validate_custom()?;
    let req = request.validate_custom()?;

    let summary = adjust_sessions(
        db,
        student_id,
        req.adjustment,
        req.sessions,
        req.group_title.as_deref(),
    )
    .await
    .validate_custom()?;
    Ok(Json(summary))
}

#[post("/students/<student_id>/subscription/refill", data = "<request>")]
pub async fn api_refill_sessions(
    student_id: i64,
    user: User,
    request: Json<RefillRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    user.require_permission(Permission::ManageSubscriptions)
        .validate_custom()?;
    let req = request.validate_custom()?;

    let summary = refill_sessions(db, student_id, req.sessions)
        .await
        .validate_custom()?;
    Ok(Json(summary))
}

#[post("/students/<student_id>/subscription/consume")]
pub async fn api_consume_session(
    student_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    user.require_permission(Permission::ManageSubscriptions)
        .validate_custom()?;
    Ok(Json(consume_session(db, student_id).await.validate_custom()?))
}

#[post("/students/<student_id>/subscription/reconcile")]
pub async fn api_reconcile_subscription(
    student_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Option<SubscriptionSummary>>, ApiError> {
    user.require_permission(Permission::ManageSubscriptions)
        .validate_custom()?;
    Ok(Json(
        reconcile_subscription(db, student_id)
            .await
            .validate_custom()?,
    ))
}

#[get("/subscriptions/low")]
pub async fn api_low_session_alerts(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<LowSessionAlert>>, ApiError> {
    user.require_permission(Permission::ManageSubscriptions)
        .validate_custom()?;
    Ok(Json(low_session_alerts(db).await.validate_custom()?))
}
