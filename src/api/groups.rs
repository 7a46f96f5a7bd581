use chrono::NaiveDate;
use rocket::State;
use rocket::serde::{Deserialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use super::courses::DeletedResponse;
use crate::auth::{Permission, User};
use crate::database::{
    GroupDetail, NewGroup, PointsAward, add_student_to_group, award_group_points, create_group,
    get_group, get_group_detail, group_leaderboard, list_managed_groups,
    remove_student_from_group, require_group_manager, search_students_for_group,
};
use crate::leaderboard::LeaderboardEntry;
use crate::models::{CourseGroup, StudentSummary};
use crate::validation::{ApiError, AppErrorExt, JsonValidateExt, PermissionCheckExt};

#[derive(Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 3, message = "Title must be at least 3 characters"))]
    title: String,
    course_id: i64,
    branch: Option<String>,
    start_date: NaiveDate,
    allowed_admin_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    student_id: i64,
}

#[derive(Deserialize, Validate)]
pub struct AwardPointsRequest {
    student_id: i64,
    #[validate(range(min = -1000, max = 1000, message = "Points must be between -1000 and 1000"))]
    points: i64,
}

async fn managed_group(
    db: &Pool<Sqlite>,
    group_id: i64,
    user: &User,
) -> Result<CourseGroup, ApiError> {
    user.require_permission(Permission::ManageGroups)
        .validate_custom()?;
    let group = get_group(db, group_id).await.validate_custom()?;
    require_group_manager(&group, user.id).validate_custom()?;
    Ok(group)
}

#[post("/groups", data = "<request>")]
pub async fn api_create_group(
    user: User,
    request: Json<CreateGroupRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CourseGroup>, ApiError> {
    user.require_permission(Permission::ManageGroups)
        .validate_custom()?;
    let req = request.validate_custom()?;

    let group = create_group(
        db,
        user.id,
        NewGroup {
            title: &req.title,
            course_id: req.course_id,
            branch: req.branch.as_deref().filter(|b| !b.trim().is_empty()),
            start_date: req.start_date,
            allowed_admin_id: req.allowed_admin_id,
        },
    )
    .await
    .validate_custom()?;
    Ok(Json(group))
}

#[get("/groups")]
pub async fn api_list_groups(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<CourseGroup>>, ApiError> {
    user.require_permission(Permission::ManageGroups)
        .validate_custom()?;
    Ok(Json(list_managed_groups(db, user.id).await.validate_custom()?))
}

#[get("/groups/<id>")]
pub async fn api_group_detail(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<GroupDetail>, ApiError> {
    managed_group(db, id, &user).await?;
    Ok(Json(get_group_detail(db, id).await.validate_custom()?))
}

#[get("/groups/<id>/candidates?<q>")]
pub async fn api_search_group_candidates(
    id: i64,
    q: Option<String>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<StudentSummary>>, ApiError> {
    managed_group(db, id, &user).await?;
    let query = q.unwrap_or_default();
    Ok(Json(
        search_students_for_group(db, id, &query)
            .await
            .validate_custom()?,
    ))
}

#[post("/groups/<id>/students", data = "<request>")]
pub async fn api_add_group_student(
    id: i64,
    user: User,
    request: Json<AddMemberRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<GroupDetail>, ApiError> {
    managed_group(db, id, &user).await?;
    add_student_to_group(db, id, request.student_id, user.id)
        .await
        .validate_custom()?;
    Ok(Json(get_group_detail(db, id).await.validate_custom()?))
}

#[delete("/groups/<id>/students/<student_id>")]
pub async fn api_remove_group_student(
    id: i64,
    student_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<DeletedResponse>, ApiError> {
    managed_group(db, id, &user).await?;
    remove_student_from_group(db, id, student_id)
        .await
        .validate_custom()?;
    Ok(Json(DeletedResponse { success: true }))
}

#[post("/groups/<id>/points", data = "<request>")]
pub async fn api_award_points(
    id: i64,
    user: User,
    request: Json<AwardPointsRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<PointsAward>, ApiError> {
    user.require_all_permissions(&[Permission::ManageGroups, Permission::AwardPoints])
        .validate_custom()?;
    managed_group(db, id, &user).await?;
    let req = request.validate_custom()?;

    Ok(Json(
        award_group_points(db, id, req.student_id, req.points)
            .await
            .validate_custom()?,
    ))
}

#[get("/groups/<id>/leaderboard")]
pub async fn api_group_leaderboard(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    managed_group(db, id, &user).await?;
    Ok(Json(group_leaderboard(db, id).await.validate_custom()?))
}
