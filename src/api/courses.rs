use rocket::State;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Permission, User};
use crate::database::{
    CourseDetail, StudentCourseView, complete_session, create_course, create_session,
    delete_session, get_course_detail, list_admin_courses, list_courses, set_session_flags,
    student_course_view, update_session,
};
use crate::models::{Course, CourseSession, Enrollment};
use crate::validation::{
    ApiError, AppErrorExt, JsonValidateExt, PermissionCheckExt, blank_as_none,
};

#[derive(Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 3, message = "Title must be at least 3 characters"))]
    title: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    description: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct SessionRequest {
    #[validate(length(min = 3, message = "Title must be at least 3 characters"))]
    title: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(url(message = "Video link must be a valid URL"))]
    video_url: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(url(message = "Material link must be a valid URL"))]
    material_url: Option<String>,
}

#[derive(Deserialize)]
pub struct SessionFlagsRequest {
    visible: Option<bool>,
    locked: Option<bool>,
}

#[derive(Serialize, Deserialize)]
pub struct DeletedResponse {
    pub success: bool,
}

#[derive(Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[post("/courses", data = "<request>")]
pub async fn api_create_course(
    user: User,
    request: Json<CreateCourseRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Course>, ApiError> {
    user.require_permission(Permission::ManageCourses)
        .validate_custom()?;
    let req = request.validate_custom()?;

    let course = create_course(db, user.id, &req.title, req.description.as_deref())
        .await
        .validate_custom()?;
    Ok(Json(course))
}

#[get("/courses")]
pub async fn api_list_courses(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Course>>, ApiError> {
    user.require_permission(Permission::ManageCourses)
        .validate_custom()?;
    Ok(Json(list_courses(db).await.validate_custom()?))
}

#[get("/courses/mine")]
pub async fn api_list_my_courses(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Course>>, ApiError> {
    user.require_permission(Permission::ManageCourses)
        .validate_custom()?;
    Ok(Json(list_admin_courses(db, user.id).await.validate_custom()?))
}

#[get("/courses/<id>")]
pub async fn api_course_detail(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CourseDetail>, ApiError> {
    user.require_permission(Permission::ManageCourses)
        .validate_custom()?;
    Ok(Json(get_course_detail(db, id).await.validate_custom()?))
}

#[post("/courses/<id>/sessions", data = "<request>")]
pub async fn api_create_session(
    id: i64,
    user: User,
    request: Json<SessionRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CourseSession>, ApiError> {
    user.require_permission(Permission::ManageCourses)
        .validate_custom()?;
    let req = request.validate_custom()?;

    let session = create_session(
        db,
        id,
        &req.title,
        req.video_url.as_deref(),
        req.material_url.as_deref(),
    )
    .await
    .validate_custom()?;
    Ok(Json(session))
}

#[put("/sessions/<id>", data = "<request>")]
pub async fn api_update_session(
    id: i64,
    user: User,
    request: Json<SessionRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CourseSession>, ApiError> {
    user.require_permission(Permission::ManageCourses)
        .validate_custom()?;
    let req = request.validate_custom()?;

    let session = update_session(
        db,
        id,
        &req.title,
        req.video_url.as_deref(),
        req.material_url.as_deref(),
    )
    .await
    .validate_custom()?;
    Ok(Json(session))
}

#[put("/sessions/<id>/flags", data = "<request>")]
pub async fn api_set_session_flags(
    id: i64,
    user: User,
    request: Json<SessionFlagsRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CourseSession>, ApiError> {
    user.require_permission(Permission::ManageCourses)
        .validate_custom()?;
    let session = set_session_flags(db, id, request.visible, request.locked)
        .await
        .validate_custom()?;
    Ok(Json(session))
}

#[delete("/sessions/<id>")]
pub async fn api_delete_session(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<DeletedResponse>, ApiError> {
    user.require_permission(Permission::ManageCourses)
        .validate_custom()?;
    delete_session(db, id).await.validate_custom()?;
    Ok(Json(DeletedResponse { success: true }))
}

#[get("/courses/<id>/sessions")]
pub async fn api_student_course_sessions(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<StudentCourseView>, ApiError> {
    user.require_permission(Permission::ViewOwnCourses)
        .validate_custom()?;
    Ok(Json(student_course_view(db, user.id, id).await.validate_custom()?))
}

#[post("/sessions/<id>/complete")]
pub async fn api_complete_session(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Enrollment>, ApiError> {
    user.require_permission(Permission::CompleteSessions)
        .validate_custom()?;
    Ok(Json(complete_session(db, user.id, id).await.validate_custom()?))
}
