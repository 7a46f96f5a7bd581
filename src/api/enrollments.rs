use rocket::State;
use rocket::serde::{Deserialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use super::courses::DeletedResponse;
use crate::auth::{Permission, User};
use crate::database::{
    StudentCourses, enroll_student, list_student_courses, remove_student_from_course,
    set_enrollment_pacing,
};
use crate::models::Enrollment;
use crate::validation::{
    ApiError, AppErrorExt, JsonValidateExt, PermissionCheckExt, UNIQUE_ID_PATTERN,
};

#[derive(Deserialize, Validate)]
pub struct EnrollRequest {
    #[validate(regex(path = *UNIQUE_ID_PATTERN, message = "Student ID must look like ACD-XXXXXX"))]
    unique_id: String,
}

#[post("/courses/<course_id>/enrollments", data = "<request>")]
pub async fn api_enroll_student(
    course_id: i64,
    user: User,
    request: Json<EnrollRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Enrollment>, ApiError> {
    user.require_permission(Permission::ManageEnrollments)
        .validate_custom()?;
    let req = request.validate_custom()?;

    let enrollment = enroll_student(db, &req.unique_id, course_id, user.id)
        .await
        .validate_custom()?;
    Ok(Json(enrollment))
}

#[delete("/courses/<course_id>/enrollments/<student_id>")]
pub async fn api_remove_enrollment(
    course_id: i64,
    student_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<DeletedResponse>, ApiError> {
    user.require_permission(Permission::ManageEnrollments)
        .validate_custom()?;
    remove_student_from_course(db, student_id, course_id)
        .await
        .validate_custom()?;
    Ok(Json(DeletedResponse { success: true }))
}

#[derive(Deserialize)]
pub struct PacingRequest {
    hide_new_sessions: bool,
}

#[put("/courses/<course_id>/enrollments/<student_id>/pacing", data = "<request>")]
pub async fn api_set_enrollment_pacing(
    course_id: i64,
    student_id: i64,
    user: User,
    request: Json<PacingRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Enrollment>, ApiError> {
    user.require_permission(Permission::ManageEnrollments)
        .validate_custom()?;
    let enrollment = set_enrollment_pacing(db, student_id, course_id, request.hide_new_sessions)
        .await
        .validate_custom()?;
    Ok(Json(enrollment))
}

#[get("/my/courses")]
pub async fn api_my_courses(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<StudentCourses>, ApiError> {
    user.require_permission(Permission::ViewOwnCourses)
        .validate_custom()?;
    Ok(Json(list_student_courses(db, user.id).await.validate_custom()?))
}
