use rocket::State;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, User};
use crate::database::{AdminDashboard, StudentDashboard, admin_dashboard, student_dashboard};
use crate::validation::{ApiError, AppErrorExt, PermissionCheckExt};

#[get("/dashboard/student")]
pub async fn api_student_dashboard(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<StudentDashboard>, ApiError> {
    user.require_permission(Permission::ViewOwnCourses)
        .validate_custom()?;
    Ok(Json(student_dashboard(db, user.id).await.validate_custom()?))
}

#[get("/dashboard/admin")]
pub async fn api_admin_dashboard(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<AdminDashboard>, ApiError> {
    user.require_permission(Permission::ManageCourses)
        .validate_custom()?;
    Ok(Json(admin_dashboard(db, user.id).await.validate_custom()?))
}
