use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use super::courses::list_admin_courses;
use super::enrollments::list_student_courses;
use super::points::global_leaderboard;
use crate::{
    error::AppError,
    leaderboard::GlobalLeaderboard,
    models::{Course, DbStudentSummary, Enrollment, StudentSummary, SubscriptionSummary},
};

pub const DASHBOARD_LEADERBOARD_SIZE: usize = 5;
pub const RECENT_STUDENTS_LIMIT: i64 = 5;

#[derive(Debug, Serialize, Deserialize)]
pub struct StudentDashboard {
    pub total_courses: i64,
    pub completed_courses: i64,
    pub completed_sessions: i64,
    pub total_points: i64,
    pub courses: Vec<Enrollment>,
    pub subscription_expired: bool,
    pub subscription: Option<SubscriptionSummary>,
    pub leaderboard: GlobalLeaderboard,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminDashboard {
    pub courses: Vec<Course>,
    pub total_students: i64,
    pub active_students: i64,
    pub managed_groups: i64,
    pub recent_students: Vec<StudentSummary>,
}

#[instrument]
pub async fn student_dashboard(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<StudentDashboard, AppError> {
    info!("Building student dashboard");

    let (total_courses, completed_courses, completed_sessions): (i64, i64, i64) = sqlx::query_as(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN c.total_sessions > 0 AND sc.progress >= c.total_sessions THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(sc.progress), 0)
         FROM student_courses sc
         JOIN courses c ON c.id = sc.course_id
         WHERE sc.student_id = ?",
    )
    .bind(student_id)
    .fetch_one(pool)
    .await?;

    let (total_points,): (i64,) = sqlx::query_as("SELECT total_points FROM users WHERE id = ?")
        .bind(student_id)
        .fetch_one(pool)
        .await?;

    let courses = list_student_courses(pool, student_id).await?;
    let leaderboard =
        global_leaderboard(pool, DASHBOARD_LEADERBOARD_SIZE, Some(student_id)).await?;

    Ok(StudentDashboard {
        total_courses,
        completed_courses,
        completed_sessions,
        total_points,
        courses: courses.courses,
        subscription_expired: courses.subscription_expired,
        subscription: courses.subscription,
        leaderboard,
    })
}

#[instrument]
pub async fn admin_dashboard(pool: &Pool<Sqlite>, admin_id: i64) -> Result<AdminDashboard, AppError> {
    info!("Building admin dashboard");

    let courses = list_admin_courses(pool, admin_id).await?;

    let (total_students, active_students): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN total_points > 0 THEN 1 ELSE 0 END), 0)
         FROM users WHERE role = 'student'",
    )
    .fetch_one(pool)
    .await?;

    let (managed_groups,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM course_groups WHERE created_by = ? OR allowed_admin_id = ?",
    )
    .bind(admin_id)
    .bind(admin_id)
    .fetch_one(pool)
    .await?;

    let recent = sqlx::query_as::<_, DbStudentSummary>(
        "SELECT id, name, email, unique_id, phone, total_points
         FROM users WHERE role = 'student'
         ORDER BY created_at DESC, id DESC
         LIMIT ?",
    )
    .bind(RECENT_STUDENTS_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(AdminDashboard {
        courses,
        total_students,
        active_students,
        managed_groups,
        recent_students: recent.into_iter().map(StudentSummary::from).collect(),
    })
}
