use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use super::enrollments::fetch_enrollment;
use super::subscriptions::current_balance;
use crate::{
    error::AppError,
    models::{Course, CourseSession, DbCourse, DbCourseSession},
};

const SESSION_COLUMNS: &str =
    "id, course_id, title, order_number, video_url, material_url, visible, locked";

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct CourseStudent {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub unique_id: String,
    pub progress: i64,
    pub assigned_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CourseDetail {
    pub course: Course,
    pub sessions: Vec<CourseSession>,
    pub students: Vec<CourseStudent>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StudentSessionView {
    #[serde(flatten)]
    pub session: CourseSession,
    pub available: bool,
    pub completed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StudentCourseView {
    pub course: Course,
    pub progress: i64,
    pub sessions: Vec<StudentSessionView>,
    pub subscription_expired: bool,
}

async fn fetch_course(conn: &mut SqliteConnection, course_id: i64) -> Result<Course, AppError> {
    let row = sqlx::query_as::<_, DbCourse>(
        "SELECT id, title, description, total_sessions, created_at FROM courses WHERE id = ?",
    )
    .bind(course_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Course::from)
        .ok_or_else(|| AppError::NotFound(format!("Course with id {} not found", course_id)))
}

async fn fetch_sessions(
    conn: &mut SqliteConnection,
    course_id: i64,
) -> Result<Vec<CourseSession>, AppError> {
    let rows = sqlx::query_as::<_, DbCourseSession>(&format!(
        "SELECT {} FROM sessions WHERE course_id = ? ORDER BY order_number, id",
        SESSION_COLUMNS
    ))
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(CourseSession::from).collect())
}

#[instrument]
pub async fn create_course(
    pool: &Pool<Sqlite>,
    admin_id: i64,
    title: &str,
    description: Option<&str>,
) -> Result<Course, AppError> {
    info!("Creating course");
    let mut tx = pool.begin().await?;

    let course_id = sqlx::query(
        "INSERT INTO courses (title, description, total_sessions, created_at) VALUES (?, ?, 0, ?)",
    )
    .bind(title.trim())
    .bind(description)
    .bind(Utc::now().naive_utc())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    sqlx::query("INSERT INTO admin_courses (admin_id, course_id) VALUES (?, ?)")
        .bind(admin_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;

    let course = fetch_course(&mut tx, course_id).await?;
    tx.commit().await?;

    Ok(course)
}

#[instrument]
pub async fn list_courses(pool: &Pool<Sqlite>) -> Result<Vec<Course>, AppError> {
    info!("Listing all courses");
    let rows = sqlx::query_as::<_, DbCourse>(
        "SELECT id, title, description, total_sessions, created_at FROM courses ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Course::from).collect())
}

#[instrument]
pub async fn list_admin_courses(pool: &Pool<Sqlite>, admin_id: i64) -> Result<Vec<Course>, AppError> {
    info!("Listing courses owned by admin");
    let rows = sqlx::query_as::<_, DbCourse>(
        "SELECT c.id, c.title, c.description, c.total_sessions, c.created_at
         FROM courses c
         JOIN admin_courses ac ON ac.course_id = c.id
         WHERE ac.admin_id = ?
         ORDER BY c.created_at DESC, c.id DESC",
    )
    .bind(admin_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Course::from).collect())
}

#[instrument]
pub async fn get_course_detail(pool: &Pool<Sqlite>, course_id: i64) -> Result<CourseDetail, AppError> {
    info!("Fetching course detail");
    let mut conn = pool.acquire().await?;

    let course = fetch_course(&mut conn, course_id).await?;
    let sessions = fetch_sessions(&mut conn, course_id).await?;

    let students = sqlx::query_as::<_, CourseStudent>(
        "SELECT u.id, u.name, u.email, COALESCE(u.unique_id, '') AS unique_id,
                sc.progress, sc.assigned_at
         FROM student_courses sc
         JOIN users u ON u.id = sc.student_id
         WHERE sc.course_id = ?
         ORDER BY u.name",
    )
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(CourseDetail {
        course,
        sessions,
        students,
    })
}

#[instrument]
pub async fn get_session(pool: &Pool<Sqlite>, session_id: i64) -> Result<CourseSession, AppError> {
    info!("Fetching session");
    let row = sqlx::query_as::<_, DbCourseSession>(&format!(
        "SELECT {} FROM sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    row.map(CourseSession::from)
        .ok_or_else(|| AppError::NotFound(format!("Session with id {} not found", session_id)))
}

#[instrument]
pub async fn create_session(
    pool: &Pool<Sqlite>,
    course_id: i64,
    title: &str,
    video_url: Option<&str>,
    material_url: Option<&str>,
) -> Result<CourseSession, AppError> {
    info!("Creating course session");
    let mut tx = pool.begin().await?;

    fetch_course(&mut tx, course_id).await?;

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE course_id = ?")
        .bind(course_id)
        .fetch_one(&mut *tx)
        .await?;

    let session_id = sqlx::query(
        "INSERT INTO sessions (course_id, title, order_number, video_url, material_url, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(course_id)
    .bind(title.trim())
    .bind(count + 1)
    .bind(video_url)
    .bind(material_url)
    .bind(Utc::now().naive_utc())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    sqlx::query("UPDATE courses SET total_sessions = total_sessions + 1 WHERE id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    get_session(pool, session_id).await
}

#[instrument]
pub async fn update_session(
    pool: &Pool<Sqlite>,
    session_id: i64,
    title: &str,
    video_url: Option<&str>,
    material_url: Option<&str>,
) -> Result<CourseSession, AppError> {
    info!("Updating course session");
    let result = sqlx::query(
        "UPDATE sessions SET title = ?, video_url = ?, material_url = ? WHERE id = ?",
    )
    .bind(title.trim())
    .bind(video_url)
    .bind(material_url)
    .bind(session_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Session with id {} not found",
            session_id
        )));
    }

    get_session(pool, session_id).await
}

#[instrument]
pub async fn set_session_flags(
    pool: &Pool<Sqlite>,
    session_id: i64,
    visible: Option<bool>,
    locked: Option<bool>,
) -> Result<CourseSession, AppError> {
    info!("Updating session visibility flags");
    let current = get_session(pool, session_id).await?;

    sqlx::query("UPDATE sessions SET visible = ?, locked = ? WHERE id = ?")
        .bind(visible.unwrap_or(current.visible))
        .bind(locked.unwrap_or(current.locked))
        .bind(session_id)
        .execute(pool)
        .await?;

    get_session(pool, session_id).await
}

/// Later sessions move up one place so order numbers stay contiguous.
#[instrument]
pub async fn delete_session(pool: &Pool<Sqlite>, session_id: i64) -> Result<(), AppError> {
    info!("Deleting course session");
    let mut tx = pool.begin().await?;

    let session: Option<(i64, i64)> =
        sqlx::query_as("SELECT course_id, order_number FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some((course_id, order_number)) = session else {
        return Err(AppError::NotFound(format!(
            "Session with id {} not found",
            session_id
        )));
    };

    sqlx::query("DELETE FROM student_sessions WHERE session_id = ?")
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE sessions SET order_number = order_number - 1
         WHERE course_id = ? AND order_number > ?",
    )
    .bind(course_id)
    .bind(order_number)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE courses SET total_sessions = MAX(total_sessions - 1, 0) WHERE id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

#[instrument]
pub async fn student_course_view(
    pool: &Pool<Sqlite>,
    student_id: i64,
    course_id: i64,
) -> Result<StudentCourseView, AppError> {
    info!("Building student view of course sessions");
    let mut conn = pool.acquire().await?;

    let course = fetch_course(&mut conn, course_id).await?;
    let Some(enrollment) = fetch_enrollment(&mut conn, student_id, course_id).await? else {
        return Err(AppError::Authorization(
            "Student is not enrolled in this course".to_string(),
        ));
    };

    let expired = current_balance(&mut conn, student_id)
        .await?
        .map(|s| s.balance().is_expired())
        .unwrap_or(true);

    if expired {
        return Ok(StudentCourseView {
            course,
            progress: enrollment.progress,
            sessions: Vec::new(),
            subscription_expired: true,
        });
    }

    let completed: Vec<(i64,)> = sqlx::query_as(
        "SELECT ss.session_id FROM student_sessions ss
         JOIN sessions s ON s.id = ss.session_id
         WHERE ss.student_id = ? AND s.course_id = ? AND ss.completed",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await?;

    let sessions = fetch_sessions(&mut conn, course_id)
        .await?
        .into_iter()
        .filter(|s| !enrollment.hide_new_sessions || s.order_number <= enrollment.progress + 1)
        .map(|session| StudentSessionView {
            available: session.is_available(),
            completed: completed.iter().any(|(id,)| *id == session.id),
            session,
        })
        .collect();

    Ok(StudentCourseView {
        course,
        progress: enrollment.progress,
        sessions,
        subscription_expired: false,
    })
}
