use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use super::subscriptions::{current_balance, mirror_balance};
use crate::{
    error::AppError,
    ledger::Balance,
    models::{DbEnrollment, Enrollment, SubscriptionSummary},
};

const ENROLLMENT_SELECT: &str = "SELECT sc.id, sc.student_id, sc.course_id,
        c.title AS course_title, c.description AS course_description, c.total_sessions,
        sc.progress, sc.hide_new_sessions, sc.assigned_at, sc.completed_at
     FROM student_courses sc
     JOIN courses c ON c.id = sc.course_id";

#[derive(Debug, Serialize, Deserialize)]
pub struct StudentCourses {
    pub courses: Vec<Enrollment>,
    pub subscription_expired: bool,
    pub subscription: Option<SubscriptionSummary>,
}

pub(crate) async fn require_student(
    conn: &mut SqliteConnection,
    student_id: i64,
) -> Result<(), AppError> {
    let role: Option<(String,)> = sqlx::query_as("SELECT role FROM users WHERE id = ?")
        .bind(student_id)
        .fetch_optional(&mut *conn)
        .await?;

    match role {
        Some((role,)) if role == "student" => Ok(()),
        Some(_) => Err(AppError::Validation(format!(
            "User {} is not a student",
            student_id
        ))),
        None => Err(AppError::NotFound(format!(
            "Student with id {} not found",
            student_id
        ))),
    }
}

/// Creates the enrollment and gives it the student's current balance so the
/// global subscription stays single-valued.
pub(crate) async fn insert_enrollment(
    conn: &mut SqliteConnection,
    student_id: i64,
    course_id: i64,
    assigned_by: Option<i64>,
) -> Result<i64, AppError> {
    let course: Option<(i64,)> = sqlx::query_as("SELECT id FROM courses WHERE id = ?")
        .bind(course_id)
        .fetch_optional(&mut *conn)
        .await?;
    if course.is_none() {
        return Err(AppError::NotFound(format!(
            "Course with id {} not found",
            course_id
        )));
    }

    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM student_courses WHERE student_id = ? AND course_id = ?")
            .bind(student_id)
            .bind(course_id)
            .fetch_optional(&mut *conn)
            .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(
            "Student is already enrolled in this course".to_string(),
        ));
    }

    let balance = current_balance(&mut *conn, student_id)
        .await?
        .map(|s| s.balance())
        .unwrap_or_else(Balance::empty);

    let res = sqlx::query(
        "INSERT INTO student_courses (student_id, course_id, assigned_by, assigned_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(student_id)
    .bind(course_id)
    .bind(assigned_by)
    .bind(Utc::now().naive_utc())
    .execute(&mut *conn)
    .await?;

    mirror_balance(&mut *conn, student_id, balance).await?;

    Ok(res.last_insert_rowid())
}

pub(crate) async fn fetch_enrollment(
    conn: &mut SqliteConnection,
    student_id: i64,
    course_id: i64,
) -> Result<Option<Enrollment>, AppError> {
    let row = sqlx::query_as::<_, DbEnrollment>(&format!(
        "{} WHERE sc.student_id = ? AND sc.course_id = ?",
        ENROLLMENT_SELECT
    ))
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(Enrollment::from))
}

#[instrument]
pub async fn enroll_student(
    pool: &Pool<Sqlite>,
    unique_id: &str,
    course_id: i64,
    admin_id: i64,
) -> Result<Enrollment, AppError> {
    info!("Enrolling student in course");
    let mut tx = pool.begin().await?;

    let student: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM users WHERE unique_id = ? AND role = 'student'")
            .bind(unique_id.trim().to_uppercase())
            .fetch_optional(&mut *tx)
            .await?;
    let Some((student_id,)) = student else {
        return Err(AppError::NotFound(format!(
            "No student with id {}",
            unique_id
        )));
    };

    insert_enrollment(&mut tx, student_id, course_id, Some(admin_id)).await?;
    let enrollment = fetch_enrollment(&mut tx, student_id, course_id)
        .await?
        .ok_or_else(|| AppError::Internal("Enrollment vanished after insert".to_string()))?;

    tx.commit().await?;
    Ok(enrollment)
}

#[instrument]
pub async fn remove_student_from_course(
    pool: &Pool<Sqlite>,
    student_id: i64,
    course_id: i64,
) -> Result<(), AppError> {
    info!("Removing student from course");
    let mut tx = pool.begin().await?;

    let enrollment: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM student_courses WHERE student_id = ? AND course_id = ?")
            .bind(student_id)
            .bind(course_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some((enrollment_id,)) = enrollment else {
        return Err(AppError::NotFound(
            "Student is not enrolled in this course".to_string(),
        ));
    };

    sqlx::query(
        "DELETE FROM student_sessions
         WHERE student_id = ? AND session_id IN (SELECT id FROM sessions WHERE course_id = ?)",
    )
    .bind(student_id)
    .bind(course_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM course_group_students WHERE student_course_id = ?")
        .bind(enrollment_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM student_course_subscription WHERE student_course_id = ?")
        .bind(enrollment_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM student_courses WHERE id = ?")
        .bind(enrollment_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

#[instrument]
pub async fn list_student_courses(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<StudentCourses, AppError> {
    info!("Listing student courses");
    let mut conn = pool.acquire().await?;

    let subscription = current_balance(&mut conn, student_id).await?;
    let expired = subscription
        .as_ref()
        .map(|s| s.balance().is_expired())
        .unwrap_or(true);

    if expired {
        return Ok(StudentCourses {
            courses: Vec::new(),
            subscription_expired: true,
            subscription,
        });
    }

    let rows = sqlx::query_as::<_, DbEnrollment>(&format!(
        "{} WHERE sc.student_id = ? ORDER BY sc.assigned_at DESC, sc.id DESC",
        ENROLLMENT_SELECT
    ))
    .bind(student_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(StudentCourses {
        courses: rows.into_iter().map(Enrollment::from).collect(),
        subscription_expired: false,
        subscription,
    })
}

#[instrument]
pub async fn set_enrollment_pacing(
    pool: &Pool<Sqlite>,
    student_id: i64,
    course_id: i64,
    hide_new_sessions: bool,
) -> Result<Enrollment, AppError> {
    info!("Setting enrollment pacing");
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE student_courses SET hide_new_sessions = ? WHERE student_id = ? AND course_id = ?",
    )
    .bind(hide_new_sessions)
    .bind(student_id)
    .bind(course_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if updated == 0 {
        return Err(AppError::NotFound(
            "Student is not enrolled in this course".to_string(),
        ));
    }

    let enrollment = fetch_enrollment(&mut tx, student_id, course_id)
        .await?
        .ok_or_else(|| AppError::Internal("Enrollment vanished during update".to_string()))?;

    tx.commit().await?;
    Ok(enrollment)
}

/// Records a finished session. Progress does not draw on the subscription
/// balance, but an exhausted balance blocks it like it blocks the course view.
#[instrument]
pub async fn complete_session(
    pool: &Pool<Sqlite>,
    student_id: i64,
    session_id: i64,
) -> Result<Enrollment, AppError> {
    info!("Completing session");
    let mut tx = pool.begin().await?;

    let session: Option<(i64, i64, bool, bool)> = sqlx::query_as(
        "SELECT course_id, order_number, visible, locked FROM sessions WHERE id = ?",
    )
    .bind(session_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some((course_id, order_number, visible, locked)) = session else {
        return Err(AppError::NotFound(format!(
            "Session with id {} not found",
            session_id
        )));
    };

    let Some(enrollment) = fetch_enrollment(&mut tx, student_id, course_id).await? else {
        return Err(AppError::Authorization(
            "Student is not enrolled in this course".to_string(),
        ));
    };

    let expired = current_balance(&mut tx, student_id)
        .await?
        .map(|s| s.balance().is_expired())
        .unwrap_or(true);
    if expired {
        return Err(AppError::Validation(
            "Subscription has no sessions remaining".to_string(),
        ));
    }

    if !visible || locked {
        return Err(AppError::Validation(
            "Session is not available yet".to_string(),
        ));
    }

    if enrollment.hide_new_sessions && order_number > enrollment.progress + 1 {
        return Err(AppError::Validation(
            "Complete the earlier sessions first".to_string(),
        ));
    }

    let now = Utc::now().naive_utc();
    let inserted = sqlx::query(
        "INSERT INTO student_sessions (student_id, session_id, completed, completed_at)
         VALUES (?, ?, TRUE, ?)
         ON CONFLICT(student_id, session_id) DO NOTHING",
    )
    .bind(student_id)
    .bind(session_id)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 0 {
        info!("Session already completed; progress unchanged");
        tx.commit().await?;
        return Ok(enrollment);
    }

    sqlx::query(
        "UPDATE student_courses SET progress = progress + 1
         WHERE student_id = ? AND course_id = ?",
    )
    .bind(student_id)
    .bind(course_id)
    .execute(&mut *tx)
    .await?;

    let mut enrollment = fetch_enrollment(&mut tx, student_id, course_id)
        .await?
        .ok_or_else(|| AppError::Internal("Enrollment vanished during update".to_string()))?;

    if enrollment.is_completed() && enrollment.completed_at.is_none() {
        sqlx::query("UPDATE student_courses SET completed_at = ? WHERE id = ?")
            .bind(now)
            .bind(enrollment.id)
            .execute(&mut *tx)
            .await?;
        enrollment.completed_at = Some(now);
    }

    tx.commit().await?;
    Ok(enrollment)
}
