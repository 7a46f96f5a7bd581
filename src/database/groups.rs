use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use super::enrollments::{insert_enrollment, require_student};
use crate::{
    error::AppError,
    models::{CourseGroup, DbCourseGroup, DbGroupMember, DbStudentSummary, GroupMember, StudentSummary},
};

const GROUP_SELECT: &str = "SELECT g.id, g.title, g.course_id, c.title AS course_title, g.branch,
        g.start_date, g.created_by, g.allowed_admin_id,
        (SELECT COUNT(*) FROM course_group_students m WHERE m.group_id = g.id) AS member_count
     FROM course_groups g
     JOIN courses c ON c.id = g.course_id";

pub const STUDENT_SEARCH_LIMIT: i64 = 10;

#[derive(Debug)]
pub struct NewGroup<'a> {
    pub title: &'a str,
    pub course_id: i64,
    pub branch: Option<&'a str>,
    pub start_date: NaiveDate,
    pub allowed_admin_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupDetail {
    pub group: CourseGroup,
    pub members: Vec<GroupMember>,
}

pub(crate) async fn fetch_group(
    conn: &mut SqliteConnection,
    group_id: i64,
) -> Result<CourseGroup, AppError> {
    let row = sqlx::query_as::<_, DbCourseGroup>(&format!("{} WHERE g.id = ?", GROUP_SELECT))
        .bind(group_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(CourseGroup::from)
        .ok_or_else(|| AppError::NotFound(format!("Group with id {} not found", group_id)))
}

pub(crate) async fn is_member(
    conn: &mut SqliteConnection,
    group_id: i64,
    student_id: i64,
) -> Result<bool, AppError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT student_id FROM course_group_students WHERE group_id = ? AND student_id = ?",
    )
    .bind(group_id)
    .bind(student_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.is_some())
}

/// Only the creator and the co-admin may change a group.
pub fn require_group_manager(group: &CourseGroup, admin_id: i64) -> Result<(), AppError> {
    if group.is_managed_by(admin_id) {
        Ok(())
    } else {
        Err(AppError::Authorization(format!(
            "Admin {} does not manage group {}",
            admin_id, group.id
        )))
    }
}

#[instrument]
pub async fn create_group(
    pool: &Pool<Sqlite>,
    admin_id: i64,
    new_group: NewGroup<'_>,
) -> Result<CourseGroup, AppError> {
    info!("Creating course group");
    let mut tx = pool.begin().await?;

    let course: Option<(i64,)> = sqlx::query_as("SELECT id FROM courses WHERE id = ?")
        .bind(new_group.course_id)
        .fetch_optional(&mut *tx)
        .await?;
    if course.is_none() {
        return Err(AppError::NotFound(format!(
            "Course with id {} not found",
            new_group.course_id
        )));
    }

    if let Some(co_admin) = new_group.allowed_admin_id {
        let role: Option<(String,)> = sqlx::query_as("SELECT role FROM users WHERE id = ?")
            .bind(co_admin)
            .fetch_optional(&mut *tx)
            .await?;
        if !matches!(role, Some((ref r,)) if r == "admin") {
            return Err(AppError::Validation(format!(
                "User {} is not an admin",
                co_admin
            )));
        }
    }

    let group_id = sqlx::query(
        "INSERT INTO course_groups (title, course_id, branch, start_date, created_by, allowed_admin_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new_group.title.trim())
    .bind(new_group.course_id)
    .bind(new_group.branch)
    .bind(new_group.start_date)
    .bind(admin_id)
    .bind(new_group.allowed_admin_id)
    .bind(Utc::now().naive_utc())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let group = fetch_group(&mut tx, group_id).await?;
    tx.commit().await?;

    Ok(group)
}

#[instrument]
pub async fn get_group(pool: &Pool<Sqlite>, group_id: i64) -> Result<CourseGroup, AppError> {
    info!("Fetching group");
    let mut conn = pool.acquire().await?;
    fetch_group(&mut conn, group_id).await
}

#[instrument]
pub async fn list_managed_groups(
    pool: &Pool<Sqlite>,
    admin_id: i64,
) -> Result<Vec<CourseGroup>, AppError> {
    info!("Listing groups managed by admin");
    let rows = sqlx::query_as::<_, DbCourseGroup>(&format!(
        "{} WHERE g.created_by = ? OR g.allowed_admin_id = ? ORDER BY g.start_date DESC, g.id DESC",
        GROUP_SELECT
    ))
    .bind(admin_id)
    .bind(admin_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CourseGroup::from).collect())
}

#[instrument]
pub async fn list_group_members(
    pool: &Pool<Sqlite>,
    group_id: i64,
) -> Result<Vec<GroupMember>, AppError> {
    info!("Listing group members");
    let rows = sqlx::query_as::<_, DbGroupMember>(
        "SELECT u.id AS student_id, u.name, u.email, u.unique_id,
                COALESCE(p.points, 0) AS points,
                s.remaining_sessions, s.total_sessions, m.added_at
         FROM course_group_students m
         JOIN users u ON u.id = m.student_id
         LEFT JOIN student_group_points p ON p.group_id = m.group_id AND p.student_id = m.student_id
         LEFT JOIN student_course_subscription s ON s.student_course_id = m.student_course_id
         WHERE m.group_id = ?
         ORDER BY m.added_at, u.id",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(GroupMember::from).collect())
}

#[instrument]
pub async fn get_group_detail(pool: &Pool<Sqlite>, group_id: i64) -> Result<GroupDetail, AppError> {
    info!("Fetching group detail");
    let group = get_group(pool, group_id).await?;
    let members = list_group_members(pool, group_id).await?;
    Ok(GroupDetail { group, members })
}

#[instrument]
pub async fn search_students_for_group(
    pool: &Pool<Sqlite>,
    group_id: i64,
    query: &str,
) -> Result<Vec<StudentSummary>, AppError> {
    info!("Searching students to add to group");
    let pattern = format!("%{}%", query.trim().to_lowercase());

    let rows = sqlx::query_as::<_, DbStudentSummary>(
        "SELECT u.id, u.name, u.email, u.unique_id, u.phone, u.total_points
         FROM users u
         WHERE u.role = 'student'
           AND (LOWER(u.unique_id) LIKE ? OR LOWER(u.name) LIKE ? OR LOWER(u.email) LIKE ?)
           AND u.id NOT IN (SELECT student_id FROM course_group_students WHERE group_id = ?)
         ORDER BY u.name
         LIMIT ?",
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(group_id)
    .bind(STUDENT_SEARCH_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StudentSummary::from).collect())
}

#[instrument]
pub async fn add_student_to_group(
    pool: &Pool<Sqlite>,
    group_id: i64,
    student_id: i64,
    admin_id: i64,
) -> Result<(), AppError> {
    info!("Adding student to group");
    let mut tx = pool.begin().await?;

    let group = fetch_group(&mut tx, group_id).await?;
    require_student(&mut tx, student_id).await?;

    if is_member(&mut tx, group_id, student_id).await? {
        return Err(AppError::Conflict(
            "Student is already a member of this group".to_string(),
        ));
    }

    let enrollment: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM student_courses WHERE student_id = ? AND course_id = ?")
            .bind(student_id)
            .bind(group.course_id)
            .fetch_optional(&mut *tx)
            .await?;

    let student_course_id = match enrollment {
        Some((id,)) => id,
        None => {
            info!(course_id = group.course_id, "Enrolling student into group course");
            insert_enrollment(&mut tx, student_id, group.course_id, Some(admin_id)).await?
        }
    };

    sqlx::query(
        "INSERT INTO course_group_students (group_id, student_id, student_course_id, added_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(group_id)
    .bind(student_id)
    .bind(student_course_id)
    .bind(Utc::now().naive_utc())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[instrument]
pub async fn remove_student_from_group(
    pool: &Pool<Sqlite>,
    group_id: i64,
    student_id: i64,
) -> Result<(), AppError> {
    info!("Removing student from group");
    let result =
        sqlx::query("DELETE FROM course_group_students WHERE group_id = ? AND student_id = ?")
            .bind(group_id)
            .bind(student_id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Student is not a member of this group".to_string(),
        ));
    }

    Ok(())
}
