use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use super::enrollments::{insert_enrollment, require_student};
use super::notifications::insert_notification;
use crate::{
    error::AppError,
    ledger::{Adjustment, Balance, LOW_SESSION_THRESHOLD},
    models::{DbLowSessionAlert, DbSubscription, LowSessionAlert, NotificationKind, SubscriptionSummary},
};

fn plural(n: i64) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// The canonical balance is the most recently written row across the
/// student's enrollments.
pub(crate) async fn current_balance(
    conn: &mut SqliteConnection,
    student_id: i64,
) -> Result<Option<SubscriptionSummary>, AppError> {
    let row = sqlx::query_as::<_, DbSubscription>(
        "SELECT s.total_sessions, s.remaining_sessions, s.plan_duration_months, s.warning, s.updated_at
         FROM student_course_subscription s
         JOIN student_courses sc ON sc.id = s.student_course_id
         WHERE sc.student_id = ?
         ORDER BY s.updated_at DESC, s.id DESC
         LIMIT 1",
    )
    .bind(student_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(SubscriptionSummary::from))
}

/// Writes one balance to every enrollment of the student.
///
/// `hide_new_sessions` is raised on every enrollment when the balance runs out
/// and lowered again only when it comes back from zero, so a flag an admin set
/// on an active balance survives ordinary adjustments.
pub(crate) async fn mirror_balance(
    conn: &mut SqliteConnection,
    student_id: i64,
    balance: Balance,
) -> Result<u64, AppError> {
    let now = Utc::now().naive_utc();
    let was_exhausted = current_balance(&mut *conn, student_id)
        .await?
        .map(|s| s.balance().is_expired())
        .unwrap_or(true);

    let written = sqlx::query(
        "INSERT INTO student_course_subscription
            (student_course_id, total_sessions, remaining_sessions, plan_duration_months, warning, created_at, updated_at)
         SELECT id, ?, ?, ?, ?, ?, ? FROM student_courses WHERE student_id = ?
         ON CONFLICT(student_course_id) DO UPDATE SET
            total_sessions = excluded.total_sessions,
            remaining_sessions = excluded.remaining_sessions,
            plan_duration_months = excluded.plan_duration_months,
            warning = excluded.warning,
            updated_at = excluded.updated_at",
    )
    .bind(balance.total_sessions)
    .bind(balance.remaining_sessions)
    .bind(balance.plan_duration_months)
    .bind(balance.warning)
    .bind(now)
    .bind(now)
    .bind(student_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let hide = if balance.is_expired() {
        Some(true)
    } else if was_exhausted {
        Some(false)
    } else {
        None
    };
    if let Some(hide) = hide {
        sqlx::query("UPDATE student_courses SET hide_new_sessions = ? WHERE student_id = ?")
            .bind(hide)
            .bind(student_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(written)
}

async fn enrollment_count(conn: &mut SqliteConnection, student_id: i64) -> Result<i64, AppError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM student_courses WHERE student_id = ?")
        .bind(student_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

#[instrument]
pub async fn get_global_subscription(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<Option<SubscriptionSummary>, AppError> {
    info!("Fetching global subscription");
    let mut conn = pool.acquire().await?;
    current_balance(&mut conn, student_id).await
}

#[instrument]
pub async fn create_global_subscription(
    pool: &Pool<Sqlite>,
    student_id: i64,
    months: i64,
    admin_id: i64,
) -> Result<SubscriptionSummary, AppError> {
    info!("Creating global subscription");
    let balance = Balance::for_plan(months)?;

    let mut tx = pool.begin().await?;
    require_student(&mut tx, student_id).await?;

    let existing = current_balance(&mut tx, student_id).await?;
    if existing.is_some_and(|s| s.total_sessions > 0) {
        return Err(AppError::Conflict(
            "Student already has a global subscription".to_string(),
        ));
    }

    if enrollment_count(&mut tx, student_id).await? == 0 {
        let first_course: Option<(i64,)> = sqlx::query_as("SELECT id FROM courses ORDER BY id LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
        let Some((course_id,)) = first_course else {
            return Err(AppError::NotFound(
                "No courses exist to attach the subscription to".to_string(),
            ));
        };
        info!(course_id, "Enrolling student into first course for subscription");
        insert_enrollment(&mut tx, student_id, course_id, Some(admin_id)).await?;
    }

    mirror_balance(&mut tx, student_id, balance).await?;

    insert_notification(
        &mut tx,
        student_id,
        NotificationKind::SubscriptionChange,
        "Subscription Created",
        &format!(
            "A new {}-month subscription with {} sessions has been created for you.",
            months, balance.total_sessions
        ),
    )
    .await?;

    tx.commit().await?;

    Ok(SubscriptionSummary::new(balance, Some(Utc::now().naive_utc())))
}

#[instrument]
pub async fn adjust_sessions(
    pool: &Pool<Sqlite>,
    student_id: i64,
    adjustment: Adjustment,
    sessions: i64,
    group_title: Option<&str>,
) -> Result<SubscriptionSummary, AppError> {
    info!("Adjusting global subscription sessions");
    let mut tx = pool.begin().await?;
    require_student(&mut tx, student_id).await?;

    if enrollment_count(&mut tx, student_id).await? == 0 {
        return Err(AppError::NotFound(
            "Student has no course enrollments to hold a subscription".to_string(),
        ));
    }

    let current = current_balance(&mut tx, student_id)
        .await?
        .map(|s| s.balance())
        .unwrap_or_else(Balance::empty);
    let updated = current.apply(adjustment, sessions)?;

    mirror_balance(&mut tx, student_id, updated).await?;

    let (title, verb) = match adjustment {
        Adjustment::Add => ("Sessions Added", "added to"),
        Adjustment::Remove => ("Sessions Removed", "removed from"),
    };
    let group_note = group_title
        .map(|g| format!(" for group {}", g))
        .unwrap_or_default();

    insert_notification(
        &mut tx,
        student_id,
        NotificationKind::SessionUpdate,
        title,
        &format!(
            "{} session{} {} your subscription{}. You now have {} sessions remaining.",
            sessions,
            plural(sessions),
            verb,
            group_note,
            updated.remaining_sessions
        ),
    )
    .await?;

    tx.commit().await?;

    Ok(SubscriptionSummary::new(updated, Some(Utc::now().naive_utc())))
}

#[instrument]
pub async fn refill_sessions(
    pool: &Pool<Sqlite>,
    student_id: i64,
    sessions: i64,
) -> Result<SubscriptionSummary, AppError> {
    info!("Refilling global subscription");
    let mut tx = pool.begin().await?;
    require_student(&mut tx, student_id).await?;

    if enrollment_count(&mut tx, student_id).await? == 0 {
        return Err(AppError::NotFound(
            "Student has no course enrollments to hold a subscription".to_string(),
        ));
    }

    let current = current_balance(&mut tx, student_id)
        .await?
        .map(|s| s.balance())
        .unwrap_or_else(Balance::empty);
    let updated = current.add(sessions)?;

    mirror_balance(&mut tx, student_id, updated).await?;

    insert_notification(
        &mut tx,
        student_id,
        NotificationKind::SessionRefill,
        "Sessions Added to Your Subscription",
        &format!(
            "Admin refilled your subscription with {} session{} on {}. You now have {} sessions remaining.",
            sessions,
            plural(sessions),
            Utc::now().format("%Y-%m-%d"),
            updated.remaining_sessions
        ),
    )
    .await?;

    tx.commit().await?;

    Ok(SubscriptionSummary::new(updated, Some(Utc::now().naive_utc())))
}

#[instrument]
pub async fn consume_session(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<SubscriptionSummary, AppError> {
    info!("Consuming one subscription session");
    let mut tx = pool.begin().await?;
    require_student(&mut tx, student_id).await?;

    let Some(current) = current_balance(&mut tx, student_id).await? else {
        return Err(AppError::NotFound(
            "Student has no global subscription".to_string(),
        ));
    };
    let updated = current.balance().consume_one()?;

    mirror_balance(&mut tx, student_id, updated).await?;

    insert_notification(
        &mut tx,
        student_id,
        NotificationKind::SessionRemoval,
        "Session Removed from Your Subscription",
        &format!(
            "Admin removed one session from your subscription on {}. You now have {} sessions remaining.",
            Utc::now().format("%Y-%m-%d"),
            updated.remaining_sessions
        ),
    )
    .await?;

    tx.commit().await?;

    Ok(SubscriptionSummary::new(updated, Some(Utc::now().naive_utc())))
}

#[instrument]
pub async fn reconcile_subscription(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<Option<SubscriptionSummary>, AppError> {
    info!("Reconciling subscription rows");
    let mut tx = pool.begin().await?;

    let Some(current) = current_balance(&mut tx, student_id).await? else {
        warn!("Student has no subscription rows to reconcile");
        return Ok(None);
    };

    let written = mirror_balance(&mut tx, student_id, current.balance()).await?;
    tx.commit().await?;

    info!(rows = written, "Subscription rows reconciled");
    let mut conn = pool.acquire().await?;
    current_balance(&mut conn, student_id).await
}

#[instrument]
pub async fn low_session_alerts(pool: &Pool<Sqlite>) -> Result<Vec<LowSessionAlert>, AppError> {
    info!("Listing students with low remaining sessions");
    let rows = sqlx::query_as::<_, DbLowSessionAlert>(
        "WITH latest AS (
            SELECT sc.student_id, s.total_sessions, s.remaining_sessions, s.updated_at,
                   ROW_NUMBER() OVER (
                       PARTITION BY sc.student_id ORDER BY s.updated_at DESC, s.id DESC
                   ) AS rn
            FROM student_course_subscription s
            JOIN student_courses sc ON sc.id = s.student_course_id
         )
         SELECT u.id AS student_id, u.name, u.email, u.phone, u.unique_id,
                l.total_sessions, l.remaining_sessions, l.updated_at
         FROM latest l
         JOIN users u ON u.id = l.student_id
         WHERE l.rn = 1 AND l.remaining_sessions <= ?
         ORDER BY l.updated_at DESC",
    )
    .bind(LOW_SESSION_THRESHOLD)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(LowSessionAlert::from).collect())
}
