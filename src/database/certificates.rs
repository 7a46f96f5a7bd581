use chrono::{NaiveDate, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};
use uuid::Uuid;

use super::notifications::insert_notification;
use crate::{
    certificate::{certificate_text, encode_win_ansi},
    error::AppError,
    models::{DbStudentCertificate, NotificationKind, StudentCertificate},
};

const CERTIFICATE_SELECT: &str = "SELECT sc.id, sc.public_id, sc.certificate_id, sc.student_unique_id,
        sc.student_name, c.course_name, c.certificate_text, c.certificate_date, c.is_visible,
        sc.download_count
     FROM student_certificates sc
     JOIN certificates c ON c.id = sc.certificate_id";

#[derive(Debug)]
pub struct IssueCertificate<'a> {
    pub student_unique_id: &'a str,
    pub student_name: &'a str,
    pub course_name: &'a str,
    pub description: &'a str,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[instrument]
pub async fn issue_certificate(
    pool: &Pool<Sqlite>,
    issue: IssueCertificate<'_>,
) -> Result<StudentCertificate, AppError> {
    info!("Issuing certificate");
    if issue.end_date < issue.start_date {
        return Err(AppError::Validation(
            "End date must not be before start date".to_string(),
        ));
    }

    let unique_id = issue.student_unique_id.trim().to_uppercase();
    let text = certificate_text(
        issue.course_name.trim(),
        issue.description.trim(),
        issue.start_date,
        issue.end_date,
    );
    encode_win_ansi(issue.student_name.trim())?;
    encode_win_ansi(&text)?;
    let public_id = Uuid::new_v4().to_string();

    let mut tx = pool.begin().await?;

    let certificate_id = sqlx::query(
        "INSERT INTO certificates (course_name, certificate_text, certificate_date, is_visible, created_at)
         VALUES (?, ?, ?, TRUE, ?)",
    )
    .bind(issue.course_name.trim())
    .bind(&text)
    .bind(Utc::now().date_naive())
    .bind(Utc::now().naive_utc())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    sqlx::query(
        "INSERT INTO student_certificates
            (public_id, certificate_id, student_unique_id, student_name, download_count, created_at)
         VALUES (?, ?, ?, ?, 0, ?)",
    )
    .bind(&public_id)
    .bind(certificate_id)
    .bind(&unique_id)
    .bind(issue.student_name.trim())
    .bind(Utc::now().naive_utc())
    .execute(&mut *tx)
    .await?;

    let student: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM users WHERE unique_id = ? AND role = 'student'")
            .bind(&unique_id)
            .fetch_optional(&mut *tx)
            .await?;

    if let Some((student_id,)) = student {
        insert_notification(
            &mut tx,
            student_id,
            NotificationKind::CertificateIssued,
            "New Certificate Issued",
            &format!(
                "Congratulations! You have received a certificate for the {} course.",
                issue.course_name.trim()
            ),
        )
        .await?;
    } else {
        info!(unique_id = %unique_id, "No student account for certificate; skipping notification");
    }

    tx.commit().await?;

    get_student_certificate(pool, &public_id).await
}

#[instrument]
pub async fn list_student_certificates(
    pool: &Pool<Sqlite>,
    student_unique_id: &str,
) -> Result<Vec<StudentCertificate>, AppError> {
    info!("Listing student certificates");
    let rows = sqlx::query_as::<_, DbStudentCertificate>(&format!(
        "{} WHERE sc.student_unique_id = ? AND c.is_visible ORDER BY c.certificate_date DESC, sc.id DESC",
        CERTIFICATE_SELECT
    ))
    .bind(student_unique_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StudentCertificate::from).collect())
}

#[instrument]
pub async fn list_all_certificates(pool: &Pool<Sqlite>) -> Result<Vec<StudentCertificate>, AppError> {
    info!("Listing all issued certificates");
    let rows = sqlx::query_as::<_, DbStudentCertificate>(&format!(
        "{} ORDER BY sc.created_at DESC, sc.id DESC",
        CERTIFICATE_SELECT
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StudentCertificate::from).collect())
}

#[instrument]
pub async fn get_student_certificate(
    pool: &Pool<Sqlite>,
    public_id: &str,
) -> Result<StudentCertificate, AppError> {
    info!("Fetching student certificate");
    let row = sqlx::query_as::<_, DbStudentCertificate>(&format!(
        "{} WHERE sc.public_id = ?",
        CERTIFICATE_SELECT
    ))
    .bind(public_id)
    .fetch_optional(pool)
    .await?;

    row.map(StudentCertificate::from)
        .ok_or_else(|| AppError::NotFound(format!("Certificate {} not found", public_id)))
}

#[instrument]
pub async fn set_certificate_visibility(
    pool: &Pool<Sqlite>,
    certificate_id: i64,
    visible: bool,
) -> Result<(), AppError> {
    info!("Changing certificate visibility");
    let result = sqlx::query("UPDATE certificates SET is_visible = ? WHERE id = ?")
        .bind(visible)
        .bind(certificate_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Certificate with id {} not found",
            certificate_id
        )));
    }

    Ok(())
}

#[instrument]
pub async fn record_certificate_download(
    pool: &Pool<Sqlite>,
    public_id: &str,
) -> Result<i64, AppError> {
    info!("Recording certificate download");
    let result = sqlx::query(
        "UPDATE student_certificates SET download_count = download_count + 1 WHERE public_id = ?",
    )
    .bind(public_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Certificate {} not found", public_id)));
    }

    let (count,): (i64,) =
        sqlx::query_as("SELECT download_count FROM student_certificates WHERE public_id = ?")
            .bind(public_id)
            .fetch_one(pool)
            .await?;

    Ok(count)
}
