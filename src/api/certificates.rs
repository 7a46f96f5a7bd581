use chrono::NaiveDate;
use rocket::http::{ContentType, Header, RawStr, Status};
use rocket::response::{self, Responder, Response};
use rocket::serde::{Deserialize, json::Json};
use rocket::{Request, State};
use sqlx::{Pool, Sqlite};
use std::io::Cursor;
use validator::Validate;

use super::courses::SuccessResponse;
use crate::auth::{Permission, User};
use crate::certificate::{CertificateDocument, download_filename, render_pdf};
use crate::database::{
    IssueCertificate, get_student_certificate, issue_certificate, list_all_certificates,
    list_student_certificates, record_certificate_download, set_certificate_visibility,
};
use crate::models::StudentCertificate;
use crate::validation::{
    ApiError, AppErrorExt, JsonValidateExt, PermissionCheckExt, ToValidationResponse,
    UNIQUE_ID_PATTERN,
};

#[derive(Deserialize, Validate)]
pub struct IssueCertificateRequest {
    #[validate(regex(path = *UNIQUE_ID_PATTERN, message = "Student ID must look like ACD-XXXXXX"))]
    student_unique_id: String,
    #[validate(length(min = 1, message = "Student name is required"))]
    student_name: String,
    #[validate(length(min = 1, message = "Course name is required"))]
    course_name: String,
    #[validate(length(min = 1, message = "Description is required"))]
    description: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Deserialize)]
pub struct VisibilityRequest {
    visible: bool,
}

pub struct PdfDownload {
    filename: String,
    bytes: Vec<u8>,
}

impl PdfDownload {
    // Plain ASCII fallback for old clients, RFC 6266 `filename*` for the real name.
    fn content_disposition(&self) -> String {
        let ascii: String = self
            .filename
            .chars()
            .map(|c| if c.is_ascii() { c } else { '_' })
            .collect();
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            ascii,
            RawStr::new(&self.filename).percent_encode()
        )
    }
}

impl<'r> Responder<'r, 'static> for PdfDownload {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        Response::build()
            .header(ContentType::PDF)
            .header(Header::new(
                "Content-Disposition",
                self.content_disposition(),
            ))
            .sized_body(self.bytes.len(), Cursor::new(self.bytes))
            .ok()
    }
}

#[post("/certificates", data = "<request>")]
pub async fn api_issue_certificate(
    user: User,
    request: Json<IssueCertificateRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<StudentCertificate>, ApiError> {
    user.require_permission(Permission::IssueCertificates)
        .validate_custom()?;
    let req = request.validate_custom()?;

    let certificate = issue_certificate(
        db,
        IssueCertificate {
            student_unique_id: &req.student_unique_id,
            student_name: &req.student_name,
            course_name: &req.course_name,
            description: &req.description,
            start_date: req.start_date,
            end_date: req.end_date,
        },
    )
    .await
    .validate_custom()?;
    Ok(Json(certificate))
}

#[get("/certificates")]
pub async fn api_list_certificates(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<StudentCertificate>>, ApiError> {
    user.require_permission(Permission::IssueCertificates)
        .validate_custom()?;
    Ok(Json(list_all_certificates(db).await.validate_custom()?))
}

#[get("/my/certificates")]
pub async fn api_my_certificates(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<StudentCertificate>>, ApiError> {
    user.require_permission(Permission::DownloadOwnCertificates)
        .validate_custom()?;
    Ok(Json(
        list_student_certificates(db, &user.unique_id)
            .await
            .validate_custom()?,
    ))
}

#[put("/certificates/<id>/visibility", data = "<request>")]
pub async fn api_set_certificate_visibility(
    id: i64,
    user: User,
    request: Json<VisibilityRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SuccessResponse>, ApiError> {
    user.require_permission(Permission::IssueCertificates)
        .validate_custom()?;
    set_certificate_visibility(db, id, request.visible)
        .await
        .validate_custom()?;
    Ok(Json(SuccessResponse { success: true }))
}

#[get("/certificates/<public_id>/pdf")]
pub async fn api_download_certificate(
    public_id: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<PdfDownload, ApiError> {
    let certificate = get_student_certificate(db, public_id)
        .await
        .validate_custom()?;

    if !user.is_admin() {
        user.require_permission(Permission::DownloadOwnCertificates)
            .validate_custom()?;
        if user.unique_id != certificate.student_unique_id {
            return Err(Status::Forbidden.to_validation_response());
        }
        if !certificate.is_visible {
            return Err(Status::NotFound.to_validation_response());
        }
    }

    let award_date = certificate
        .certificate_date
        .unwrap_or_else(|| chrono::Utc::now().date_naive());
    let bytes = render_pdf(&CertificateDocument {
        student_name: &certificate.student_name,
        course_name: &certificate.course_name,
        certificate_text: &certificate.certificate_text,
        award_date,
        public_id: &certificate.public_id,
    })
    .validate_custom()?;

    record_certificate_download(db, public_id)
        .await
        .validate_custom()?;

    Ok(PdfDownload {
        filename: download_filename(&certificate.student_name, &certificate.course_name),
        bytes,
    })
}
