use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ledger::{Balance, SubscriptionStatus};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub total_sessions: i64,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCourse {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub total_sessions: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbCourse> for Course {
    fn from(course: DbCourse) -> Self {
        Self {
            id: course.id.unwrap_or_default(),
            title: course.title.unwrap_or_default(),
            description: course.description,
            total_sessions: course.total_sessions.unwrap_or_default(),
            created_at: course.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CourseSession {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub order_number: i64,
    pub video_url: Option<String>,
    pub material_url: Option<String>,
    pub visible: bool,
    pub locked: bool,
}

impl CourseSession {
    /// A student can open a session only when it is published and has a video.
    pub fn is_available(&self) -> bool {
        self.visible
            && !self.locked
            && self
                .video_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty())
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCourseSession {
    pub id: Option<i64>,
    pub course_id: Option<i64>,
    pub title: Option<String>,
    pub order_number: Option<i64>,
    pub video_url: Option<String>,
    pub material_url: Option<String>,
    pub visible: Option<bool>,
    pub locked: Option<bool>,
}

impl From<DbCourseSession> for CourseSession {
    fn from(session: DbCourseSession) -> Self {
        Self {
            id: session.id.unwrap_or_default(),
            course_id: session.course_id.unwrap_or_default(),
            title: session.title.unwrap_or_default(),
            order_number: session.order_number.unwrap_or_default(),
            video_url: session.video_url,
            material_url: session.material_url,
            visible: session.visible.unwrap_or(true),
            locked: session.locked.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub course_title: String,
    pub course_description: Option<String>,
    pub total_sessions: i64,
    pub progress: i64,
    pub hide_new_sessions: bool,
    pub assigned_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

impl Enrollment {
    pub fn is_completed(&self) -> bool {
        self.total_sessions > 0 && self.progress >= self.total_sessions
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbEnrollment {
    pub id: Option<i64>,
    pub student_id: Option<i64>,
    pub course_id: Option<i64>,
    pub course_title: Option<String>,
    pub course_description: Option<String>,
    pub total_sessions: Option<i64>,
    pub progress: Option<i64>,
    pub hide_new_sessions: Option<bool>,
    pub assigned_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

impl From<DbEnrollment> for Enrollment {
    fn from(e: DbEnrollment) -> Self {
        Self {
            id: e.id.unwrap_or_default(),
            student_id: e.student_id.unwrap_or_default(),
            course_id: e.course_id.unwrap_or_default(),
            course_title: e.course_title.unwrap_or_default(),
            course_description: e.course_description,
            total_sessions: e.total_sessions.unwrap_or_default(),
            progress: e.progress.unwrap_or_default(),
            hide_new_sessions: e.hide_new_sessions.unwrap_or_default(),
            assigned_at: e.assigned_at,
            completed_at: e.completed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StudentSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub unique_id: String,
    pub phone: Option<String>,
    pub total_points: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbStudentSummary {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub unique_id: Option<String>,
    pub phone: Option<String>,
    pub total_points: Option<i64>,
}

impl From<DbStudentSummary> for StudentSummary {
    fn from(s: DbStudentSummary) -> Self {
        Self {
            id: s.id.unwrap_or_default(),
            name: s.name.unwrap_or_default(),
            email: s.email.unwrap_or_default(),
            unique_id: s.unique_id.unwrap_or_default(),
            phone: s.phone,
            total_points: s.total_points.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubscriptionSummary {
    pub total_sessions: i64,
    pub remaining_sessions: i64,
    pub plan_duration_months: i64,
    pub warning: bool,
    pub status: SubscriptionStatus,
    pub used_sessions: i64,
    pub progress_percent: f64,
    pub updated_at: Option<NaiveDateTime>,
}

impl SubscriptionSummary {
    pub fn new(balance: Balance, updated_at: Option<NaiveDateTime>) -> Self {
        Self {
            total_sessions: balance.total_sessions,
            remaining_sessions: balance.remaining_sessions,
            plan_duration_months: balance.plan_duration_months,
            warning: balance.warning,
            status: balance.status(),
            used_sessions: balance.used_sessions(),
            progress_percent: balance.progress_percent(),
            updated_at,
        }
    }

    pub fn balance(&self) -> Balance {
        Balance {
            total_sessions: self.total_sessions,
            remaining_sessions: self.remaining_sessions,
            plan_duration_months: self.plan_duration_months,
            warning: self.warning,
        }
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSubscription {
    pub total_sessions: Option<i64>,
    pub remaining_sessions: Option<i64>,
    pub plan_duration_months: Option<i64>,
    pub warning: Option<bool>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbSubscription> for SubscriptionSummary {
    fn from(s: DbSubscription) -> Self {
        let balance = Balance {
            total_sessions: s.total_sessions.unwrap_or_default(),
            remaining_sessions: s.remaining_sessions.unwrap_or_default(),
            plan_duration_months: s.plan_duration_months.unwrap_or(1),
            warning: s.warning.unwrap_or_default(),
        };
        SubscriptionSummary::new(balance, s.updated_at)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LowSessionAlert {
    pub student_id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub unique_id: String,
    pub total_sessions: i64,
    pub remaining_sessions: i64,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbLowSessionAlert {
    pub student_id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub unique_id: Option<String>,
    pub total_sessions: Option<i64>,
    pub remaining_sessions: Option<i64>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbLowSessionAlert> for LowSessionAlert {
    fn from(a: DbLowSessionAlert) -> Self {
        Self {
            student_id: a.student_id.unwrap_or_default(),
            name: a.name.unwrap_or_default(),
            email: a.email.unwrap_or_default(),
            phone: a.phone,
            unique_id: a.unique_id.unwrap_or_default(),
            total_sessions: a.total_sessions.unwrap_or_default(),
            remaining_sessions: a.remaining_sessions.unwrap_or_default(),
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CourseGroup {
    pub id: i64,
    pub title: String,
    pub course_id: i64,
    pub course_title: String,
    pub branch: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub created_by: i64,
    pub allowed_admin_id: Option<i64>,
    pub member_count: i64,
}

impl CourseGroup {
    pub fn is_managed_by(&self, admin_id: i64) -> bool {
        self.created_by == admin_id || self.allowed_admin_id == Some(admin_id)
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCourseGroup {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub course_id: Option<i64>,
    pub course_title: Option<String>,
    pub branch: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub created_by: Option<i64>,
    pub allowed_admin_id: Option<i64>,
    pub member_count: Option<i64>,
}

impl From<DbCourseGroup> for CourseGroup {
    fn from(g: DbCourseGroup) -> Self {
        Self {
            id: g.id.unwrap_or_default(),
            title: g.title.unwrap_or_default(),
            course_id: g.course_id.unwrap_or_default(),
            course_title: g.course_title.unwrap_or_default(),
            branch: g.branch,
            start_date: g.start_date,
            created_by: g.created_by.unwrap_or_default(),
            allowed_admin_id: g.allowed_admin_id,
            member_count: g.member_count.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroupMember {
    pub student_id: i64,
    pub name: String,
    pub email: String,
    pub unique_id: String,
    pub points: i64,
    pub remaining_sessions: Option<i64>,
    pub total_sessions: Option<i64>,
    pub added_at: Option<NaiveDateTime>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbGroupMember {
    pub student_id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub unique_id: Option<String>,
    pub points: Option<i64>,
    pub remaining_sessions: Option<i64>,
    pub total_sessions: Option<i64>,
    pub added_at: Option<NaiveDateTime>,
}

impl From<DbGroupMember> for GroupMember {
    fn from(m: DbGroupMember) -> Self {
        Self {
            student_id: m.student_id.unwrap_or_default(),
            name: m.name.unwrap_or_default(),
            email: m.email.unwrap_or_default(),
            unique_id: m.unique_id.unwrap_or_default(),
            points: m.points.unwrap_or_default(),
            remaining_sessions: m.remaining_sessions,
            total_sessions: m.total_sessions,
            added_at: m.added_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    SubscriptionChange,
    SessionUpdate,
    SessionRefill,
    SessionRemoval,
    CertificateIssued,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::SubscriptionChange => "subscription_change",
            NotificationKind::SessionUpdate => "session_update",
            NotificationKind::SessionRefill => "session_refill",
            NotificationKind::SessionRemoval => "session_removal",
            NotificationKind::CertificateIssued => "certificate_issued",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub created_at: Option<NaiveDateTime>,
    pub read_at: Option<NaiveDateTime>,
    pub is_read: bool,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbNotification {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub notification_type: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub read_at: Option<NaiveDateTime>,
}

impl From<DbNotification> for Notification {
    fn from(n: DbNotification) -> Self {
        Self {
            id: n.id.unwrap_or_default(),
            title: n.title.unwrap_or_default(),
            message: n.message.unwrap_or_default(),
            notification_type: n.notification_type.unwrap_or_default(),
            created_at: n.created_at,
            is_read: n.read_at.is_some(),
            read_at: n.read_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StudentCertificate {
    pub id: i64,
    pub public_id: String,
    pub display_id: String,
    pub certificate_id: i64,
    pub student_unique_id: String,
    pub student_name: String,
    pub course_name: String,
    pub certificate_text: String,
    pub certificate_date: Option<NaiveDate>,
    pub is_visible: bool,
    pub download_count: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbStudentCertificate {
    pub id: Option<i64>,
    pub public_id: Option<String>,
    pub certificate_id: Option<i64>,
    pub student_unique_id: Option<String>,
    pub student_name: Option<String>,
    pub course_name: Option<String>,
    pub certificate_text: Option<String>,
    pub certificate_date: Option<NaiveDate>,
    pub is_visible: Option<bool>,
    pub download_count: Option<i64>,
}

impl From<DbStudentCertificate> for StudentCertificate {
    fn from(c: DbStudentCertificate) -> Self {
        let public_id = c.public_id.unwrap_or_default();
        Self {
            id: c.id.unwrap_or_default(),
            display_id: crate::certificate::display_id(&public_id),
            public_id,
            certificate_id: c.certificate_id.unwrap_or_default(),
            student_unique_id: c.student_unique_id.unwrap_or_default(),
            student_name: c.student_name.unwrap_or_default(),
            course_name: c.course_name.unwrap_or_default(),
            certificate_text: c.certificate_text.unwrap_or_default(),
            certificate_date: c.certificate_date,
            is_visible: c.is_visible.unwrap_or(true),
            download_count: c.download_count.unwrap_or_default(),
        }
    }
}
