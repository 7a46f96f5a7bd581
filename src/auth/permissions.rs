use anyhow::Error;
use once_cell::sync::Lazy;
use rocket::serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnProfile,
    EditOwnProfile,
    ViewOwnCourses,
    CompleteSessions,
    ViewOwnNotifications,
    DownloadOwnCertificates,

    ManageCourses,
    ManageEnrollments,
    ManageGroups,
    ManageSubscriptions,
    AwardPoints,
    IssueCertificates,
    ViewAllStudents,
    RegisterUsers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Student,
    Admin,
}

static STUDENT_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnProfile);
    permissions.insert(Permission::EditOwnProfile);
    permissions.insert(Permission::ViewOwnCourses);
    permissions.insert(Permission::CompleteSessions);
    permissions.insert(Permission::ViewOwnNotifications);
    permissions.insert(Permission::DownloadOwnCertificates);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnProfile);
    permissions.insert(Permission::EditOwnProfile);

    permissions.insert(Permission::ManageCourses);
    permissions.insert(Permission::ManageEnrollments);
    permissions.insert(Permission::ManageGroups);
    permissions.insert(Permission::ManageSubscriptions);
    permissions.insert(Permission::AwardPoints);
    permissions.insert(Permission::IssueCertificates);
    permissions.insert(Permission::ViewAllStudents);
    permissions.insert(Permission::RegisterUsers);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Student => &STUDENT_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_student_cannot_manage() {
        let role = Role::Student;
        assert!(role.has_permission(Permission::ViewOwnCourses));
        assert!(!role.has_permission(Permission::ManageSubscriptions));
        assert!(!role.has_permission(Permission::IssueCertificates));
    }

    #[test]
    fn test_admin_manages_but_does_not_study() {
        let role = Role::Admin;
        assert!(role.has_permission(Permission::ManageGroups));
        assert!(role.has_permission(Permission::AwardPoints));
        assert!(!role.has_permission(Permission::CompleteSessions));
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
        assert_eq!(Role::Student.to_string(), "student");
        assert!(Role::from_str("coach").is_err());
    }
}
