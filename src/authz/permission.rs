//! The fixed, versioned permission catalogue.
//!
//! Permissions are never user-defined at runtime; adding one is a code change
//! consumed identically by request gating and UI-surface filtering.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum Permission {
    UsersManage,
    UsersView,
    ClassesManage,
    ClassesView,
    SubjectsManage,
    AttendanceMark,
    AttendanceView,
    GradesManage,
    GradesView,
    ExamsManage,
    InvoicesManage,
    InvoicesView,
    ReportsView,
    DepartmentsManage,
    SettingsBranding,
    AuditView,
    OverridesManage,
    TenantsManage,
}

impl Permission {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UsersManage => "users:manage",
            Self::UsersView => "users:view",
            Self::ClassesManage => "classes:manage",
            Self::ClassesView => "classes:view",
            Self::SubjectsManage => "subjects:manage",
            Self::AttendanceMark => "attendance:mark",
            Self::AttendanceView => "attendance:view",
            Self::GradesManage => "grades:manage",
            Self::GradesView => "grades:view",
            Self::ExamsManage => "exams:manage",
            Self::InvoicesManage => "invoices:manage",
            Self::InvoicesView => "invoices:view",
            Self::ReportsView => "reports:view",
            Self::DepartmentsManage => "departments:manage",
            Self::SettingsBranding => "settings:branding",
            Self::AuditView => "audit:view",
            Self::OverridesManage => "overrides:manage",
            Self::TenantsManage => "tenants:manage",
        }
    }

    /// Looks a tag up in the catalogue. Unknown tags return `None`, which
    /// every caller must treat as "denied", never as an error.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "users:manage" => Self::UsersManage,
            "users:view" => Self::UsersView,
            "classes:manage" => Self::ClassesManage,
            "classes:view" => Self::ClassesView,
            "subjects:manage" => Self::SubjectsManage,
            "attendance:mark" => Self::AttendanceMark,
            "attendance:view" => Self::AttendanceView,
            "grades:manage" => Self::GradesManage,
            "grades:view" => Self::GradesView,
            "exams:manage" => Self::ExamsManage,
            "invoices:manage" => Self::InvoicesManage,
            "invoices:view" => Self::InvoicesView,
            "reports:view" => Self::ReportsView,
            "departments:manage" => Self::DepartmentsManage,
            "settings:branding" => Self::SettingsBranding,
            "audit:view" => Self::AuditView,
            "overrides:manage" => Self::OverridesManage,
            "tenants:manage" => Self::TenantsManage,
            _ => return None,
        })
    }
}

impl From<Permission> for &'static str {
    fn from(permission: Permission) -> Self {
        permission.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Permission; 18] = [
        Permission::UsersManage,
        Permission::UsersView,
        Permission::ClassesManage,
        Permission::ClassesView,
        Permission::SubjectsManage,
        Permission::AttendanceMark,
        Permission::AttendanceView,
        Permission::GradesManage,
        Permission::GradesView,
        Permission::ExamsManage,
        Permission::InvoicesManage,
        Permission::InvoicesView,
        Permission::ReportsView,
        Permission::DepartmentsManage,
        Permission::SettingsBranding,
        Permission::AuditView,
        Permission::OverridesManage,
        Permission::TenantsManage,
    ];

    #[test]
    fn tags_round_trip() {
        for permission in ALL {
            assert_eq!(Permission::parse(permission.as_str()), Some(permission));
        }
    }

    #[test]
    fn unknown_tags_are_none() {
        assert_eq!(Permission::parse("grades:delete"), None);
        assert_eq!(Permission::parse(""), None);
        assert_eq!(Permission::parse("users:manage "), None);
    }
}
