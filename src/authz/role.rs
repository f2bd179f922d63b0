//! Role and role-grant definitions plus the static role→permission tables.
//!
//! The tables are code, not data: changing them is a deployment event, and
//! the compiler checks exhaustiveness when a role or permission is added.

use crate::authz::permission::Permission;
use serde::Serialize;
use std::collections::HashSet;

/// Primary roles. Closed set; every user holds exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum Role {
    Student,
    Teacher,
    Admin,
    PlatformOperator,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
            Self::PlatformOperator => "platform_operator",
        }
    }

    #[must_use]
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "student" => Some(Self::Student),
            "teacher" => Some(Self::Teacher),
            "admin" => Some(Self::Admin),
            "platform_operator" => Some(Self::PlatformOperator),
            _ => None,
        }
    }
}

impl From<Role> for &'static str {
    fn from(role: Role) -> Self {
        role.as_str()
    }
}

/// Secondary role grants layered onto a primary role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum RoleGrant {
    HeadOfDepartment,
}

impl RoleGrant {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeadOfDepartment => "head_of_department",
        }
    }

    #[must_use]
    pub fn parse(grant: &str) -> Option<Self> {
        match grant {
            "head_of_department" => Some(Self::HeadOfDepartment),
            _ => None,
        }
    }
}

impl From<RoleGrant> for &'static str {
    fn from(grant: RoleGrant) -> Self {
        grant.as_str()
    }
}

#[must_use]
pub fn role_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Student => &[
            Permission::AttendanceView,
            Permission::GradesView,
            Permission::InvoicesView,
        ],
        Role::Teacher => &[
            Permission::ClassesView,
            Permission::AttendanceMark,
            Permission::AttendanceView,
            Permission::GradesManage,
            Permission::GradesView,
            Permission::ExamsManage,
            Permission::ReportsView,
        ],
        Role::Admin => &[
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
        ],
        Role::PlatformOperator => &[
            Permission::UsersManage,
            Permission::UsersView,
            Permission::ClassesView,
            Permission::AttendanceView,
            Permission::GradesView,
            Permission::InvoicesManage,
            Permission::InvoicesView,
            Permission::ReportsView,
            Permission::SettingsBranding,
            Permission::AuditView,
            Permission::OverridesManage,
            Permission::TenantsManage,
        ],
    }
}

#[must_use]
pub fn grant_permissions(grant: RoleGrant) -> &'static [Permission] {
    match grant {
        RoleGrant::HeadOfDepartment => &[
            Permission::SubjectsManage,
            Permission::DepartmentsManage,
            Permission::ClassesView,
            Permission::ReportsView,
            Permission::UsersView,
        ],
    }
}

/// The caller's full effective permission set: the union of the primary
/// role's permissions and every additional grant's permissions. Single source
/// of truth for both request gating and UI-surface filtering.
#[must_use]
pub fn effective_permissions(role: Role, grants: &[RoleGrant]) -> HashSet<Permission> {
    let mut set: HashSet<Permission> = role_permissions(role).iter().copied().collect();
    for grant in grants {
        set.extend(grant_permissions(*grant).iter().copied());
    }
    set
}

#[must_use]
pub fn has_permission(role: Role, grants: &[RoleGrant], permission: Permission) -> bool {
    role_permissions(role).contains(&permission)
        || grants
            .iter()
            .any(|grant| grant_permissions(*grant).contains(&permission))
}

#[must_use]
pub fn has_any(role: Role, grants: &[RoleGrant], permissions: &[Permission]) -> bool {
    permissions
        .iter()
        .any(|permission| has_permission(role, grants, *permission))
}

#[must_use]
pub fn has_all(role: Role, grants: &[RoleGrant], permissions: &[Permission]) -> bool {
    permissions
        .iter()
        .all(|permission| has_permission(role, grants, *permission))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOD: &[RoleGrant] = &[RoleGrant::HeadOfDepartment];

    #[test]
    fn roles_round_trip() {
        for role in [
            Role::Student,
            Role::Teacher,
            Role::Admin,
            Role::PlatformOperator,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn effective_set_is_union_of_role_and_grants() {
        let expected: HashSet<Permission> = role_permissions(Role::Teacher)
            .iter()
            .chain(grant_permissions(RoleGrant::HeadOfDepartment))
            .copied()
            .collect();

        assert_eq!(effective_permissions(Role::Teacher, HOD), expected);
    }

    #[test]
    fn no_grants_behaves_like_base_role() {
        for role in [
            Role::Student,
            Role::Teacher,
            Role::Admin,
            Role::PlatformOperator,
        ] {
            let base: HashSet<Permission> = role_permissions(role).iter().copied().collect();
            assert_eq!(effective_permissions(role, &[]), base);

            for permission in role_permissions(role) {
                assert!(has_permission(role, &[], *permission));
            }
        }
    }

    #[test]
    fn head_of_department_extends_a_teacher() {
        assert!(!has_permission(Role::Teacher, &[], Permission::SubjectsManage));
        assert!(has_permission(Role::Teacher, HOD, Permission::SubjectsManage));
        // The overlay never removes base permissions.
        assert!(has_permission(Role::Teacher, HOD, Permission::AttendanceMark));
    }

    #[test]
    fn students_cannot_mark_attendance() {
        assert!(!has_permission(Role::Student, &[], Permission::AttendanceMark));
        assert!(!has_permission(Role::Student, HOD, Permission::AttendanceMark));
    }

    #[test]
    fn has_any_and_has_all() {
        let wanted = [Permission::AttendanceMark, Permission::OverridesManage];
        assert!(has_any(Role::Teacher, &[], &wanted));
        assert!(!has_all(Role::Teacher, &[], &wanted));
        assert!(has_all(
            Role::Teacher,
            &[],
            &[Permission::AttendanceMark, Permission::GradesView]
        ));
        assert!(!has_any(Role::Student, &[], &[Permission::OverridesManage]));
        // Vacuous truth for the empty requirement.
        assert!(has_all(Role::Student, &[], &[]));
    }
}
