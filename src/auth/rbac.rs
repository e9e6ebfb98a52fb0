#[derive(Debug, Clone, PartialEq)]
pub enum Permission {
    ManageRecords,
    ManageLookups,
    ManageUsers,
    ReadAuditLog,
}

pub const ROLES: &[&str] = &["super_admin", "admin"];

pub fn has_permission(role: &str, permission: &Permission) -> bool {
    match role {
        "super_admin" => true,
        "admin" => matches!(permission, Permission::ManageRecords | Permission::ManageLookups),
        _ => false,
    }
}

pub fn is_valid_role(role: &str) -> bool {
    ROLES.contains(&role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_admin_has_everything() {
        assert!(has_permission("super_admin", &Permission::ManageUsers));
        assert!(has_permission("super_admin", &Permission::ReadAuditLog));
    }

    #[test]
    fn test_admin_cannot_manage_users() {
        assert!(has_permission("admin", &Permission::ManageRecords));
        assert!(!has_permission("admin", &Permission::ManageUsers));
        assert!(!has_permission("admin", &Permission::ReadAuditLog));
    }

    #[test]
    fn test_unknown_role_has_nothing() {
        assert!(!has_permission("operator", &Permission::ManageRecords));
        assert!(!is_valid_role("operator"));
    }
}
