//! Fixed three-level role hierarchy shared by tokens and route guards.

pub const ROLE_VIEWER: &str = "viewer";
pub const ROLE_MANAGER: &str = "manager";
pub const ROLE_ADMIN: &str = "admin";

fn level(role: &str) -> Option<u8> {
    match role {
        ROLE_VIEWER => Some(1),
        ROLE_MANAGER => Some(2),
        ROLE_ADMIN => Some(3),
        _ => None,
    }
}

/// True when `role` names a level in the hierarchy.
#[must_use]
pub fn is_valid_role(role: &str) -> bool {
    level(role).is_some()
}

/// Compare two role names; unrecognized names never satisfy a minimum.
#[must_use]
pub fn role_at_least(role: &str, minimum: &str) -> bool {
    match (level(role), level(minimum)) {
        (Some(have), Some(want)) => have >= want,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_orders_roles() {
        assert!(role_at_least(ROLE_ADMIN, ROLE_VIEWER));
        assert!(role_at_least(ROLE_ADMIN, ROLE_MANAGER));
        assert!(role_at_least(ROLE_MANAGER, ROLE_VIEWER));
        assert!(!role_at_least(ROLE_VIEWER, ROLE_MANAGER));
        assert!(!role_at_least(ROLE_MANAGER, ROLE_ADMIN));
    }

    #[test]
    fn every_role_satisfies_itself() {
        for role in [ROLE_VIEWER, ROLE_MANAGER, ROLE_ADMIN] {
            assert!(role_at_least(role, role));
        }
    }

    #[test]
    fn unknown_roles_never_pass() {
        assert!(!role_at_least("superuser", ROLE_VIEWER));
        assert!(!role_at_least(ROLE_ADMIN, "owner"));
        assert!(!role_at_least("", ROLE_VIEWER));
    }

    #[test]
    fn valid_role_names() {
        assert!(is_valid_role(ROLE_VIEWER));
        assert!(is_valid_role(ROLE_MANAGER));
        assert!(is_valid_role(ROLE_ADMIN));
        assert!(!is_valid_role("root"));
    }
}
