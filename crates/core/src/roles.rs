//! Well-known role name constants.
//!
//! These must match the `role` values issued by the portal's auth service.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_INSTRUCTOR: &str = "instructor";
pub const ROLE_STUDENT: &str = "student";

/// Returns `true` if the role bypasses content locks.
pub fn is_admin(role: &str) -> bool {
    role == ROLE_ADMIN
}
