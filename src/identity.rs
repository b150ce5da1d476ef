//! Identity resolution at the user-directory boundary.
//!
//! The messaging core stores opaque portal user ids. Display names and
//! synthesized short addresses come from a separate directory, consulted
//! lazily: an identity row is created the first time a user id is seen in a
//! read path, then served from the store forever after.

use std::{future::Future, pin::Pin};

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::{error::Error, message::UserId};

/// Display identity attached to messages at read time.
#[derive(Serialize, Deserialize, FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    /// Synthesized short address, e.g. `jane@students`.
    pub internal_id: String,
    pub display_name: String,
    /// Department code derived from the directory role.
    pub department: String,
}

/// Raw directory record for a portal user. Owned by the directory; the
/// messaging core only ever reads it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

/// External user directory.
///
/// Implementations look up portal users wherever the portal keeps them. A
/// lookup failure for an unknown id should surface as [`Error::NotFound`] so
/// read paths can report the missing party instead of inventing one.
pub trait Directory: Send + Sync + 'static {
    fn lookup(
        &self,
        user_id: &UserId,
    ) -> Pin<Box<dyn Future<Output = Result<DirectoryUser, Error>> + Send>>;
}

/// Maps a directory role to the department code used in short addresses.
///
/// The table is fixed. Unknown roles fall back to `staff` rather than
/// failing, since the directory grows roles faster than this list.
pub fn department_code(role: &str) -> &'static str {
    let role = role.trim().to_ascii_lowercase();

    match role.as_str() {
        "admin" => "admin",
        "student" => "students",
        "faculty" => "faculty",
        "alumni" => "alumni",
        "finance" => "finance",
        "hr" => "hr",
        other if other.starts_with("admission") => "admissions",
        _ => "staff",
    }
}

/// Synthesized short address for a directory user: lowercased first name,
/// `@`, department code. Not guaranteed unique; the store disambiguates on
/// insert.
pub fn internal_address(user: &DirectoryUser) -> String {
    let local = user.first_name.trim().to_lowercase();
    let local = if local.is_empty() {
        "user".to_owned()
    } else {
        local
    };

    format!("{}@{}", local, department_code(&user.role))
}

/// Display name as shown in folder listings.
pub fn display_name(user: &DirectoryUser) -> String {
    format!("{} {}", user.first_name.trim(), user.last_name.trim())
        .trim()
        .to_owned()
}

/// Appends a numeric suffix to the local part of a short address:
/// `jane@students` with suffix 2 becomes `jane2@students`.
pub(crate) fn with_suffix(address: &str, suffix: u32) -> String {
    match address.split_once('@') {
        Some((local, domain)) => format!("{local}{suffix}@{domain}"),
        None => format!("{address}{suffix}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: &str, last: &str, role: &str) -> DirectoryUser {
        DirectoryUser {
            first_name: first.to_owned(),
            last_name: last.to_owned(),
            role: role.to_owned(),
        }
    }

    #[test]
    fn department_codes_follow_the_fixed_table() {
        let test_cases = vec![
            ("admin", "admin"),
            ("student", "students"),
            ("faculty", "faculty"),
            ("alumni", "alumni"),
            ("admissions", "admissions"),
            ("admission_officer", "admissions"),
            ("finance", "finance"),
            ("hr", "hr"),
            ("registrar", "staff"),
            ("administrator", "staff"),
            ("", "staff"),
            ("STUDENT", "students"),
            ("  faculty  ", "faculty"),
        ];

        for (role, expected) in test_cases {
            assert_eq!(
                department_code(role),
                expected,
                "department mismatch for role: {:?}",
                role
            );
        }
    }

    #[test]
    fn addresses_lowercase_the_first_name() {
        let address = internal_address(&user("Jane", "Doe", "student"));
        assert_eq!(address, "jane@students");

        let address = internal_address(&user("OLUWASEUN", "Adeyemi", "faculty"));
        assert_eq!(address, "oluwaseun@faculty");
    }

    #[test]
    fn empty_first_name_falls_back_to_generic_local_part() {
        let address = internal_address(&user("", "Doe", "hr"));
        assert_eq!(address, "user@hr");
    }

    #[test]
    fn suffix_lands_before_the_at_sign() {
        assert_eq!(with_suffix("jane@students", 2), "jane2@students");
        assert_eq!(with_suffix("jane@students", 11), "jane11@students");
        assert_eq!(with_suffix("no-at-sign", 2), "no-at-sign2");
    }

    #[test]
    fn display_name_trims_its_parts() {
        assert_eq!(display_name(&user(" Jane ", " Doe ", "student")), "Jane Doe");
        assert_eq!(display_name(&user("Jane", "", "student")), "Jane");
    }
}
