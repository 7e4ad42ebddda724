//! Cookie core types.
//!
//! A [`CookieRecord`] is what the codec produces from a `Set-Cookie` header and
//! what the [`SessionCookieStore`](super::SessionCookieStore) keeps per session.
//! It serializes in the persisted camelCase layout:
//!
//! ```rust
//! use tabjar::cookies::{CookieRecord, SameSite};
//!
//! let c = CookieRecord {
//!     name: "session_id".into(),
//!     value: "abc123".into(),
//!     domain: "mail.example.com".into(),
//!     path: "/".into(),
//!     secure: false,
//!     http_only: true,
//!     same_site: SameSite::Lax,
//!     expiration_date: None,
//! };
//! assert_eq!(c.key(), "session_id|/");
//! ```

use serde::{Deserialize, Serialize};

/// SameSite policy of a cookie.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    /// Case-insensitive parse of a `SameSite` attribute value.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("strict") {
            Some(SameSite::Strict)
        } else if value.eq_ignore_ascii_case("lax") {
            Some(SameSite::Lax)
        } else if value.eq_ignore_ascii_case("none") {
            Some(SameSite::None)
        } else {
            None
        }
    }
}

/// A cookie as captured from a response and stored for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    /// Cookie name (case-sensitive).
    pub name: String,

    /// Raw cookie value (not URL-decoded).
    pub value: String,

    /// Leading-dot form (`.example.com`) when the `Domain` attribute was explicit,
    /// otherwise the bare host the cookie came from (host-only).
    pub domain: String,

    /// Path scoping, `/` by default.
    pub path: String,

    pub secure: bool,

    pub http_only: bool,

    pub same_site: SameSite,

    /// Expiration as epoch seconds. `None` is a session cookie.
    pub expiration_date: Option<i64>,
}

impl CookieRecord {
    /// Uniqueness key inside a session+domain bucket.
    ///
    /// `\` and `|` in the name are backslash-escaped, so the first bare `|`
    /// always separates name from path.
    pub fn key(&self) -> String {
        let name = self.name.replace('\\', "\\\\").replace('|', "\\|");
        format!("{name}|{}", self.path)
    }

    /// A cookie is dead once its expiration is not in the future anymore.
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expiration_date, Some(exp) if exp <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expiration_date: Option<i64>) -> CookieRecord {
        CookieRecord {
            name: "a".into(),
            value: "1".into(),
            domain: ".example.com".into(),
            path: "/".into(),
            secure: false,
            http_only: false,
            same_site: SameSite::Lax,
            expiration_date,
        }
    }

    #[test]
    fn same_site_parsing_is_case_insensitive() {
        assert_eq!(SameSite::parse("STRICT"), Some(SameSite::Strict));
        assert_eq!(SameSite::parse(" lax "), Some(SameSite::Lax));
        assert_eq!(SameSite::parse("None"), Some(SameSite::None));
        assert_eq!(SameSite::parse("sometimes"), None);
    }

    #[test]
    fn session_cookies_never_expire() {
        assert!(!record(None).is_expired_at(i64::MAX));
    }

    #[test]
    fn expiry_boundary_is_dead() {
        let c = record(Some(100));
        assert!(!c.is_expired_at(99));
        assert!(c.is_expired_at(100));
        assert!(c.is_expired_at(101));
    }

    #[test]
    fn keys_stay_distinct_when_names_contain_separators() {
        let mut a = record(None);
        a.name = "x|/a".into();
        a.path = "/".into();
        let mut b = record(None);
        b.name = "x".into();
        b.path = "/a|/".into();

        assert_eq!(a.key(), r"x\|/a|/");
        assert_eq!(b.key(), "x|/a|/");
        assert_ne!(a.key(), b.key());
        assert_eq!(record(None).key(), "a|/");
    }

    #[test]
    fn serializes_in_persisted_layout() {
        let json = serde_json::to_value(record(Some(5))).unwrap();
        assert_eq!(json["httpOnly"], false);
        assert_eq!(json["sameSite"], "Lax");
        assert_eq!(json["expirationDate"], 5);
    }
}
