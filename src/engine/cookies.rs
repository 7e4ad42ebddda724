// src/engine/cookies.rs
//! Cookies: [`CookieRecord`], the `Set-Cookie` codec and the [`SessionCookieStore`].

mod codec;
mod cookies;
mod store;

pub use codec::{
    build_cookie_header, build_cookie_header_at, parse_set_cookie, parse_set_cookie_at,
    serialize_cookie_pairs, set_cookie_values, CookieParseError,
};
pub use cookies::{CookieRecord, SameSite};
pub use store::{domain_matches, CookieSnapshot, SessionCookieStore};

/// Current wall-clock time as epoch seconds.
pub(crate) fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
