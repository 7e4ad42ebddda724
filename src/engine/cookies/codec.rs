//! `Set-Cookie` / `Cookie` header codec.
//!
//! [`parse_set_cookie`] turns one raw `Set-Cookie` value into a [`CookieRecord`];
//! [`build_cookie_header`] turns a session's matching records back into the value
//! of an outgoing `Cookie` header.
//!
//! ### Parsing behavior
//! - The first `;`-separated segment is `name=value`, split on the first `=`.
//! - Attribute names are case-insensitive. `Domain` is stored with a leading dot,
//!   `Path` defaults to `/`, `SameSite` defaults to `Lax`.
//! - A `Domain` the source host does not domain-match rejects the whole cookie.
//! - `Expires` and `Max-Age` are applied in header order, so whichever comes last
//!   decides the expiration. A malformed one is ignored, the record is kept.
//! - Unknown attributes are ignored.

use http::header::SET_COOKIE;
use http::HeaderMap;
use time::macros::format_description;
use time::PrimitiveDateTime;
use url::Url;

use crate::engine::cookies::{domain_matches, unix_now, CookieRecord, SameSite, SessionCookieStore};
use crate::session::SessionId;
use crate::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CookieParseError {
    #[error("Set-Cookie header has no cookie name")]
    MissingName,

    #[error("Cannot resolve a hostname from source URL: {0}")]
    UnresolvableUrl(String),

    #[error("Domain {domain} does not cover source host {host}")]
    ForeignDomain { domain: String, host: String },
}

/// Parses `header` as received from `source_url`, using the current time for `Max-Age`.
pub fn parse_set_cookie(header: &str, source_url: &str) -> Result<CookieRecord, CookieParseError> {
    parse_set_cookie_at(header, source_url, unix_now())
}

/// Same as [`parse_set_cookie`] with an explicit "now" (epoch seconds).
pub fn parse_set_cookie_at(
    header: &str,
    source_url: &str,
    now: i64,
) -> Result<CookieRecord, CookieParseError> {
    let host = Url::parse(source_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CookieParseError::UnresolvableUrl(source_url.to_string()))?;

    let mut segments = header.split(';');
    let (name, value) = segments
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(n, v)| (n.trim(), v.trim()))
        .filter(|(n, _)| !n.is_empty())
        .ok_or(CookieParseError::MissingName)?;

    let mut cookie = CookieRecord {
        name: name.to_string(),
        value: value.to_string(),
        domain: host.clone(),
        path: "/".to_string(),
        secure: false,
        http_only: false,
        same_site: SameSite::Lax,
        expiration_date: None,
    };

    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (attr, attr_value) = match segment.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (segment, ""),
        };

        match attr.to_ascii_lowercase().as_str() {
            "domain" => {
                let domain = attr_value.to_ascii_lowercase();
                if domain.is_empty() || domain == "." {
                    continue;
                }
                let domain = if domain.starts_with('.') {
                    domain
                } else {
                    format!(".{domain}")
                };
                if !domain_matches(&domain, &host) {
                    return Err(CookieParseError::ForeignDomain { domain, host });
                }
                cookie.domain = domain;
            }
            "path" => {
                cookie.path = if attr_value.starts_with('/') {
                    attr_value.to_string()
                } else {
                    "/".to_string()
                };
            }
            "expires" => match parse_cookie_date(attr_value) {
                Some(ts) => cookie.expiration_date = Some(ts),
                None => log::debug!("ignoring unparsable Expires for cookie {}: {:?}", cookie.name, attr_value),
            },
            "max-age" => match attr_value.parse::<i64>() {
                Ok(secs) => cookie.expiration_date = Some(now.saturating_add(secs)),
                Err(_) => log::debug!("ignoring unparsable Max-Age for cookie {}: {:?}", cookie.name, attr_value),
            },
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            "samesite" => cookie.same_site = SameSite::parse(attr_value).unwrap_or_default(),
            _ => {}
        }
    }

    Ok(cookie)
}

/// Parses the date formats found in `Expires` attributes into epoch seconds.
fn parse_cookie_date(value: &str) -> Option<i64> {
    let rfc1123 = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    let netscape = format_description!(
        "[weekday repr:short], [day]-[month repr:short]-[year] [hour]:[minute]:[second] GMT"
    );
    let asctime = format_description!(
        "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
    );

    let value = value.trim();
    [rfc1123, netscape, asctime]
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(value, *format).ok())
        .map(|dt| dt.assume_utc().unix_timestamp())
}

/// Serializes records as `name=value` pairs joined by `"; "`.
pub fn serialize_cookie_pairs<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = &'a CookieRecord>,
{
    records
        .into_iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Returns the `Cookie` header value for requests to `domain` in `session`.
///
/// An empty string means "no Cookie header".
pub fn build_cookie_header(
    store: &SessionCookieStore,
    session: &SessionId,
    domain: &str,
) -> Result<String, EngineError> {
    build_cookie_header_at(store, session, domain, unix_now())
}

pub fn build_cookie_header_at(
    store: &SessionCookieStore,
    session: &SessionId,
    domain: &str,
    now: i64,
) -> Result<String, EngineError> {
    let records = store.query_for_domain_at(session, domain, now)?;
    Ok(serialize_cookie_pairs(records.iter().filter(|c| !c.is_expired_at(now))))
}

/// Collects every `Set-Cookie` value of an observed response.
pub fn set_cookie_values(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    const T: i64 = 1_700_000_000;

    #[test]
    fn parses_host_only_http_only_cookie() {
        let c = parse_set_cookie_at(
            "session_id=abc123; Path=/; HttpOnly",
            "https://mail.example.com/x",
            T,
        )
        .unwrap();

        assert_eq!(c.name, "session_id");
        assert_eq!(c.value, "abc123");
        assert_eq!(c.domain, "mail.example.com");
        assert_eq!(c.path, "/");
        assert!(c.http_only);
        assert!(!c.secure);
        assert_eq!(c.same_site, SameSite::Lax);
        assert_eq!(c.expiration_date, None);
    }

    #[test]
    fn explicit_domain_gets_leading_dot_and_max_age_counts_from_now() {
        let c = parse_set_cookie_at(
            "token=zzz; Domain=example.com; Max-Age=60",
            "https://www.example.com/",
            T,
        )
        .unwrap();

        assert_eq!(c.domain, ".example.com");
        assert_eq!(c.expiration_date, Some(T + 60));
    }

    #[test]
    fn domain_outside_the_source_host_is_rejected() {
        assert_eq!(
            parse_set_cookie_at("sid=x; Domain=bank.test", "https://evil.test/", T),
            Err(CookieParseError::ForeignDomain { domain: ".bank.test".into(), host: "evil.test".into() })
        );
        assert!(matches!(
            parse_set_cookie_at("sid=x; Domain=www.example.com", "https://example.com/", T),
            Err(CookieParseError::ForeignDomain { .. })
        ));

        let parent = parse_set_cookie_at("sid=x; Domain=.Example.com", "https://a.b.example.com/", T).unwrap();
        assert_eq!(parent.domain, ".example.com");
    }

    #[test]
    fn value_may_contain_equals_signs() {
        let c = parse_set_cookie_at("data=a=b==; Secure", "https://a.test/", T).unwrap();
        assert_eq!(c.name, "data");
        assert_eq!(c.value, "a=b==");
        assert!(c.secure);
    }

    #[test]
    fn attribute_names_are_case_insensitive() {
        let c = parse_set_cookie_at(
            "k=v; DOMAIN=.Example.COM; pAtH=/docs; secure; HTTPONLY; SameSite=strict",
            "https://example.com/",
            T,
        )
        .unwrap();

        assert_eq!(c.domain, ".example.com");
        assert_eq!(c.path, "/docs");
        assert!(c.secure && c.http_only);
        assert_eq!(c.same_site, SameSite::Strict);
    }

    #[test]
    fn malformed_same_site_defaults_to_lax() {
        let c = parse_set_cookie_at("k=v; SameSite=whenever", "https://a.test/", T).unwrap();
        assert_eq!(c.same_site, SameSite::Lax);
    }

    #[test]
    fn expires_formats_are_understood() {
        let rfc1123 = parse_set_cookie_at("k=v; Expires=Wed, 21 Oct 2015 07:28:00 GMT", "https://a.test/", T).unwrap();
        assert_eq!(rfc1123.expiration_date, Some(1_445_412_480));

        let netscape = parse_set_cookie_at("k=v; expires=Sun, 06-Nov-1994 08:49:37 GMT", "https://a.test/", T).unwrap();
        assert_eq!(netscape.expiration_date, Some(784_111_777));

        let asctime = parse_set_cookie_at("k=v; Expires=Sun Nov  6 08:49:37 1994", "https://a.test/", T).unwrap();
        assert_eq!(asctime.expiration_date, Some(784_111_777));
    }

    #[test]
    fn malformed_expiry_attributes_are_ignored() {
        let c = parse_set_cookie_at("k=v; Expires=tomorrow-ish; Max-Age=soon; Path=/a", "https://a.test/", T).unwrap();
        assert_eq!(c.expiration_date, None);
        assert_eq!(c.path, "/a");
    }

    #[test]
    fn last_expiry_attribute_wins() {
        let max_age_last = parse_set_cookie_at(
            "k=v; Expires=Wed, 21 Oct 2015 07:28:00 GMT; Max-Age=10",
            "https://a.test/",
            T,
        )
        .unwrap();
        assert_eq!(max_age_last.expiration_date, Some(T + 10));

        let expires_last = parse_set_cookie_at(
            "k=v; Max-Age=10; Expires=Wed, 21 Oct 2015 07:28:00 GMT",
            "https://a.test/",
            T,
        )
        .unwrap();
        assert_eq!(expires_last.expiration_date, Some(1_445_412_480));
    }

    #[test]
    fn relative_path_falls_back_to_root() {
        let c = parse_set_cookie_at("k=v; Path=docs", "https://a.test/x/y", T).unwrap();
        assert_eq!(c.path, "/");
    }

    #[test]
    fn unresolvable_source_url_fails() {
        assert_eq!(
            parse_set_cookie_at("k=v", "not a url", T),
            Err(CookieParseError::UnresolvableUrl("not a url".into()))
        );
        assert!(matches!(
            parse_set_cookie_at("k=v", "data:text/plain,hello", T),
            Err(CookieParseError::UnresolvableUrl(_))
        ));
    }

    #[test]
    fn missing_name_fails() {
        assert_eq!(parse_set_cookie_at("=v", "https://a.test/", T), Err(CookieParseError::MissingName));
        assert_eq!(parse_set_cookie_at("novalue", "https://a.test/", T), Err(CookieParseError::MissingName));
    }

    #[test]
    fn header_round_trips_through_a_pair_parser() {
        let store = SessionCookieStore::new();
        let s = SessionId::from("work");
        for raw in ["a=1; Domain=example.com", "b=x=y; Path=/", "gone=1; Domain=example.com; Max-Age=-1"] {
            store.put(&s, parse_set_cookie_at(raw, "https://example.com/", T).unwrap()).unwrap();
        }
        store
            .put(&SessionId::from("home"), parse_set_cookie_at("c=3", "https://example.com/", T).unwrap())
            .unwrap();

        let header = build_cookie_header_at(&store, &s, "example.com", T).unwrap();

        let pairs: Vec<(&str, &str)> = header
            .split("; ")
            .filter_map(|p| p.split_once('='))
            .collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "x=y")]);
    }

    #[test]
    fn empty_store_builds_empty_header() {
        let store = SessionCookieStore::new();
        assert_eq!(build_cookie_header(&store, &SessionId::from("x"), "a.test").unwrap(), "");
    }

    #[test]
    fn collects_all_set_cookie_values() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2; Path=/"));
        headers.append(http::header::CONTENT_TYPE, HeaderValue::from_static("text/html"));

        assert_eq!(set_cookie_values(&headers), vec!["a=1".to_string(), "b=2; Path=/".to_string()]);
    }
}
