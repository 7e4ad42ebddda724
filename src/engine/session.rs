// src/engine/session.rs
//! Session system: [`Session`], [`SessionId`] and [`SessionPatch`].
//!
//! A session is a named, colored isolation domain with its own cookie jar. The
//! reserved [`SessionId::DEFAULT`] session maps onto the host's native cookie jar
//! and never receives rewrite rules.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Identifier of a session. `"default"` is reserved for the native, unmanaged jar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub const DEFAULT: &'static str = "default";

    /// Generates a fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn default_session() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::default_session()
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RGB color used by the indicator collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A session (ie: Work, Personal) with its own cookie jar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// ID of the session
    pub id: SessionId,
    /// Name shown to the user
    pub name: String,
    /// Tab indicator color
    pub color: RgbColor,
    /// Icon name
    pub icon: String,
}

impl Session {
    pub fn new(name: &str, color: RgbColor, icon: &str) -> Self {
        Self {
            id: SessionId::new(),
            name: name.to_string(),
            color,
            icon: icon.to_string(),
        }
    }

    /// The built-in session that stands for "no isolation".
    pub fn builtin_default() -> Self {
        Self {
            id: SessionId::default_session(),
            name: "Default".to_string(),
            color: RgbColor::new(0x80, 0x80, 0x80),
            icon: "default".to_string(),
        }
    }

    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(icon) = patch.icon {
            self.icon = icon;
        }
    }
}

/// Partial update for [`Session`]. The id is never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    pub name: Option<String>,
    pub color: Option<RgbColor>,
    pub icon: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_id_is_reserved() {
        assert!(SessionId::default().is_default());
        assert!(SessionId::from("default").is_default());
        assert!(!SessionId::new().is_default());
    }

    #[test]
    fn patch_keeps_id_and_unset_fields() {
        let mut s = Session::new("Work", RgbColor::new(1, 2, 3), "briefcase");
        let id = s.id.clone();

        s.apply(SessionPatch { name: Some("Office".into()), ..Default::default() });

        assert_eq!(s.id, id);
        assert_eq!(s.name, "Office");
        assert_eq!(s.color, RgbColor::new(1, 2, 3));
        assert_eq!(s.icon, "briefcase");
    }

    #[test]
    fn session_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&SessionId::from("work")).unwrap();
        assert_eq!(json, "\"work\"");
    }
}
