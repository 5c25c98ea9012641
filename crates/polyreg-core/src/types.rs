use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

// ─── Target type ─────────────────────────────────────────────────────

/// Closed set of entity kinds a registry entry may point at.
///
/// Adding a kind means adding a variant here, a [`TargetRef`] variant, a
/// backing table and a discriminator column in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Bot,
    User,
}

impl TargetType {
    pub const ALL: [Self; 2] = [Self::Bot, Self::User];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::User => "user",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = RegistryError;

    /// Tags are matched exactly; `"Bot"` is not `"bot"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bot" => Ok(Self::Bot),
            "user" => Ok(Self::User),
            _ => Err(RegistryError::InvalidTargetType { tag: s.to_owned() }),
        }
    }
}

// ─── Typed keys ──────────────────────────────────────────────────────

/// Primary key of a row in `bots`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotId(String);

impl BotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Primary key of a row in `users`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ─── Target reference ────────────────────────────────────────────────

/// A `(target_id, target_type)` pair as a tagged union: each variant
/// carries the key type of the table it points into.
///
/// Ordering follows `(target_type, target_id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "target_type", content = "target_id", rename_all = "snake_case")]
pub enum TargetRef {
    Bot(BotId),
    User(UserId),
}

impl TargetRef {
    pub fn bot(id: impl Into<String>) -> Self {
        Self::Bot(BotId::new(id))
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::User(UserId::new(id))
    }

    pub fn new(target_type: TargetType, target_id: impl Into<String>) -> Self {
        match target_type {
            TargetType::Bot => Self::bot(target_id),
            TargetType::User => Self::user(target_id),
        }
    }

    /// Build a reference from the raw column values.
    pub fn parse(target_id: &str, target_type: &str) -> Result<Self, RegistryError> {
        let target_type: TargetType = target_type.parse()?;
        Ok(Self::new(target_type, target_id))
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            Self::Bot(_) => TargetType::Bot,
            Self::User(_) => TargetType::User,
        }
    }

    pub fn target_id(&self) -> &str {
        match self {
            Self::Bot(id) => id.as_str(),
            Self::User(id) => id.as_str(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type(), self.target_id())
    }
}

// ─── Records ─────────────────────────────────────────────────────────

/// A registry entry. Exists only while its backing record exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnownEntity {
    pub target: TargetRef,
}

impl KnownEntity {
    pub fn new(target: TargetRef) -> Self {
        Self { target }
    }

    pub fn target_id(&self) -> &str {
        self.target.target_id()
    }

    pub fn target_type(&self) -> TargetType {
        self.target.target_type()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Input to `SessionStore::create_session`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub id: SessionId,
    pub target: TargetRef,
    pub name: Option<String>,
}

impl NewSession {
    pub fn new(id: impl Into<SessionId>, target: TargetRef) -> Self {
        Self {
            id: id.into(),
            target,
            name: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A dependent record owned by one [`KnownEntity`]. `Created -> Deleted`
/// is its only transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSession {
    pub id: SessionId,
    pub target: TargetRef,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ─── Cascade & audit ─────────────────────────────────────────────────

/// What one delete walk (backing record → entity → sessions) removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub target: TargetRef,
    pub backing_removed: bool,
    pub entity_removed: bool,
    /// Sorted by id.
    pub sessions_removed: Vec<SessionId>,
}

impl CascadeReport {
    pub fn empty(target: TargetRef) -> Self {
        Self {
            target,
            backing_removed: false,
            entity_removed: false,
            sessions_removed: Vec::new(),
        }
    }

    /// True when the walk found nothing to delete.
    pub fn is_noop(&self) -> bool {
        !self.backing_removed && !self.entity_removed && self.sessions_removed.is_empty()
    }
}

/// A row that breaks the ownership chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityViolation {
    /// Registry entry whose backing record is gone.
    OrphanEntity { target: TargetRef },
    /// Session whose registry entry is gone.
    OrphanSession { session: SessionId, target: TargetRef },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_type_round_trips_through_str() {
        for t in TargetType::ALL {
            assert_eq!(t.as_str().parse::<TargetType>().unwrap(), t);
        }
    }

    #[test]
    fn unknown_tag_is_invalid_target_type() {
        let err = "server".parse::<TargetType>().unwrap_err();
        assert_eq!(
            err,
            RegistryError::InvalidTargetType {
                tag: "server".to_string()
            }
        );
    }

    #[test]
    fn tag_match_is_case_sensitive() {
        assert!("Bot".parse::<TargetType>().is_err());
        assert!("USER".parse::<TargetType>().is_err());
    }

    #[test]
    fn parse_builds_matching_variant() {
        assert_eq!(TargetRef::parse("b1", "bot").unwrap(), TargetRef::bot("b1"));
        assert_eq!(TargetRef::parse("u1", "user").unwrap(), TargetRef::user("u1"));
        assert!(matches!(
            TargetRef::parse("x", ""),
            Err(RegistryError::InvalidTargetType { .. })
        ));
    }

    #[test]
    fn same_id_different_type_are_distinct() {
        assert_ne!(TargetRef::bot("42"), TargetRef::user("42"));
    }

    #[test]
    fn target_ref_serializes_as_pair() {
        let json = serde_json::to_value(TargetRef::bot("b1")).unwrap();
        assert_eq!(json, serde_json::json!({"target_type": "bot", "target_id": "b1"}));

        let back: TargetRef =
            serde_json::from_value(serde_json::json!({"target_type": "user", "target_id": "u7"}))
                .unwrap();
        assert_eq!(back, TargetRef::user("u7"));
    }

    #[test]
    fn target_ref_rejects_unknown_tag_on_deserialize() {
        let res: Result<TargetRef, _> =
            serde_json::from_value(serde_json::json!({"target_type": "guild", "target_id": "g1"}));
        assert!(res.is_err());
    }

    #[test]
    fn ordering_is_type_then_id() {
        let mut refs = vec![
            TargetRef::user("a"),
            TargetRef::bot("z"),
            TargetRef::bot("a"),
        ];
        refs.sort();
        assert_eq!(
            refs,
            vec![TargetRef::bot("a"), TargetRef::bot("z"), TargetRef::user("a")]
        );
    }

    #[test]
    fn display_formats() {
        assert_eq!(TargetRef::user("u9").to_string(), "user:u9");
        assert_eq!(SessionId::new("s1").to_string(), "s1");
    }

    #[test]
    fn cascade_report_noop() {
        let report = CascadeReport::empty(TargetRef::bot("b1"));
        assert!(report.is_noop());
        let report = CascadeReport {
            entity_removed: true,
            ..report
        };
        assert!(!report.is_noop());
    }
}
