//! Squad identity and membership models.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// A squad name as returned by the squad list endpoint.
///
/// Used verbatim as the key in the snapshot, and percent-encoded when used
/// as a query parameter.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SquadName(String);

impl SquadName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Query-safe form of the name (space becomes `%20`).
    pub fn url_encoded(&self) -> String {
        urlencoding::encode(&self.0).into_owned()
    }
}

impl fmt::Display for SquadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SquadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SquadName({})", self.0)
    }
}

impl From<String> for SquadName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SquadName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One entry of a squad member list.
///
/// The remote side is loose about `uid`: it can be missing, null, a string
/// or a number. Anything that is not a non-empty string or a number
/// deserializes to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    #[serde(default, deserialize_with = "lenient_uid")]
    pub uid: Option<String>,
}

impl MemberRef {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
        }
    }

    /// The uid if it can be used to fetch player stats.
    pub fn usable_uid(&self) -> Option<&str> {
        self.uid.as_deref().filter(|uid| !uid.trim().is_empty())
    }

    /// Build a member from one element of the members array.
    ///
    /// Non-object elements yield a member without uid.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

fn lenient_uid<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
