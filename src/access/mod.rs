//! API key registry and the `(system, talkgroup)` authorization predicate.

use parking_lot::Mutex;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::call::Call;
use crate::storage::{self, Database};
use crate::Result;

/// Which talkgroups of a system a key may receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TalkgroupScope {
    /// Every talkgroup of the system.
    Wildcard,
    /// An explicit list of talkgroup ids.
    List(Vec<u32>),
}

/// Per-system access rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemRule {
    /// System id the rule applies to.
    pub id: u32,
    /// Talkgroups granted within that system.
    pub talkgroups: TalkgroupScope,
}

/// Which systems a key may receive.
///
/// Persists as either the JSON string `"*"` or a JSON array of rules —
/// the wildcard is a string, never an empty array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    /// Every system.
    Wildcard,
    /// An explicit rule list.
    Systems(Vec<SystemRule>),
}

impl Default for AccessScope {
    fn default() -> Self {
        Self::Systems(Vec::new())
    }
}

impl Serialize for AccessScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Wildcard => serializer.serialize_str("*"),
            Self::Systems(rules) => rules.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for AccessScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Rules(Vec<SystemRule>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) if s == "*" => Self::Wildcard,
            // Any other string grants nothing.
            Raw::Text(_) => Self::Systems(Vec::new()),
            Raw::Rules(rules) => Self::Systems(rules),
        })
    }
}

impl Serialize for TalkgroupScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Wildcard => serializer.serialize_str("*"),
            Self::List(ids) => ids.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TalkgroupScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Ids(Vec<u32>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) if s == "*" => Self::Wildcard,
            Raw::Text(_) => Self::List(Vec::new()),
            Raw::Ids(ids) => Self::List(ids),
        })
    }
}

/// One API key and the systems it may receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apikey {
    /// Database id; `None` until first persisted.
    #[serde(rename = "_id", default)]
    pub id: Option<u32>,
    /// Disabled keys are invisible to lookup.
    #[serde(default)]
    pub disabled: bool,
    /// Human-readable owner of the key.
    #[serde(default)]
    pub ident: String,
    /// The opaque secret presented by clients.
    #[serde(default)]
    pub key: String,
    /// Cosmetic ordering in the admin surface.
    #[serde(default)]
    pub order: Option<u32>,
    /// Granted systems.
    #[serde(default)]
    pub systems: AccessScope,
}

impl Apikey {
    /// Create a key with a fresh random secret.
    #[must_use]
    pub fn new(ident: impl Into<String>) -> Self {
        Self {
            id: None,
            disabled: false,
            ident: ident.into(),
            key: uuid::Uuid::new_v4().to_string(),
            order: None,
            systems: AccessScope::default(),
        }
    }

    /// Whether this key may receive `call`.
    #[must_use]
    pub fn has_access(&self, call: &Call) -> bool {
        match &self.systems {
            AccessScope::Wildcard => true,
            AccessScope::Systems(rules) => rules.iter().any(|rule| {
                rule.id == call.system
                    && match &rule.talkgroups {
                        TalkgroupScope::Wildcard => true,
                        TalkgroupScope::List(ids) => ids.contains(&call.talkgroup),
                    }
            }),
        }
    }
}

/// In-memory list of API keys, persisted alongside the watches.
#[derive(Default)]
pub struct Apikeys {
    list: Mutex<Vec<Apikey>>,
}

impl Apikeys {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current keys with a materialized list.
    pub fn replace(&self, keys: Vec<Apikey>) {
        *self.list.lock() = keys;
    }

    /// Look up an enabled key by its secret.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Apikey> {
        self.list
            .lock()
            .iter()
            .find(|entry| entry.key == key && !entry.disabled)
            .cloned()
    }

    /// Load the registry from the store, replacing the current list.
    ///
    /// # Errors
    ///
    /// Returns an `apikeys.read`-prefixed error on database failure.
    pub fn read(&self, db: &Database) -> Result<()> {
        let keys = db.with_conn(storage::read_apikeys)?;
        self.replace(keys);
        Ok(())
    }

    /// Diff-persist the registry.
    ///
    /// # Errors
    ///
    /// Returns an `apikeys.write`-prefixed error on database failure.
    pub fn write(&self, db: &Database) -> Result<()> {
        let list = self.list.lock();
        db.with_transaction(|conn| storage::write_apikeys(conn, &list))
    }

    /// A snapshot of the current keys, in order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Apikey> {
        self.list.lock().clone()
    }
}
