use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::item::Item;

/// A visitor profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub system_properties: Map<String, Value>,
    #[serde(default)]
    pub segments: BTreeSet<String>,
    #[serde(default)]
    pub scores: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_with: Option<String>,
}

impl Profile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            item_id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

impl Item for Profile {
    const ITEM_TYPE: &'static str = "profile";

    fn item_id(&self) -> &str {
        &self.item_id
    }

    fn set_item_id(&mut self, id: String) {
        self.item_id = id;
    }

    fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

/// A visit, owned by one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub profile_id: String,
    #[serde(rename = "timeStamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Session {
    pub fn new(id: impl Into<String>, profile_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            item_id: id.into(),
            scope: None,
            profile_id: profile_id.into(),
            timestamp,
            last_event_date: None,
            size: 0,
            duration: 0,
            properties: Map::new(),
        }
    }
}

impl Item for Session {
    const ITEM_TYPE: &'static str = "session";

    fn item_id(&self) -> &str {
        &self.item_id
    }

    fn set_item_id(&mut self, id: String) {
        self.item_id = id;
    }

    fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        Some(self.timestamp)
    }
}

/// Something that happened during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(rename = "timeStamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Event {
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            item_id: id.into(),
            scope: None,
            event_type: event_type.into(),
            session_id: None,
            profile_id: None,
            timestamp,
            properties: Map::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

impl Item for Event {
    const ITEM_TYPE: &'static str = "event";

    fn item_id(&self) -> &str {
        &self.item_id
    }

    fn set_item_id(&mut self, id: String) {
        self.item_id = id;
    }

    fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        Some(self.timestamp)
    }
}
