//! Channel records and the two-way registry (by id, by name).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A Slack channel as tracked locally.
///
/// Decoded straight from Slack's channel objects; fields this client does
/// not track are ignored and missing counters default to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    /// Whether the session's own user is a member.
    #[serde(default)]
    pub is_member: bool,
    #[serde(default)]
    pub unread_count: u64,
    /// Slack's display counter. It may lag or duplicate `unread_count`.
    #[serde(default)]
    pub unread_count_display: u64,
}

impl Channel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_member: false,
            unread_count: 0,
            unread_count_display: 0,
        }
    }
}

/// Channels indexed by id, with a secondary name index.
///
/// Both maps are only touched inside a single `&mut self` call, so the name
/// index always points at an id present in the primary map.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    by_id: HashMap<String, Channel>,
    id_by_name: HashMap<String, String>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record by id, keeping the name index in step.
    ///
    /// If the record was renamed, the old name entry is dropped when it still
    /// pointed at this id.
    pub fn upsert(&mut self, channel: Channel) -> &Channel {
        if let Some(old) = self.by_id.get(&channel.id)
            && old.name != channel.name
            && self.id_by_name.get(&old.name) == Some(&channel.id)
        {
            self.id_by_name.remove(&old.name);
        }
        if !channel.name.is_empty() {
            self.id_by_name.insert(channel.name.clone(), channel.id.clone());
        }
        let id = channel.id.clone();
        self.by_id.insert(id.clone(), channel);
        &self.by_id[&id]
    }

    /// Mutate an existing record in place. Unknown ids are left alone.
    ///
    /// `f` must not change `id` or `name`; renames go through [`upsert`](Self::upsert).
    pub fn update(&mut self, id: &str, f: impl FnOnce(&mut Channel)) -> Option<&Channel> {
        let channel = self.by_id.get_mut(id)?;
        f(channel);
        Some(&*channel)
    }

    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.by_id.get(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Channel> {
        self.id_by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.id_by_name.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.by_id.values()
    }
}
