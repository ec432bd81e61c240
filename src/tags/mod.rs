pub mod report;
pub mod roster;

pub use roster::TagRoster;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Fixed Gen-2 bank sizes for the readers this crate supports.
pub const EPC_LENGTH: usize = 12;
pub const TID_LENGTH: usize = 12;
pub const RFU_LENGTH: usize = 8;
pub const USER_LENGTH: usize = 64;

/// The user bank is read and written in 16-byte blocks ("datagrams"),
/// one per 8-word window.
pub const NUM_USER_DATAGRAMS: usize = 4;

/// How long the current tag survives without any bank update before the
/// watchdog declares it gone from the field.
pub const CURRENT_TAG_TIMEOUT: Duration = Duration::from_millis(1000);

/// A tag memory bank field, used to address slots on a [`TagRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagField {
    Epc,
    Tid,
    Rfu,
    User(usize),
}

/// Everything we know so far about one physical tag.
///
/// Fields start out empty and are filled in over successive partial reads;
/// an empty field means "not yet observed", never "observed to be empty".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    pub id: Uuid,
    pub epc: Vec<u8>,
    pub tid: Vec<u8>,
    pub rfu: Vec<u8>,
    pub user: [Vec<u8>; NUM_USER_DATAGRAMS],
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl TagRecord {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            epc: Vec::new(),
            tid: Vec::new(),
            rfu: Vec::new(),
            user: Default::default(),
            first_seen: now,
            last_seen: now,
        }
    }

    /// A record is identified once it carries either a TID or an EPC.
    pub fn identified(&self) -> bool {
        !self.tid.is_empty() || !self.epc.is_empty()
    }

    /// All four user datagrams concatenated in index order.
    pub fn user_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for datagram in &self.user {
            data.extend_from_slice(datagram);
        }
        data
    }

    pub(crate) fn field(&self, field: TagField) -> &[u8] {
        match field {
            TagField::Epc => &self.epc,
            TagField::Tid => &self.tid,
            TagField::Rfu => &self.rfu,
            TagField::User(datagram) => &self.user[datagram],
        }
    }

    pub(crate) fn set_field(&mut self, field: TagField, payload: &[u8]) {
        let slot = match field {
            TagField::Epc => &mut self.epc,
            TagField::Tid => &mut self.tid,
            TagField::Rfu => &mut self.rfu,
            TagField::User(datagram) => &mut self.user[datagram],
        };
        slot.clear();
        slot.extend_from_slice(payload);
        self.last_seen = Utc::now();
    }
}

impl Default for TagRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Change notifications produced by the roster, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagEvent {
    /// Data on an existing record changed.
    TagUpdated,
    /// A record was added to or removed from the history.
    TagCountChanged,
    /// A different record (or no record) is now the current tag.
    CurrentTagChanged,
}
