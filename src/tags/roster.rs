//! Fusion of partial bank readings into coherent tag records.
//!
//! The roster owns the full tag history and the notion of a "current" tag,
//! the one believed to be in the RF field right now. Bank events refine the
//! current record field by field; a conflicting observation starts a new
//! record. A monostable watchdog clears the current tag after a second of
//! silence while the history survives until the operator clears it.

use log::debug;
use std::time::Instant;
use uuid::Uuid;

use crate::reader::BankEvent;

use super::{TagEvent, TagField, TagRecord, CURRENT_TAG_TIMEOUT};

pub struct TagRoster {
    tags: Vec<TagRecord>,
    current: Option<Uuid>,
    deadline: Option<Instant>,
}

impl TagRoster {
    pub fn new() -> Self {
        Self {
            tags: Vec::new(),
            current: None,
            deadline: None,
        }
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn history(&self) -> &[TagRecord] {
        &self.tags
    }

    pub fn current_tag(&self) -> Option<&TagRecord> {
        let id = self.current?;
        self.tags.iter().find(|tag| tag.id == id)
    }

    /// Forget everything: history, current tag, and re-arm the watchdog.
    pub fn clear(&mut self, now: Instant) -> Vec<TagEvent> {
        self.tags.clear();
        self.current = None;
        self.deadline = Some(now + CURRENT_TAG_TIMEOUT);
        vec![TagEvent::CurrentTagChanged, TagEvent::TagCountChanged]
    }

    /// Check the liveness watchdog. When it expires the current tag is
    /// dropped (history retained) and the timer re-arms.
    pub fn poll_watchdog(&mut self, now: Instant) -> Vec<TagEvent> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                debug!("current tag timed out");
                self.current = None;
                self.deadline = Some(now + CURRENT_TAG_TIMEOUT);
                vec![TagEvent::CurrentTagChanged]
            }
            _ => Vec::new(),
        }
    }

    /// Fuse one bank event into the roster.
    pub fn apply(&mut self, event: &BankEvent, now: Instant) -> Vec<TagEvent> {
        self.deadline = Some(now + CURRENT_TAG_TIMEOUT);

        let (field, payload) = match event {
            BankEvent::Epc(payload) => (TagField::Epc, payload.as_slice()),
            BankEvent::Tid(payload) => (TagField::Tid, payload.as_slice()),
            BankEvent::Rfu(payload) => (TagField::Rfu, payload.as_slice()),
            BankEvent::User(payload, datagram) => {
                (TagField::User(*datagram), payload.as_slice())
            }
        };

        let mut out = Vec::new();

        let current_index = self
            .current
            .and_then(|id| self.tags.iter().position(|tag| tag.id == id));

        let canonical = match current_index {
            None => {
                let mut record = TagRecord::new();
                record.set_field(field, payload);
                let id = record.id;
                debug!("tracking new tag {id}");
                self.tags.push(record);
                out.push(TagEvent::TagCountChanged);
                id
            }
            Some(index) => {
                let known = self.tags[index].field(field);
                if !known.is_empty() && known != payload {
                    // Conflicting observation: a different tag has entered
                    // the field.
                    let mut record = TagRecord::new();
                    record.set_field(field, payload);
                    debug!("bank data conflicts with current tag, starting record {}", record.id);
                    self.merge_new(record, &mut out)
                } else {
                    if known != payload {
                        self.tags[index].set_field(field, payload);
                        out.push(TagEvent::TagUpdated);
                    }
                    let id = self.tags[index].id;
                    self.merge_existing(id, &mut out)
                }
            }
        };

        if self.current != Some(canonical) {
            self.current = Some(canonical);
            out.push(TagEvent::CurrentTagChanged);
        }
        out
    }

    /// History-merge for a record not yet part of the history. Returns the
    /// id of the canonical record afterwards.
    fn merge_new(&mut self, record: TagRecord, out: &mut Vec<TagEvent>) -> Uuid {
        let canonical = match self.find_sibling(&record, record.id) {
            Some(index) => {
                let id = self.tags[index].id;
                Self::fold_into(&mut self.tags[index], &record, out);
                id
            }
            None => {
                let id = record.id;
                self.tags.push(record);
                out.push(TagEvent::TagCountChanged);
                id
            }
        };
        self.dedup_sweep(canonical, out)
    }

    /// History-merge for a record already stored under `id`. When an older
    /// entry shares its identity the record is folded into that entry and
    /// removed from the history.
    fn merge_existing(&mut self, id: Uuid, out: &mut Vec<TagEvent>) -> Uuid {
        let index = match self.tags.iter().position(|tag| tag.id == id) {
            Some(index) => index,
            None => return id,
        };
        let sibling_id = self
            .tags
            .iter()
            .find(|tag| tag.id != id && shares_identity(tag, &self.tags[index]))
            .map(|tag| tag.id);

        let canonical = match sibling_id {
            Some(sibling_id) => {
                let record = self.tags.remove(index);
                out.push(TagEvent::TagCountChanged);
                if let Some(sibling) = self.tags.iter().position(|tag| tag.id == sibling_id) {
                    Self::fold_into(&mut self.tags[sibling], &record, out);
                }
                sibling_id
            }
            None => id,
        };
        self.dedup_sweep(canonical, out)
    }

    /// First history entry other than `skip` sharing a non-empty EPC or a
    /// non-empty TID with `record`.
    fn find_sibling(&self, record: &TagRecord, skip: Uuid) -> Option<usize> {
        self.tags
            .iter()
            .position(|tag| tag.id != skip && shares_identity(tag, record))
    }

    /// Copy every non-empty field of `record` into `target`.
    fn fold_into(target: &mut TagRecord, record: &TagRecord, out: &mut Vec<TagEvent>) {
        let mut changed = false;
        for field in [TagField::Epc, TagField::Tid, TagField::Rfu]
            .into_iter()
            .chain((0..record.user.len()).map(TagField::User))
        {
            let source = record.field(field);
            if !source.is_empty() && target.field(field) != source {
                target.set_field(field, source);
                changed = true;
            }
        }
        if changed {
            out.push(TagEvent::TagUpdated);
        }
    }

    /// Remove later duplicates of earlier entries (equal non-empty TID).
    /// `canonical` and the current pointer are redirected to the surviving
    /// entry when their record is swept away.
    fn dedup_sweep(&mut self, mut canonical: Uuid, out: &mut Vec<TagEvent>) -> Uuid {
        let mut keep_index = 0;
        while keep_index < self.tags.len() {
            let mut probe = keep_index + 1;
            while probe < self.tags.len() {
                let duplicate = {
                    let keeper = &self.tags[keep_index];
                    let candidate = &self.tags[probe];
                    !keeper.tid.is_empty() && keeper.tid == candidate.tid
                };
                if duplicate {
                    let removed = self.tags.remove(probe);
                    let survivor = self.tags[keep_index].id;
                    if removed.id == canonical {
                        canonical = survivor;
                    }
                    if self.current == Some(removed.id) {
                        self.current = Some(survivor);
                    }
                    out.push(TagEvent::TagCountChanged);
                } else {
                    probe += 1;
                }
            }
            keep_index += 1;
        }
        canonical
    }
}

impl Default for TagRoster {
    fn default() -> Self {
        Self::new()
    }
}

fn shares_identity(a: &TagRecord, b: &TagRecord) -> bool {
    (!a.epc.is_empty() && a.epc == b.epc) || (!a.tid.is_empty() && a.tid == b.tid)
}
