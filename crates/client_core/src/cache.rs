//! In-memory mirror of the remote lead table.
//!
//! The cache never performs remote calls. Its mutation functions are pure
//! local transformations applied only after the corresponding remote write
//! has already been confirmed.

use shared::{
    domain::{LeadId, LeadStatus},
    protocol::LeadRecord,
};

#[derive(Debug, Clone, Default)]
pub struct LeadCache {
    entries: Vec<LeadRecord>,
}

impl LeadCache {
    /// Wholesale replacement with a freshly fetched set. Stale entries are
    /// discarded; the fetched set arrives ordered newest first.
    pub fn replace_all(&mut self, leads: Vec<LeadRecord>) {
        self.entries = leads;
    }

    /// Inserts a record preserving descending `created_at` order. An entry
    /// with the same id is replaced in place.
    pub fn apply_insert(&mut self, lead: LeadRecord) {
        if let Some(existing) = self.entries.iter_mut().find(|entry| entry.id == lead.id) {
            *existing = lead;
            return;
        }
        let position = self
            .entries
            .iter()
            .position(|entry| entry.created_at <= lead.created_at)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, lead);
    }

    /// Patches only the `status` field of the matching record; its position
    /// and every other field stay untouched. Returns false if absent.
    pub fn apply_status_patch(&mut self, id: LeadId, status: LeadStatus) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    /// Removes the matching record. Idempotent: removing an absent id is a
    /// no-op and returns false.
    pub fn apply_removal(&mut self, id: LeadId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub fn get(&self, id: LeadId) -> Option<&LeadRecord> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn snapshot(&self) -> Vec<LeadRecord> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
