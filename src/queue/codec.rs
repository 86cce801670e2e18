use hashbrown::HashSet;

use crate::{mutation::MutationRecord, types::MutationId};

/// Decodes the persisted array, salvaging what it can.
///
/// Unparsable bytes yield an empty queue. Individual entries that fail to
/// decode are skipped, and a repeated id keeps its first occurrence.
pub(crate) fn decode_records(raw: &[u8]) -> Vec<MutationRecord> {
    let entries: Vec<serde_json::Value> = match serde_json::from_slice(raw) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(error = %err, "offline queue unreadable, treating as empty");
            return Vec::new();
        }
    };

    let mut seen: HashSet<MutationId> = HashSet::with_capacity(entries.len());
    let mut out = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<MutationRecord>(entry) {
            Ok(rec) => {
                if seen.insert(rec.id()) {
                    out.push(rec);
                } else {
                    tracing::warn!(mutation_id = %rec.id(), "duplicate queue entry dropped");
                }
            }
            Err(err) => {
                tracing::warn!(index = idx, error = %err, "skipping undecodable queue entry");
            }
        }
    }
    out
}

pub(crate) fn encode_records(records: &[MutationRecord]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(records)
}
