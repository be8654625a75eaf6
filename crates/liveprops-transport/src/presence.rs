//! Presence state reconciliation
//!
//! The server describes who is present on a topic with two events:
//!
//! - `presence_state`: the full mapping `id -> { metas: [...] }`
//! - `presence_diff`: `{ joins, leaves }` in the same shape
//!
//! Every meta carries a server-assigned `phx_ref`; metas are matched by that
//! ref, never by content. A single id may have several metas (one per tab or
//! device). Diffs that arrive before the first full state after a join are
//! buffered and replayed once the state lands.

use indexmap::IndexMap;
use liveprops_core::{lookup_field, Payload};
use serde::{Deserialize, Serialize};

/// Event carrying the full presence state
pub const PRESENCE_STATE_EVENT: &str = "presence_state";

/// Event carrying a presence diff
pub const PRESENCE_DIFF_EVENT: &str = "presence_diff";

/// One opaque metadata record
pub type Meta = Payload;

/// All metas for one present id
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// Metadata records, oldest first
    #[serde(default)]
    pub metas: Vec<Meta>,
}

impl PresenceEntry {
    /// Entry with the given metas
    pub fn new(metas: Vec<Meta>) -> Self {
        Self { metas }
    }

    fn refs(&self) -> Vec<Option<&Payload>> {
        self.metas.iter().map(phx_ref).collect()
    }
}

/// Ordered mapping of present id to its metas
pub type PresenceState = IndexMap<String, PresenceEntry>;

/// Incremental presence change
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PresenceDiff {
    /// Metas that joined, per id
    #[serde(default)]
    pub joins: PresenceState,
    /// Metas that left, per id
    #[serde(default)]
    pub leaves: PresenceState,
}

/// One join or leave observed while applying state or a diff
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceChange {
    /// Metas joined for `id`
    Join {
        /// Present id
        id: String,
        /// Entry before the join, if the id was already present
        current: Option<PresenceEntry>,
        /// The joining metas
        joined: PresenceEntry,
    },
    /// Metas left for `id`
    Leave {
        /// Present id
        id: String,
        /// Entry after removing the leaving metas
        current: PresenceEntry,
        /// The leaving metas
        left: PresenceEntry,
    },
}

fn phx_ref(meta: &Meta) -> Option<&Payload> {
    lookup_field(meta, "phx_ref")
}

/// Reconcile `state` against a full server state.
///
/// Computes the joins and leaves implied by `new_state` and applies them with
/// [`sync_diff`].
pub fn sync_state(
    state: &PresenceState,
    new_state: PresenceState,
) -> (PresenceState, Vec<PresenceChange>) {
    let mut diff = PresenceDiff::default();

    for (id, presence) in state {
        if !new_state.contains_key(id) {
            diff.leaves.insert(id.clone(), presence.clone());
        }
    }

    for (id, new_presence) in new_state {
        match state.get(&id) {
            Some(current) => {
                let new_refs = new_presence.refs();
                let current_refs = current.refs();
                let joined: Vec<Meta> = new_presence
                    .metas
                    .iter()
                    .filter(|meta| !current_refs.contains(&phx_ref(meta)))
                    .cloned()
                    .collect();
                let left: Vec<Meta> = current
                    .metas
                    .iter()
                    .filter(|meta| !new_refs.contains(&phx_ref(meta)))
                    .cloned()
                    .collect();
                if !joined.is_empty() {
                    diff.joins.insert(id.clone(), PresenceEntry::new(joined));
                }
                if !left.is_empty() {
                    diff.leaves.insert(id, PresenceEntry::new(left));
                }
            }
            None => {
                diff.joins.insert(id, new_presence);
            }
        }
    }

    sync_diff(state.clone(), diff)
}

/// Apply a diff to `state`.
///
/// Joins keep any existing metas whose ref is not re-announced, ahead of the
/// joined ones. Leaves drop metas by ref and remove ids left with no metas.
pub fn sync_diff(
    mut state: PresenceState,
    diff: PresenceDiff,
) -> (PresenceState, Vec<PresenceChange>) {
    let mut changes = Vec::with_capacity(diff.joins.len() + diff.leaves.len());

    for (id, joined) in diff.joins {
        let current = state.get(&id).cloned();
        let mut entry = joined.clone();
        if let Some(current) = &current {
            let joined_refs = entry.refs();
            let mut kept: Vec<Meta> = current
                .metas
                .iter()
                .filter(|meta| !joined_refs.contains(&phx_ref(meta)))
                .cloned()
                .collect();
            kept.append(&mut entry.metas);
            entry.metas = kept;
        }
        state.insert(id.clone(), entry);
        changes.push(PresenceChange::Join {
            id,
            current,
            joined,
        });
    }

    for (id, left) in diff.leaves {
        let Some(current) = state.get_mut(&id) else {
            continue;
        };
        let refs_to_remove = left.refs();
        current
            .metas
            .retain(|meta| !refs_to_remove.contains(&phx_ref(meta)));
        let remaining = current.clone();
        if remaining.metas.is_empty() {
            state.shift_remove(&id);
        }
        changes.push(PresenceChange::Leave {
            id,
            current: remaining,
            left,
        });
    }

    (state, changes)
}

/// Result of feeding one event to a [`PresenceTracker`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackerOutcome {
    /// Joins and leaves applied by this event, in order
    pub changes: Vec<PresenceChange>,
    /// Whether the visible state was updated (false while diffs are buffered)
    pub synced: bool,
}

/// Client-side presence state for one channel
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    state: PresenceState,
    pending_diffs: Vec<PresenceDiff>,
    awaiting_state: bool,
}

impl PresenceTracker {
    /// Tracker waiting for its first `presence_state`
    pub fn new() -> Self {
        Self {
            state: PresenceState::new(),
            pending_diffs: Vec::new(),
            awaiting_state: true,
        }
    }

    /// Current presence state
    pub fn state(&self) -> &PresenceState {
        &self.state
    }

    /// Whether diffs are being buffered until the next full state
    pub fn is_awaiting_state(&self) -> bool {
        self.awaiting_state
    }

    /// A new join is in flight: buffer diffs until the server sends a full
    /// state for it.
    pub fn begin_join(&mut self) {
        self.awaiting_state = true;
        self.pending_diffs.clear();
    }

    /// Apply a full state, then replay buffered diffs
    pub fn apply_state(&mut self, new_state: PresenceState) -> TrackerOutcome {
        let (state, mut changes) = sync_state(&self.state, new_state);
        self.state = state;
        for diff in std::mem::take(&mut self.pending_diffs) {
            let (state, diff_changes) = sync_diff(std::mem::take(&mut self.state), diff);
            self.state = state;
            changes.extend(diff_changes);
        }
        self.awaiting_state = false;
        TrackerOutcome {
            changes,
            synced: true,
        }
    }

    /// Apply a diff, or buffer it while awaiting a full state
    pub fn apply_diff(&mut self, diff: PresenceDiff) -> TrackerOutcome {
        if self.awaiting_state {
            self.pending_diffs.push(diff);
            return TrackerOutcome::default();
        }
        let (state, changes) = sync_diff(std::mem::take(&mut self.state), diff);
        self.state = state;
        TrackerOutcome {
            changes,
            synced: true,
        }
    }

    /// Project the state into `(id, metas)` pairs
    pub fn list(&self) -> Vec<(String, Vec<Meta>)> {
        self.state
            .iter()
            .map(|(id, entry)| (id.clone(), entry.metas.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(refs: &[&str]) -> PresenceEntry {
        PresenceEntry::new(
            refs.iter()
                .map(|r| json!({"phx_ref": r, "online_at": 1}))
                .collect(),
        )
    }

    /// `refs` is a comma separated list of `phx_ref`s
    fn state(entries: &[(&str, &str)]) -> PresenceState {
        entries
            .iter()
            .map(|(id, refs)| {
                let refs: Vec<&str> = refs.split(',').collect();
                (id.to_string(), entry(&refs))
            })
            .collect()
    }

    #[test]
    fn test_sync_state_from_empty_joins_everyone() {
        let (next, changes) = sync_state(&PresenceState::new(), state(&[("u1", "1"), ("u2", "2")]));

        assert_eq!(next.len(), 2);
        assert_eq!(changes.len(), 2);
        assert!(matches!(&changes[0], PresenceChange::Join { id, current: None, .. } if id == "u1"));
    }

    #[test]
    fn test_sync_state_detects_leaves_and_new_metas() {
        let current = state(&[("u1", "1"), ("u2", "2")]);
        let (next, changes) = sync_state(&current, state(&[("u1", "1,1b")]));

        assert_eq!(next.keys().collect::<Vec<_>>(), vec!["u1"]);
        assert_eq!(next["u1"].metas.len(), 2);
        assert!(changes.iter().any(
            |c| matches!(c, PresenceChange::Leave { id, current, .. } if id == "u2" && current.metas.is_empty())
        ));
        assert!(changes.iter().any(
            |c| matches!(c, PresenceChange::Join { id, joined, .. } if id == "u1" && joined.metas.len() == 1)
        ));
    }

    #[test]
    fn test_sync_diff_keeps_other_devices() {
        let current = state(&[("u1", "a,b")]);
        let diff = PresenceDiff {
            joins: PresenceState::new(),
            leaves: state(&[("u1", "a")]),
        };

        let (next, changes) = sync_diff(current, diff);

        assert_eq!(next["u1"], entry(&["b"]));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_sync_diff_removes_empty_entries() {
        let diff = PresenceDiff {
            joins: PresenceState::new(),
            leaves: state(&[("u1", "a")]),
        };
        let (next, _) = sync_diff(state(&[("u1", "a")]), diff);
        assert!(next.is_empty());
    }

    #[test]
    fn test_leave_for_unknown_id_is_ignored() {
        let diff = PresenceDiff {
            joins: PresenceState::new(),
            leaves: state(&[("ghost", "x")]),
        };
        let (next, changes) = sync_diff(PresenceState::new(), diff);
        assert!(next.is_empty());
        assert!(changes.is_empty());
    }

    #[test]
    fn test_diffs_buffer_until_state_arrives() {
        let mut tracker = PresenceTracker::new();
        let outcome = tracker.apply_diff(PresenceDiff {
            joins: state(&[("u2", "2")]),
            leaves: PresenceState::new(),
        });
        assert!(!outcome.synced);
        assert!(tracker.state().is_empty());

        let outcome = tracker.apply_state(state(&[("u1", "1")]));
        assert!(outcome.synced);
        assert_eq!(tracker.state().len(), 2);
        assert!(!tracker.is_awaiting_state());

        let outcome = tracker.apply_diff(PresenceDiff {
            joins: PresenceState::new(),
            leaves: state(&[("u1", "1")]),
        });
        assert!(outcome.synced);
        assert_eq!(tracker.list(), vec![("u2".to_string(), entry(&["2"]).metas)]);
    }

    #[test]
    fn test_rejoin_reconciles_against_previous_state() {
        let mut tracker = PresenceTracker::new();
        tracker.apply_state(state(&[("u1", "1"), ("u2", "2")]));

        tracker.begin_join();
        assert!(tracker.is_awaiting_state());
        let outcome = tracker.apply_diff(PresenceDiff {
            joins: state(&[("u3", "3")]),
            leaves: PresenceState::new(),
        });
        assert!(!outcome.synced);
        assert_eq!(tracker.state().len(), 2);

        let outcome = tracker.apply_state(state(&[("u2", "2")]));
        let ids: Vec<(&str, bool)> = outcome
            .changes
            .iter()
            .map(|change| match change {
                PresenceChange::Join { id, .. } => (id.as_str(), true),
                PresenceChange::Leave { id, .. } => (id.as_str(), false),
            })
            .collect();
        assert_eq!(ids, vec![("u1", false), ("u3", true)]);
        assert_eq!(tracker.state().keys().collect::<Vec<_>>(), vec!["u2", "u3"]);
    }

    #[test]
    fn test_wire_format() {
        let diff: PresenceDiff = serde_json::from_value(json!({
            "joins": {"u1": {"metas": [{"phx_ref": "r1", "name": "ann"}]}}
        }))
        .unwrap();
        assert_eq!(diff.joins["u1"].metas[0]["name"], "ann");
        assert!(diff.leaves.is_empty());
    }
}
