use std::collections::{BTreeSet, HashSet};

use crate::ApplianceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The gate opened with this call.
    Fired,
    Pending,
    AlreadyFired,
}

/// One-shot barrier of a single session.
///
/// Opens once a roster was received and every appliance listed in it has
/// delivered its first snapshot, or when forced. A fresh gate is created for
/// every session; an open gate never closes again.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    roster: Option<BTreeSet<ApplianceId>>,
    initialized: HashSet<ApplianceId>,
    fired: bool,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the (possibly re-sent) roster and re-evaluates the gate.
    pub fn roster_received(&mut self, roster: BTreeSet<ApplianceId>) -> GateDecision {
        self.roster = Some(roster);
        self.evaluate()
    }

    pub fn appliance_ready(&mut self, id: ApplianceId) -> GateDecision {
        self.initialized.insert(id);
        self.evaluate()
    }

    /// Opens the gate regardless of missing snapshots.
    pub fn force_open(&mut self) -> GateDecision {
        if self.fired {
            return GateDecision::AlreadyFired;
        }
        self.fired = true;
        GateDecision::Fired
    }

    fn evaluate(&mut self) -> GateDecision {
        if self.fired {
            return GateDecision::AlreadyFired;
        }
        if self.all_initialized() {
            self.fired = true;
            GateDecision::Fired
        } else {
            GateDecision::Pending
        }
    }

    fn all_initialized(&self) -> bool {
        self.roster
            .as_ref()
            .map(|roster| roster.iter().all(|id| self.initialized.contains(id)))
            .unwrap_or(false)
    }

    pub fn is_ready(&self) -> bool {
        self.fired
    }

    pub fn has_roster(&self) -> bool {
        self.roster.is_some()
    }

    pub fn roster(&self) -> Option<&BTreeSet<ApplianceId>> {
        self.roster.as_ref()
    }

    /// Roster entries still waiting for their first snapshot.
    pub fn missing(&self) -> Vec<ApplianceId> {
        self.roster
            .iter()
            .flatten()
            .filter(|id| !self.initialized.contains(*id))
            .cloned()
            .collect()
    }
}
