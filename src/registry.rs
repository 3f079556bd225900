use std::{
    collections::{btree_map::Keys, BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::{ApplianceId, ApplianceRef, ApplianceWrapper, Entity};

pub enum RegistryUpdate {
    Added(Arc<ApplianceWrapper>),
    Reassociated(Arc<ApplianceWrapper>),
}

impl RegistryUpdate {
    pub fn wrapper(&self) -> &Arc<ApplianceWrapper> {
        match self {
            RegistryUpdate::Added(w) | RegistryUpdate::Reassociated(w) => w,
        }
    }
}

pub enum ApplianceRemove {
    Removed(Arc<ApplianceWrapper>),
    NotFound,
}

/// One wrapper per appliance identity for the lifetime of the integration.
#[derive(Default, Debug)]
pub struct ApplianceRegistry(BTreeMap<ApplianceId, Arc<ApplianceWrapper>>);

impl ApplianceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a wrapper for an unknown identity, or re-points the existing
    /// wrapper at `appliance` and leaves its entities untouched.
    pub fn get_or_create<F>(&mut self, appliance: ApplianceRef, build_entities: F) -> RegistryUpdate
    where
        F: FnOnce(&ApplianceRef) -> Vec<Arc<dyn Entity>>,
    {
        if let Some(wrapper) = self.0.get(appliance.id()) {
            log::debug!(
                "Already have appliance {} ({:?}), switching reference.",
                appliance.id(),
                appliance.kind()
            );
            wrapper.replace_appliance(appliance);
            RegistryUpdate::Reassociated(wrapper.clone())
        } else {
            log::debug!(
                "Adding wrapper for appliance {} ({:?})",
                appliance.id(),
                appliance.kind()
            );
            let entities = build_entities(&appliance);
            let wrapper = Arc::new(ApplianceWrapper::new(appliance, entities));
            self.0.insert(wrapper.id().clone(), wrapper.clone());
            RegistryUpdate::Added(wrapper)
        }
    }

    pub fn remove(&mut self, id: &ApplianceId) -> ApplianceRemove {
        match self.0.remove(id) {
            Some(wrapper) => ApplianceRemove::Removed(wrapper),
            None => ApplianceRemove::NotFound,
        }
    }

    /// Removes every wrapper whose identity is not in `keep`.
    pub fn retain_only(&mut self, keep: &BTreeSet<ApplianceId>) -> Vec<Arc<ApplianceWrapper>> {
        let stale: Vec<ApplianceId> = self
            .0
            .keys()
            .filter(|id| !keep.contains(*id))
            .cloned()
            .collect();
        stale
            .iter()
            .filter_map(|id| match self.remove(id) {
                ApplianceRemove::Removed(wrapper) => Some(wrapper),
                ApplianceRemove::NotFound => None,
            })
            .collect()
    }

    pub fn get(&self, id: &ApplianceId) -> Option<&Arc<ApplianceWrapper>> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &ApplianceId) -> bool {
        self.0.contains_key(id)
    }

    /// Marks every wrapper as waiting for its first snapshot of a new session.
    pub fn mark_all_uninitialized(&mut self) {
        for wrapper in self.0.values() {
            wrapper.set_initialized(false);
        }
    }

    pub fn ids(&self) -> Keys<ApplianceId, Arc<ApplianceWrapper>> {
        self.0.keys()
    }

    pub fn wrappers(&self) -> Vec<Arc<ApplianceWrapper>> {
        self.0.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ApplianceWrapper>> {
        self.0.values()
    }

    pub fn count(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        log::debug!("Clearing all appliances!");
        self.0.clear();
    }
}
