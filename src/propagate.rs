use std::sync::Arc;

use crate::{ApplianceWrapper, Entity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Publishes the current state of each entity.
///
/// Entities the host has not attached yet, or that are disabled, are skipped.
/// A failing entity is logged and does not stop the others.
pub fn publish_entities<'a, I>(entities: I) -> PublishSummary
where
    I: IntoIterator<Item = &'a Arc<dyn Entity>>,
{
    let mut summary = PublishSummary::default();
    for entity in entities {
        if !entity.is_attached() {
            log::debug!(
                "Entity {} not yet attached, skipping update...",
                entity.unique_id()
            );
            summary.skipped += 1;
            continue;
        }
        if !entity.is_enabled() {
            summary.skipped += 1;
            continue;
        }
        match entity.publish_state() {
            Ok(()) => summary.published += 1,
            Err(err) => {
                log::warn!("Could not refresh state for {}: {}", entity.unique_id(), err);
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Publishes every entity of every given wrapper.
pub fn publish_all(wrappers: &[Arc<ApplianceWrapper>]) -> PublishSummary {
    publish_entities(wrappers.iter().flat_map(|w| w.entities().iter()))
}
