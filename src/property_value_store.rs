use chrono::Utc;
use std::{collections::HashMap, ops::Deref};

use crate::{PropertyCode, PropertyValue, PropertyValueEntry, ValueUpdate};

/// Last known values of one appliance's properties, as seen by the coordinator.
#[derive(Default, Clone, Debug)]
pub struct PropertyValueStore(HashMap<PropertyCode, PropertyValueEntry>);

impl Deref for PropertyValueStore {
    type Target = HashMap<PropertyCode, PropertyValueEntry>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PropertyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_value(
        &mut self,
        code: PropertyCode,
        value: PropertyValue,
    ) -> ValueUpdate<PropertyValue> {
        let now = Utc::now();
        let entry = self.0.entry(code).or_default();
        entry.last_received = Some(now);
        if entry.value.as_ref() != Some(&value) {
            let old = entry.value.replace(value.clone());
            entry.last_changed = Some(now);
            ValueUpdate::Changed {
                old,
                new: value,
                changed_at: now,
            }
        } else {
            ValueUpdate::Equal {
                last_received: now,
                last_changed: entry.last_changed,
            }
        }
    }

    pub fn get_value(&self, code: &PropertyCode) -> Option<&PropertyValue> {
        self.0.get(code).and_then(|entry| entry.value.as_ref())
    }

    pub fn get_value_entry(&self, code: &PropertyCode) -> Option<&PropertyValueEntry> {
        self.0.get(code)
    }
}
