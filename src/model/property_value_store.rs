use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PropertyValue;

pub enum ValueUpdate<T> {
    Equal {
        last_received: DateTime<Utc>,
        last_changed: Option<DateTime<Utc>>,
    },
    Changed {
        old: Option<T>,
        new: T,
        changed_at: DateTime<Utc>,
    },
}

impl<T> ValueUpdate<T> {
    pub fn is_changed(&self) -> bool {
        matches!(self, ValueUpdate::Changed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertyValueEntry {
    pub value: Option<PropertyValue>,
    pub last_received: Option<DateTime<Utc>>,
    pub last_changed: Option<DateTime<Utc>>,
}
