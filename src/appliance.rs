use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
};

use serde::Serialize;

use crate::{
    ApplianceId, ApplianceKind, ApplianceRef, Brand, Entity, PropertyCode, PropertyValue,
    PropertyValueStore,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifier: ApplianceId,
    pub name: String,
    pub manufacturer: String,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub sw_version: String,
}

/// Long lived handle for one physical appliance.
///
/// Survives reconnects: the session scoped [`ApplianceRef`] behind it is
/// swapped when the appliance reappears in a new session.
pub struct ApplianceWrapper {
    id: ApplianceId,
    appliance: RwLock<ApplianceRef>,
    initialized: AtomicBool,
    entities: Vec<Arc<dyn Entity>>,
    properties: Mutex<PropertyValueStore>,
}

impl ApplianceWrapper {
    pub fn new(appliance: ApplianceRef, entities: Vec<Arc<dyn Entity>>) -> Self {
        let mut seen = HashSet::new();
        let entities = entities
            .into_iter()
            .filter(|e| seen.insert(e.unique_id().to_owned()))
            .collect();
        Self {
            id: appliance.id().clone(),
            initialized: AtomicBool::new(appliance.is_initialized()),
            appliance: RwLock::new(appliance),
            entities,
            properties: Mutex::new(PropertyValueStore::new()),
        }
    }

    pub fn id(&self) -> &ApplianceId {
        &self.id
    }

    /// The appliance object of the current session.
    pub fn appliance(&self) -> ApplianceRef {
        self.appliance
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Points this wrapper at the appliance object of a new session.
    pub fn replace_appliance(&self, appliance: ApplianceRef) {
        self.initialized
            .store(appliance.is_initialized(), Ordering::SeqCst);
        *self
            .appliance
            .write()
            .unwrap_or_else(PoisonError::into_inner) = appliance;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub(crate) fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::SeqCst);
    }

    pub fn entities(&self) -> &[Arc<dyn Entity>] {
        &self.entities
    }

    pub fn kind(&self) -> ApplianceKind {
        self.appliance().kind().unwrap_or(ApplianceKind::Unknown)
    }

    /// Current value of a property, read through the session's appliance object.
    pub fn property(&self, code: &PropertyCode) -> Option<PropertyValue> {
        self.appliance().property(code)
    }

    /// Records pushed property changes; returns the codes whose value actually changed.
    pub fn record_changes(
        &self,
        changes: impl IntoIterator<Item = (PropertyCode, PropertyValue)>,
    ) -> Vec<PropertyCode> {
        let mut store = self
            .properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        changes
            .into_iter()
            .filter_map(|(code, value)| {
                store.store_value(code, value).is_changed().then_some(code)
            })
            .collect()
    }

    pub fn property_values(&self) -> PropertyValueStore {
        self.properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn text_property(&self, code: &PropertyCode) -> Option<String> {
        self.property(code)
            .and_then(|v| v.as_text().map(str::to_owned))
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
    }

    pub fn model_number(&self) -> Option<String> {
        self.text_property(&PropertyCode::MODEL_NUMBER)
    }

    pub fn serial_number(&self) -> Option<String> {
        self.text_property(&PropertyCode::SERIAL_NUMBER)
    }

    /// Serial number unless it is blank or all zeros, otherwise the MAC address.
    pub fn serial_or_mac(&self) -> String {
        match self.serial_number() {
            Some(serial) if !serial.chars().all(|c| c == '0') => serial,
            _ => self.id.to_string(),
        }
    }

    pub fn brand(&self) -> Brand {
        let reported = self
            .property(&PropertyCode::BRAND)
            .and_then(|v| v.as_text().and_then(Brand::from_label))
            .filter(|b| *b != Brand::Unknown);
        reported
            .or_else(|| self.model_number().as_deref().and_then(Brand::infer_from_model))
            .unwrap_or(Brand::Ge)
    }

    pub fn name(&self) -> String {
        format!(
            "{} {} {}",
            self.brand().display_name(),
            self.kind().title(),
            self.serial_or_mac()
        )
    }

    pub fn sw_version(&self) -> String {
        let appliance = self.text_property(&PropertyCode::APPLIANCE_SW_VERSION);
        let wifi = self.text_property(&PropertyCode::WIFI_MODULE_SW_VERSION);
        format!(
            "Appliance={}/Wifi={}",
            appliance.as_deref().unwrap_or("Unknown"),
            wifi.as_deref().unwrap_or("Unknown")
        )
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            identifier: self.id.clone(),
            name: self.name(),
            manufacturer: self.brand().display_name().to_owned(),
            model: self.model_number(),
            serial_number: self.serial_number(),
            sw_version: self.sw_version(),
        }
    }
}

impl fmt::Debug for ApplianceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplianceWrapper")
            .field("id", &self.id)
            .field("initialized", &self.is_initialized())
            .field("entities", &self.entities.len())
            .finish()
    }
}
