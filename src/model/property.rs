use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric code addressing one property of an appliance, written as `0x5B13`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyCode(u16);

impl PropertyCode {
    pub const MODEL_NUMBER: PropertyCode = PropertyCode(0x0001);
    pub const SERIAL_NUMBER: PropertyCode = PropertyCode(0x0002);
    pub const CLOCK_TIME: PropertyCode = PropertyCode(0x0005);
    pub const APPLIANCE_TYPE: PropertyCode = PropertyCode(0x0008);
    pub const SABBATH_MODE: PropertyCode = PropertyCode(0x0009);
    pub const BRAND: PropertyCode = PropertyCode(0x0035);
    pub const WIFI_MODULE_SW_VERSION: PropertyCode = PropertyCode(0x0099);
    pub const APPLIANCE_SW_VERSION: PropertyCode = PropertyCode(0x0100);
    pub const HAIER_HOOD_FAN_SPEED: PropertyCode = PropertyCode(0x5B13);
    pub const HAIER_HOOD_LIGHT: PropertyCode = PropertyCode(0x5B17);

    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub const fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for PropertyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid property code: [{0}]")]
pub struct InvalidPropertyCode(pub String);

impl FromStr for PropertyCode {
    type Err = InvalidPropertyCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u16::from_str_radix(digits, 16)
            .map(PropertyCode)
            .map_err(|_| InvalidPropertyCode(s.to_owned()))
    }
}

/// A decoded, typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Enum { raw: u8, label: String },
    Raw(Vec<u8>),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text),
            PropertyValue::Enum { label, .. } => Some(label),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            PropertyValue::Enum { raw, .. } => Some(i64::from(*raw)),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Text(t) => f.write_str(t),
            PropertyValue::Enum { label, .. } => f.write_str(label),
            PropertyValue::Raw(bytes) => {
                for b in bytes {
                    write!(f, "{:02X}", b)?;
                }
                Ok(())
            }
        }
    }
}
