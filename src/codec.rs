use std::{collections::HashMap, fmt, sync::Arc};

use thiserror::Error;

use crate::{Brand, PropertyCode, PropertyValue};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("Payload is not valid UTF-8 text")]
    InvalidText,
    #[error("Cannot encode [{value}] with the {codec} codec")]
    Unsupported { codec: &'static str, value: String },
    #[error("Unknown option: [{0}]")]
    UnknownOption(String),
    #[error("Value {value} does not fit into {width} bytes")]
    OutOfRange { value: i64, width: usize },
    #[error("Invalid hex payload: [{0}]")]
    InvalidHex(String),
}

/// Converts between raw property bytes and typed values.
pub trait PropertyCodec: Send + Sync + fmt::Debug {
    fn decode(&self, raw: &[u8]) -> Result<PropertyValue, CodecError>;
    fn encode(&self, value: &PropertyValue) -> Result<Vec<u8>, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolCodec;

impl PropertyCodec for BoolCodec {
    fn decode(&self, raw: &[u8]) -> Result<PropertyValue, CodecError> {
        match raw {
            [byte] => Ok(PropertyValue::Bool(*byte != 0)),
            _ => Err(CodecError::Length {
                expected: 1,
                actual: raw.len(),
            }),
        }
    }

    fn encode(&self, value: &PropertyValue) -> Result<Vec<u8>, CodecError> {
        match value {
            PropertyValue::Bool(b) => Ok(vec![u8::from(*b)]),
            PropertyValue::Int(i @ (0 | 1)) => Ok(vec![*i as u8]),
            other => Err(unsupported("bool", other)),
        }
    }
}

/// Big endian integer of a fixed width between 1 and 8 bytes.
#[derive(Debug, Clone, Copy)]
pub struct IntCodec {
    width: usize,
    signed: bool,
}

impl IntCodec {
    pub fn unsigned(width: usize) -> Self {
        Self {
            width: width.clamp(1, 8),
            signed: false,
        }
    }

    pub fn signed(width: usize) -> Self {
        Self {
            width: width.clamp(1, 8),
            signed: true,
        }
    }

    fn fits(&self, value: i64) -> bool {
        let bits = (self.width * 8) as u32;
        match (self.signed, bits) {
            (_, 64) => self.signed || value >= 0,
            (true, _) => {
                let limit = 1i64 << (bits - 1);
                (-limit..limit).contains(&value)
            }
            (false, _) => (0..(1i64 << bits)).contains(&value),
        }
    }
}

impl PropertyCodec for IntCodec {
    fn decode(&self, raw: &[u8]) -> Result<PropertyValue, CodecError> {
        if raw.len() != self.width {
            return Err(CodecError::Length {
                expected: self.width,
                actual: raw.len(),
            });
        }
        let fill = if self.signed && raw[0] & 0x80 != 0 {
            0xFF
        } else {
            0x00
        };
        let mut bytes = [fill; 8];
        bytes[8 - self.width..].copy_from_slice(raw);
        Ok(PropertyValue::Int(i64::from_be_bytes(bytes)))
    }

    fn encode(&self, value: &PropertyValue) -> Result<Vec<u8>, CodecError> {
        let int = match value {
            PropertyValue::Int(i) => *i,
            PropertyValue::Bool(b) => i64::from(*b),
            other => return Err(unsupported("int", other)),
        };
        if !self.fits(int) {
            return Err(CodecError::OutOfRange {
                value: int,
                width: self.width,
            });
        }
        Ok(int.to_be_bytes()[8 - self.width..].to_vec())
    }
}

/// UTF-8 text, trailing NUL padding is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl PropertyCodec for TextCodec {
    fn decode(&self, raw: &[u8]) -> Result<PropertyValue, CodecError> {
        let end = raw.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
        std::str::from_utf8(&raw[..end])
            .map(|text| PropertyValue::Text(text.to_owned()))
            .map_err(|_| CodecError::InvalidText)
    }

    fn encode(&self, value: &PropertyValue) -> Result<Vec<u8>, CodecError> {
        match value.as_text() {
            Some(text) => Ok(text.as_bytes().to_vec()),
            None => Err(unsupported("text", value)),
        }
    }
}

/// Single byte mapped to labelled options.
#[derive(Debug, Clone, Default)]
pub struct EnumCodec {
    options: Vec<(u8, String)>,
}

impl EnumCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn option(mut self, raw: u8, label: impl Into<String>) -> Self {
        self.options.push((raw, label.into()));
        self
    }

    pub fn label(&self, raw: u8) -> Option<&str> {
        self.options
            .iter()
            .find(|(r, _)| *r == raw)
            .map(|(_, label)| label.as_str())
    }

    /// Resolves a label, option name (`"boost"`, `"HIGH_SPEED"`), decimal
    /// digits or boolean word to its raw byte.
    pub fn resolve(&self, input: &str) -> Option<u8> {
        let wanted = normalize(input);
        if let Some((raw, _)) = self.options.iter().find(|(_, l)| normalize(l) == wanted) {
            return Some(*raw);
        }
        if let Ok(raw) = input.trim().parse::<u8>() {
            return self.label(raw).map(|_| raw);
        }
        match wanted.as_str() {
            "true" | "on" => self.label(1).map(|_| 1),
            "false" | "off" => self.label(0).map(|_| 0),
            _ => None,
        }
    }

    fn known(&self, raw: u8) -> Result<Vec<u8>, CodecError> {
        match self.label(raw) {
            Some(_) => Ok(vec![raw]),
            None => Err(CodecError::UnknownOption(raw.to_string())),
        }
    }
}

impl PropertyCodec for EnumCodec {
    fn decode(&self, raw: &[u8]) -> Result<PropertyValue, CodecError> {
        let [byte] = raw else {
            return Err(CodecError::Length {
                expected: 1,
                actual: raw.len(),
            });
        };
        let label = self
            .label(*byte)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Unknown (0x{:02X})", byte));
        Ok(PropertyValue::Enum { raw: *byte, label })
    }

    fn encode(&self, value: &PropertyValue) -> Result<Vec<u8>, CodecError> {
        match value {
            PropertyValue::Enum { raw, .. } => self.known(*raw),
            PropertyValue::Text(text) => self
                .resolve(text)
                .map(|raw| vec![raw])
                .ok_or_else(|| CodecError::UnknownOption(text.clone())),
            PropertyValue::Bool(b) => self.known(u8::from(*b)),
            PropertyValue::Int(i) => u8::try_from(*i)
                .map_err(|_| CodecError::UnknownOption(i.to_string()))
                .and_then(|raw| self.known(raw)),
            other => Err(unsupported("enum", other)),
        }
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn unsupported(codec: &'static str, value: &PropertyValue) -> CodecError {
    CodecError::Unsupported {
        codec,
        value: value.to_string(),
    }
}

pub fn decode_hex(hex: &str) -> Result<Vec<u8>, CodecError> {
    let digits = hex.trim();
    if digits.len() % 2 != 0 {
        return Err(CodecError::InvalidHex(hex.to_owned()));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CodecError::InvalidHex(hex.to_owned()))
        })
        .collect()
}

pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Codecs by property code. Codes without a codec pass through as raw bytes.
#[derive(Debug, Clone, Default)]
pub struct CodecTable {
    codecs: HashMap<PropertyCode, Arc<dyn PropertyCodec>>,
}

impl CodecTable {
    pub fn builder() -> CodecTableBuilder {
        CodecTableBuilder::default()
    }

    pub fn get(&self, code: &PropertyCode) -> Option<&Arc<dyn PropertyCodec>> {
        self.codecs.get(code)
    }

    pub fn decode(&self, code: &PropertyCode, raw: &[u8]) -> Result<PropertyValue, CodecError> {
        match self.codecs.get(code) {
            Some(codec) => codec.decode(raw),
            None => Ok(PropertyValue::Raw(raw.to_vec())),
        }
    }

    pub fn encode(&self, code: &PropertyCode, value: &PropertyValue) -> Result<Vec<u8>, CodecError> {
        match (self.codecs.get(code), value) {
            (_, PropertyValue::Raw(bytes)) => Ok(bytes.clone()),
            (Some(codec), value) => codec.encode(value),
            (None, value) => Err(unsupported("raw", value)),
        }
    }

    pub fn decode_hex(&self, code: &PropertyCode, hex: &str) -> Result<PropertyValue, CodecError> {
        self.decode(code, &decode_hex(hex)?)
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct CodecTableBuilder {
    codecs: HashMap<PropertyCode, Arc<dyn PropertyCodec>>,
}

impl CodecTableBuilder {
    pub fn with<C: PropertyCodec + 'static>(mut self, code: PropertyCode, codec: C) -> Self {
        self.codecs.insert(code, Arc::new(codec));
        self
    }

    /// Adds every codec of `table`, replacing codecs already present.
    pub fn extend(mut self, table: &CodecTable) -> Self {
        self.codecs
            .extend(table.codecs.iter().map(|(code, codec)| (*code, codec.clone())));
        self
    }

    pub fn build(self) -> CodecTable {
        CodecTable {
            codecs: self.codecs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorProfile {
    Standard,
    Haier,
}

impl VendorProfile {
    pub fn for_brand(brand: Brand) -> Self {
        match brand {
            Brand::Haier => VendorProfile::Haier,
            _ => VendorProfile::Standard,
        }
    }

    pub fn codec_table(&self) -> CodecTable {
        let standard = CodecTable::builder()
            .with(PropertyCode::MODEL_NUMBER, TextCodec)
            .with(PropertyCode::SERIAL_NUMBER, TextCodec)
            .with(PropertyCode::APPLIANCE_TYPE, IntCodec::unsigned(1))
            .with(PropertyCode::SABBATH_MODE, BoolCodec)
            .with(PropertyCode::BRAND, TextCodec)
            .with(PropertyCode::WIFI_MODULE_SW_VERSION, TextCodec)
            .with(PropertyCode::APPLIANCE_SW_VERSION, TextCodec)
            .build();

        match self {
            VendorProfile::Standard => standard,
            VendorProfile::Haier => CodecTable::builder()
                .extend(&standard)
                .with(
                    PropertyCode::HAIER_HOOD_FAN_SPEED,
                    EnumCodec::new()
                        .option(0, "Off")
                        .option(1, "Low")
                        .option(2, "Medium")
                        .option(3, "High")
                        .option(4, "Boost"),
                )
                .with(
                    PropertyCode::HAIER_HOOD_LIGHT,
                    EnumCodec::new().option(0, "Off").option(1, "On"),
                )
                .build(),
        }
    }
}
