use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable hardware identity of an appliance (its MAC address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplianceId(String);

impl ApplianceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplianceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApplianceId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ApplianceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplianceKind {
    Oven,
    Cooktop,
    Fridge,
    BeverageCenter,
    Dishwasher,
    DualDishwasher,
    Washer,
    Dryer,
    WasherDryer,
    WaterFilter,
    WaterSoftener,
    WaterHeater,
    Advantium,
    AirConditioner,
    SplitAirConditioner,
    PortableAirConditioner,
    BuiltInAirConditioner,
    Hood,
    Microwave,
    OpalIceMaker,
    UnderCounterIceMaker,
    CoffeeMaker,
    EspressoMaker,
    Dehumidifier,
    #[serde(other)]
    Unknown,
}

impl ApplianceKind {
    /// Human readable name used in device titles, `"Appliance"` for unknown kinds.
    pub fn title(&self) -> &'static str {
        match self {
            ApplianceKind::Oven => "Oven",
            ApplianceKind::Cooktop => "Cooktop",
            ApplianceKind::Fridge => "Fridge",
            ApplianceKind::BeverageCenter => "Beverage Center",
            ApplianceKind::Dishwasher => "Dishwasher",
            ApplianceKind::DualDishwasher => "Dual Dishwasher",
            ApplianceKind::Washer => "Washer",
            ApplianceKind::Dryer => "Dryer",
            ApplianceKind::WasherDryer => "Washer Dryer",
            ApplianceKind::WaterFilter => "Water Filter",
            ApplianceKind::WaterSoftener => "Water Softener",
            ApplianceKind::WaterHeater => "Water Heater",
            ApplianceKind::Advantium => "Advantium",
            ApplianceKind::AirConditioner => "Air Conditioner",
            ApplianceKind::SplitAirConditioner => "Split Air Conditioner",
            ApplianceKind::PortableAirConditioner => "Portable Air Conditioner",
            ApplianceKind::BuiltInAirConditioner => "Built In Air Conditioner",
            ApplianceKind::Hood => "Hood",
            ApplianceKind::Microwave => "Microwave",
            ApplianceKind::OpalIceMaker => "Opal Ice Maker",
            ApplianceKind::UnderCounterIceMaker => "Under Counter Ice Maker",
            ApplianceKind::CoffeeMaker => "Coffee Maker",
            ApplianceKind::EspressoMaker => "Espresso Maker",
            ApplianceKind::Dehumidifier => "Dehumidifier",
            ApplianceKind::Unknown => "Appliance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Brand {
    Ge,
    GeProfile,
    Cafe,
    Monogram,
    Hotpoint,
    Haier,
    #[serde(other)]
    Unknown,
}

/// Model number prefixes where the brand letter is not the first character.
const SPECIAL_PREFIXES: &[(&str, usize)] = &[("OPAL01", 6), ("XP", 1)];

impl Brand {
    pub fn display_name(&self) -> &'static str {
        match self {
            Brand::Ge | Brand::Unknown => "GE",
            Brand::GeProfile => "GE Profile",
            Brand::Cafe => "Café",
            Brand::Monogram => "Monogram",
            Brand::Hotpoint => "Hotpoint",
            Brand::Haier => "Haier",
        }
    }

    /// Parses a brand label as reported by an appliance.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "ge" => Some(Brand::Ge),
            "geprofile" | "profile" => Some(Brand::GeProfile),
            "cafe" | "café" | "gecafe" | "gecafé" => Some(Brand::Cafe),
            "monogram" | "gemonogram" => Some(Brand::Monogram),
            "hotpoint" => Some(Brand::Hotpoint),
            "haier" => Some(Brand::Haier),
            "unknown" | "notdefined" => Some(Brand::Unknown),
            _ => None,
        }
    }

    fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'C' => Some(Brand::Cafe),
            'G' | 'J' | 'N' | 'A' | 'F' => Some(Brand::Ge),
            'H' | 'R' => Some(Brand::Hotpoint),
            'P' => Some(Brand::GeProfile),
            'Q' | 'M' => Some(Brand::Haier),
            'Z' => Some(Brand::Monogram),
            _ => None,
        }
    }

    /// Infers the brand from a model number.
    ///
    /// Most model numbers encode the brand in their first letter. A few
    /// product lines (see `SPECIAL_PREFIXES`) carry it at a fixed later
    /// position instead; for those no fallback to the first letter is made.
    pub fn infer_from_model(model: &str) -> Option<Self> {
        let m = model.trim().to_uppercase();
        if m.is_empty() {
            log::debug!("Model number is empty, cannot infer brand.");
            return None;
        }

        for (prefix, idx) in SPECIAL_PREFIXES {
            if m.starts_with(prefix) {
                let brand = m.chars().nth(*idx).and_then(Self::from_letter);
                if brand.is_none() {
                    log::debug!(
                        "Model '{}': prefix '{}' found but brand letter at position {} not recognized",
                        m,
                        prefix,
                        idx + 1
                    );
                }
                return brand;
            }
        }

        let brand = m.chars().next().and_then(Self::from_letter);
        if brand.is_none() {
            log::debug!("Model '{}': could not infer brand from first letter", m);
        }
        brand
    }
}
