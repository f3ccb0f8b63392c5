use std::fmt;

use serde::{Deserialize, Serialize};

/// Production stage of an order. Ordinals are the storage encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Survey,
    Designing,
    ProductionAndInstallation,
    AcceptanceAndDelivery,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Survey,
        Stage::Designing,
        Stage::ProductionAndInstallation,
        Stage::AcceptanceAndDelivery,
    ];

    pub fn ordinal(self) -> u8 {
        match self {
            Self::Survey => 1,
            Self::Designing => 2,
            Self::ProductionAndInstallation => 3,
            Self::AcceptanceAndDelivery => 4,
        }
    }

    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            1 => Some(Self::Survey),
            2 => Some(Self::Designing),
            3 => Some(Self::ProductionAndInstallation),
            4 => Some(Self::AcceptanceAndDelivery),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Survey => "survey",
            Self::Designing => "designing",
            Self::ProductionAndInstallation => "production_and_installation",
            Self::AcceptanceAndDelivery => "acceptance_and_delivery",
        }
    }

    /// Accepts the snake_case name or the ordinal.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "survey" | "1" => Some(Self::Survey),
            "designing" | "design" | "2" => Some(Self::Designing),
            "production_and_installation" | "production" | "installation" | "3" => {
                Some(Self::ProductionAndInstallation)
            }
            "acceptance_and_delivery" | "acceptance" | "delivery" | "4" => {
                Some(Self::AcceptanceAndDelivery)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
