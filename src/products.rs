//! Known WCS endpoints of the Météo-France forecast models.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::token::Token;

const KEY_PLACEHOLDER: &str = "VOTRE_CLE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Arpege,
    Arome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    World,
    Europe,
    France,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Wcs,
}

/// One entry of the endpoint table.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceOption {
    pub dataset: Dataset,
    pub area: Area,
    /// Grid step in degrees.
    pub accuracy: f64,
    pub base_url_template: &'static str,
    pub service_type: ServiceType,
}

impl ServiceOption {
    /// Base URL with the API key substituted, ending in `?`.
    pub fn base_url(&self, token: &Token) -> String {
        self.base_url_template
            .replace(KEY_PLACEHOLDER, token.as_str())
    }
}

const ARPEGE_05_GLOBE: ServiceOption = ServiceOption {
    dataset: Dataset::Arpege,
    area: Area::World,
    accuracy: 0.5,
    base_url_template: "https://geoservices.meteofrance.fr/api/VOTRE_CLE/MF-NWP-GLOBAL-ARPEGE-05-GLOBE-WCS?",
    service_type: ServiceType::Wcs,
};

const ARPEGE_01_EUROPE: ServiceOption = ServiceOption {
    dataset: Dataset::Arpege,
    area: Area::Europe,
    accuracy: 0.1,
    base_url_template: "https://geoservices.meteofrance.fr/api/VOTRE_CLE/MF-NWP-GLOBAL-ARPEGE-01-EUROPE-WCS?",
    service_type: ServiceType::Wcs,
};

const AROME_0025_FRANCE: ServiceOption = ServiceOption {
    dataset: Dataset::Arome,
    area: Area::France,
    accuracy: 0.025,
    base_url_template: "https://geoservices.meteofrance.fr/api/VOTRE_CLE/MF-NWP-HIGHRES-AROME-0025-FRANCE-WCS?",
    service_type: ServiceType::Wcs,
};

const AROME_001_FRANCE: ServiceOption = ServiceOption {
    dataset: Dataset::Arome,
    area: Area::France,
    accuracy: 0.01,
    base_url_template: "https://geoservices.meteofrance.fr/api/VOTRE_CLE/MF-NWP-HIGHRES-AROME-001-FRANCE-WCS?",
    service_type: ServiceType::Wcs,
};

/// Looks up the endpoint for a product.
///
/// `accuracy` may be omitted when the (dataset, area) pair has a single grid.
pub fn find_service(
    dataset: Dataset,
    area: Area,
    accuracy: Option<f64>,
) -> Result<&'static ServiceOption> {
    let candidates: &'static [ServiceOption] = match (dataset, area) {
        (Dataset::Arpege, Area::World) => &[ARPEGE_05_GLOBE],
        (Dataset::Arpege, Area::Europe) => &[ARPEGE_01_EUROPE],
        (Dataset::Arome, Area::France) => &[AROME_0025_FRANCE, AROME_001_FRANCE],
        _ => &[],
    };

    let no_match = || Error::NoMatchingService {
        dataset: dataset.to_string(),
        area: area.to_string(),
        accuracy: accuracy.map_or("any".to_string(), |a| a.to_string()),
    };

    match accuracy {
        Some(a) => candidates
            .iter()
            .find(|opt| (opt.accuracy - a).abs() < 1e-9)
            .ok_or_else(no_match),
        None => match candidates {
            [] => Err(no_match()),
            [only] => Ok(only),
            many => Err(Error::AmbiguousService {
                dataset: dataset.to_string(),
                area: area.to_string(),
                candidates: many
                    .iter()
                    .map(|o| o.accuracy.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        },
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dataset::Arpege => "arpege",
            Dataset::Arome => "arome",
        })
    }
}

impl FromStr for Dataset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "arpege" => Ok(Dataset::Arpege),
            "arome" => Ok(Dataset::Arome),
            other => Err(Error::InvalidSelection(format!("unknown dataset '{}'", other))),
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Area::World => "world",
            Area::Europe => "europe",
            Area::France => "france",
        })
    }
}

impl FromStr for Area {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "world" | "globe" => Ok(Area::World),
            "europe" => Ok(Area::Europe),
            "france" => Ok(Area::France),
            other => Err(Error::InvalidSelection(format!("unknown area '{}'", other))),
        }
    }
}
