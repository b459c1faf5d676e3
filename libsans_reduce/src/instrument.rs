use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::StateError;

/// The ISIS SANS instruments this reduction supports.
///
/// ZOOM is a single-bank instrument: its states build and reduce normally,
/// but there is no second bank to stitch, so it receives the unsupported
/// bank merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SansInstrument {
    Larmor,
    Loq,
    Sans2D,
    Zoom,
}

impl FromStr for SansInstrument {
    type Err = StateError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LARMOR" => Ok(Self::Larmor),
            "LOQ" => Ok(Self::Loq),
            "SANS2D" => Ok(Self::Sans2D),
            "ZOOM" => Ok(Self::Zoom),
            _ => Err(StateError::UnsupportedInstrument(s.to_string())),
        }
    }
}

impl std::fmt::Display for SansInstrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SansInstrument::Larmor => write!(f, "LARMOR"),
            SansInstrument::Loq => write!(f, "LOQ"),
            SansInstrument::Sans2D => write!(f, "SANS2D"),
            SansInstrument::Zoom => write!(f, "ZOOM"),
        }
    }
}

/// Geometry of one detector bank relative to the sample position
#[derive(Debug, Clone, Copy)]
pub struct BankGeometry {
    /// Nominal scattering-angle offset of the bank center in radians
    pub two_theta_offset: f64,
    /// Sample to bank distance in meters
    pub sample_distance_m: f64,
}

/// Per-instrument reduction parameters.
///
/// Instrument differences are data here, not subclass overrides: every field
/// a reduction stage needs is read from this table.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentParameters {
    pub lab: BankGeometry,
    pub hab: Option<BankGeometry>,
    /// Moderator to sample flight path in meters, used for unit conversion
    pub flight_path_m: f64,
    /// Index of the incident-beam monitor spectrum in raw data
    pub monitor_spectrum: usize,
    pub wavelength_min: f64,
    pub wavelength_max: f64,
}

impl SansInstrument {
    pub fn parameters(&self) -> InstrumentParameters {
        match self {
            SansInstrument::Larmor => InstrumentParameters {
                lab: BankGeometry {
                    two_theta_offset: 0.0,
                    sample_distance_m: 4.1,
                },
                hab: Some(BankGeometry {
                    two_theta_offset: 0.12,
                    sample_distance_m: 4.1,
                }),
                flight_path_m: 25.3,
                monitor_spectrum: 0,
                wavelength_min: 0.9,
                wavelength_max: 13.5,
            },
            SansInstrument::Loq => InstrumentParameters {
                lab: BankGeometry {
                    two_theta_offset: 0.0,
                    sample_distance_m: 4.151,
                },
                hab: Some(BankGeometry {
                    two_theta_offset: 0.25,
                    sample_distance_m: 0.636,
                }),
                flight_path_m: 11.0,
                monitor_spectrum: 0,
                wavelength_min: 2.2,
                wavelength_max: 10.0,
            },
            SansInstrument::Sans2D => InstrumentParameters {
                lab: BankGeometry {
                    two_theta_offset: 0.0,
                    sample_distance_m: 4.0,
                },
                hab: Some(BankGeometry {
                    two_theta_offset: 0.17,
                    sample_distance_m: 4.0,
                }),
                flight_path_m: 19.281,
                monitor_spectrum: 0,
                wavelength_min: 1.75,
                wavelength_max: 16.5,
            },
            SansInstrument::Zoom => InstrumentParameters {
                lab: BankGeometry {
                    two_theta_offset: 0.0,
                    sample_distance_m: 4.0,
                },
                hab: None,
                flight_path_m: 15.0,
                monitor_spectrum: 0,
                wavelength_min: 1.75,
                wavelength_max: 16.5,
            },
        }
    }

    pub fn has_hab_bank(&self) -> bool {
        self.parameters().hab.is_some()
    }

    /// Run file prefix used by the instrument file naming convention
    pub fn run_prefix(&self) -> &'static str {
        match self {
            SansInstrument::Larmor => "LARMOR",
            SansInstrument::Loq => "LOQ",
            SansInstrument::Sans2D => "SANS2D",
            SansInstrument::Zoom => "ZOOM",
        }
    }
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_from_str() {
        assert_eq!(
            SansInstrument::from_str("sans2d").unwrap(),
            SansInstrument::Sans2D
        );
        assert_eq!(
            SansInstrument::from_str("LARMOR").unwrap(),
            SansInstrument::Larmor
        );
        assert!(matches!(
            SansInstrument::from_str("EQSANS"),
            Err(StateError::UnsupportedInstrument(_))
        ));
    }

    #[test]
    fn test_zoom_is_single_bank() {
        assert!(!SansInstrument::Zoom.has_hab_bank());
        assert!(SansInstrument::Loq.has_hab_bank());
    }
}
