use serde::{Deserialize, Serialize};

use super::validate::ValidationReport;
use crate::bundles::{FitMode, ReductionMode};
use crate::instrument::SansInstrument;

/// Run/file references for one reduction. The scatter entries name the data
/// files to load; transmission and direct entries come in pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateData {
    pub sample_scatter: String,
    pub sample_transmission: Option<String>,
    pub sample_direct: Option<String>,
    pub can_scatter: Option<String>,
    pub can_transmission: Option<String>,
    pub can_direct: Option<String>,
}

impl StateData {
    pub fn validate(&self, report: &mut ValidationReport) {
        if self.sample_scatter.is_empty() {
            report.add("data.sample_scatter", "a sample scatter entry is required");
        }
        if self.sample_transmission.is_some() != self.sample_direct.is_some() {
            report.add(
                "data.sample_transmission",
                "sample transmission and direct entries must be set together",
            );
        }
        if self.can_transmission.is_some() != self.can_direct.is_some() {
            report.add(
                "data.can_transmission",
                "can transmission and direct entries must be set together",
            );
        }
        if self.can_scatter.is_none()
            && (self.can_transmission.is_some() || self.can_direct.is_some())
        {
            report.add(
                "data.can_scatter",
                "can transmission entries require a can scatter entry",
            );
        }
    }
}

/// Geometry adjustments applied on top of the instrument parameter table.
/// These are data offsets, not per-instrument code paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMove {
    /// Additional scattering-angle offset of the LAB bank in radians
    pub lab_two_theta_offset: f64,
    /// Additional scattering-angle offset of the HAB bank in radians
    pub hab_two_theta_offset: f64,
    /// Sample position offset along the beam in meters
    pub sample_offset_m: f64,
}

impl StateMove {
    pub fn validate(&self, report: &mut ValidationReport) {
        for (field, value) in [
            ("move.lab_two_theta_offset", self.lab_two_theta_offset),
            ("move.hab_two_theta_offset", self.hab_two_theta_offset),
            ("move.sample_offset_m", self.sample_offset_m),
        ] {
            if !value.is_finite() {
                report.add(field, "offset must be a finite float");
            }
        }
    }
}

/// The wavelength window the raw data is cropped to before Q conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateWavelength {
    pub low: f64,
    pub high: f64,
    pub step: f64,
}

impl StateWavelength {
    pub fn validate(&self, report: &mut ValidationReport) {
        if self.low <= 0.0 {
            report.add("wavelength.low", "wavelength must be a positive float");
        }
        if self.low >= self.high {
            report.add(
                "wavelength",
                format!("low {} must be less than high {}", self.low, self.high),
            );
        }
        if self.step <= 0.0 {
            report.add("wavelength.step", "step must be a positive float");
        }
    }
}

/// Absolute scale applied to the reduced curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateScale {
    pub factor: f64,
}

impl Default for StateScale {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

impl StateScale {
    pub fn validate(&self, report: &mut ValidationReport) {
        if self.factor <= 0.0 || !self.factor.is_finite() {
            report.add("scale.factor", "scale factor must be a positive float");
        }
    }
}

/// Optional time window restricting the measurement; contributes a
/// proportional factor to the normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSlice {
    pub start: Option<f64>,
    pub stop: Option<f64>,
}

impl StateSlice {
    pub fn validate(&self, report: &mut ValidationReport) {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => {
                if start < 0.0 {
                    report.add("slice.start", "slice start must be non-negative");
                }
                if start >= stop {
                    report.add(
                        "slice",
                        format!("start {start} must be less than stop {stop}"),
                    );
                }
            }
            (None, None) => (),
            _ => report.add("slice", "slice start and stop must be set together"),
        }
    }

    pub fn is_set(&self) -> bool {
        self.start.is_some() && self.stop.is_some()
    }
}

/// Which banks to reduce and how to reconcile them if merging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateReduction {
    pub mode: ReductionMode,
    pub merge_fit_mode: FitMode,
    pub merge_shift: f64,
    pub merge_scale: f64,
    pub merge_min: Option<f64>,
    pub merge_max: Option<f64>,
}

impl Default for StateReduction {
    fn default() -> Self {
        Self {
            mode: ReductionMode::Lab,
            merge_fit_mode: FitMode::Both,
            merge_shift: 0.0,
            merge_scale: 1.0,
            merge_min: None,
            merge_max: None,
        }
    }
}

impl StateReduction {
    pub fn validate(&self, instrument: SansInstrument, report: &mut ValidationReport) {
        report.check_bound_pair("reduction.merge_window", self.merge_min, self.merge_max);

        let needs_hab = !matches!(self.mode, ReductionMode::Lab);
        if needs_hab && !instrument.has_hab_bank() {
            report.add(
                "reduction.mode",
                format!("{instrument} has no HAB bank; only a LAB reduction is possible"),
            );
        }

        if self.merge_scale <= 0.0 || !self.merge_scale.is_finite() {
            report.add("reduction.merge_scale", "merge scale must be a positive float");
        }
        if !self.merge_shift.is_finite() {
            report.add("reduction.merge_shift", "merge shift must be a finite float");
        }
    }

    /// Does this reduction end in a bank merge?
    pub fn wants_merge(&self) -> bool {
        matches!(self.mode, ReductionMode::Merged | ReductionMode::All)
    }
}

/// Builder for the run/file sub-state
#[derive(Debug, Clone)]
pub struct StateDataBuilder {
    data: StateData,
}

impl StateDataBuilder {
    pub fn new(_instrument: SansInstrument) -> Self {
        Self {
            data: StateData::default(),
        }
    }

    pub fn sample_scatter(mut self, entry: impl Into<String>) -> Self {
        self.data.sample_scatter = entry.into();
        self
    }

    pub fn sample_transmission(mut self, trans: impl Into<String>, direct: impl Into<String>) -> Self {
        self.data.sample_transmission = Some(trans.into());
        self.data.sample_direct = Some(direct.into());
        self
    }

    pub fn can_scatter(mut self, entry: impl Into<String>) -> Self {
        self.data.can_scatter = Some(entry.into());
        self
    }

    pub fn can_transmission(mut self, trans: impl Into<String>, direct: impl Into<String>) -> Self {
        self.data.can_transmission = Some(trans.into());
        self.data.can_direct = Some(direct.into());
        self
    }

    /// Raw optional entries. A one-sided pair is passed through so validation
    /// can report it rather than being silently dropped.
    pub fn transmission_entries(mut self, trans: Option<String>, direct: Option<String>) -> Self {
        self.data.sample_transmission = trans;
        self.data.sample_direct = direct;
        self
    }

    pub fn can_transmission_entries(
        mut self,
        trans: Option<String>,
        direct: Option<String>,
    ) -> Self {
        self.data.can_transmission = trans;
        self.data.can_direct = direct;
        self
    }

    pub fn build(self) -> StateData {
        self.data
    }
}

/// Builder for the geometry move sub-state
#[derive(Debug, Clone)]
pub struct StateMoveBuilder {
    mov: StateMove,
}

impl StateMoveBuilder {
    pub fn new(_instrument: SansInstrument) -> Self {
        Self {
            mov: StateMove::default(),
        }
    }

    pub fn lab_offset(mut self, two_theta: f64) -> Self {
        self.mov.lab_two_theta_offset = two_theta;
        self
    }

    pub fn hab_offset(mut self, two_theta: f64) -> Self {
        self.mov.hab_two_theta_offset = two_theta;
        self
    }

    pub fn sample_offset(mut self, meters: f64) -> Self {
        self.mov.sample_offset_m = meters;
        self
    }

    pub fn build(self) -> StateMove {
        self.mov
    }
}

/// Builder for the wavelength window, seeded from the instrument defaults
#[derive(Debug, Clone)]
pub struct StateWavelengthBuilder {
    wavelength: StateWavelength,
}

impl StateWavelengthBuilder {
    pub fn new(instrument: SansInstrument) -> Self {
        let params = instrument.parameters();
        Self {
            wavelength: StateWavelength {
                low: params.wavelength_min,
                high: params.wavelength_max,
                step: 0.125,
            },
        }
    }

    pub fn range(mut self, low: f64, high: f64, step: f64) -> Self {
        self.wavelength.low = low;
        self.wavelength.high = high;
        self.wavelength.step = step;
        self
    }

    pub fn build(self) -> StateWavelength {
        self.wavelength
    }
}
