use serde::{Deserialize, Serialize};

use super::validate::ValidationReport;
use crate::instrument::SansInstrument;

/// Sentinel meaning a radius bound is unset and should be ignored
pub const RADIUS_UNSET: f64 = -1.0;

/// Masking configuration for one reduction.
///
/// Bin masks are x-axis ranges (in the unit of the raw data) zeroed in every
/// spectrum. Strip masks are inclusive detector-index ranges. The radius and
/// phi masks select pixels by their position on the detector face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMask {
    pub bin_mask_start: Vec<f64>,
    pub bin_mask_stop: Vec<f64>,
    pub spectrum_mask: Vec<usize>,
    pub strip_mask_start: Vec<usize>,
    pub strip_mask_stop: Vec<usize>,
    pub radius_min: f64,
    pub radius_max: f64,
    pub phi_min: f64,
    pub phi_max: f64,
    pub use_phi_mirror: bool,
}

impl Default for StateMask {
    fn default() -> Self {
        Self {
            bin_mask_start: Vec::new(),
            bin_mask_stop: Vec::new(),
            spectrum_mask: Vec::new(),
            strip_mask_start: Vec::new(),
            strip_mask_stop: Vec::new(),
            radius_min: RADIUS_UNSET,
            radius_max: RADIUS_UNSET,
            phi_min: -90.0,
            phi_max: 90.0,
            use_phi_mirror: true,
        }
    }
}

impl StateMask {
    pub fn radius_min_set(&self) -> bool {
        self.radius_min != RADIUS_UNSET
    }

    pub fn radius_max_set(&self) -> bool {
        self.radius_max != RADIUS_UNSET
    }

    pub fn validate(&self, report: &mut ValidationReport) {
        report.check_range_lists("mask.bin_mask", &self.bin_mask_start, &self.bin_mask_stop);

        if self.strip_mask_start.len() != self.strip_mask_stop.len() {
            report.add(
                "mask.strip_mask",
                format!(
                    "start and stop lists have mismatched lengths ({} vs {})",
                    self.strip_mask_start.len(),
                    self.strip_mask_stop.len()
                ),
            );
        } else {
            for (idx, (lo, hi)) in self
                .strip_mask_start
                .iter()
                .zip(self.strip_mask_stop.iter())
                .enumerate()
            {
                if lo > hi {
                    report.add(
                        "mask.strip_mask",
                        format!("range {idx} has start {lo} greater than stop {hi}"),
                    );
                }
            }
        }

        if self.radius_min_set() && self.radius_min < 0.0 {
            report.add("mask.radius_min", "radius must be non-negative or -1 (unset)");
        }
        if self.radius_max_set() && self.radius_max < 0.0 {
            report.add("mask.radius_max", "radius must be non-negative or -1 (unset)");
        }
        if self.radius_min_set() && self.radius_max_set() && self.radius_min > self.radius_max {
            report.add(
                "mask.radius",
                format!(
                    "radius_min {} is greater than radius_max {}",
                    self.radius_min, self.radius_max
                ),
            );
        }

        if self.phi_min >= self.phi_max {
            report.add(
                "mask.phi",
                format!(
                    "phi_min {} must be less than phi_max {}",
                    self.phi_min, self.phi_max
                ),
            );
        }
    }
}

/// Builder for [`StateMask`]. The instrument selects nothing mask-specific
/// today, but the factory keeps the one-builder-per-substate shape uniform.
#[derive(Debug, Clone)]
pub struct StateMaskBuilder {
    mask: StateMask,
}

impl StateMaskBuilder {
    pub fn new(_instrument: SansInstrument) -> Self {
        Self {
            mask: StateMask::default(),
        }
    }

    pub fn bin_mask(mut self, start: Vec<f64>, stop: Vec<f64>) -> Self {
        self.mask.bin_mask_start = start;
        self.mask.bin_mask_stop = stop;
        self
    }

    pub fn spectrum_mask(mut self, spectra: Vec<usize>) -> Self {
        self.mask.spectrum_mask = spectra;
        self
    }

    pub fn strip_mask(mut self, start: Vec<usize>, stop: Vec<usize>) -> Self {
        self.mask.strip_mask_start = start;
        self.mask.strip_mask_stop = stop;
        self
    }

    pub fn radius(mut self, min: f64, max: f64) -> Self {
        self.mask.radius_min = min;
        self.mask.radius_max = max;
        self
    }

    pub fn phi(mut self, min: f64, max: f64, mirror: bool) -> Self {
        self.mask.phi_min = min;
        self.mask.phi_max = max;
        self.mask.use_phi_mirror = mirror;
        self
    }

    pub fn build(self) -> StateMask {
        self.mask
    }
}
