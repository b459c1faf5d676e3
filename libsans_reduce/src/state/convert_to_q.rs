use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::validate::ValidationReport;
use crate::instrument::SansInstrument;

/// Whether the reduction produces a 1D I(Q) curve or a 2D I(Qx, Qy) map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionDimensionality {
    OneDim,
    TwoDim,
}

/// Q-conversion configuration.
///
/// A 1D reduction needs the q_min/q_max window and step; a 2D reduction needs
/// the symmetric qxy extent and step instead. The Q-resolution calculation is
/// optional and needs either the circular aperture pair or the rectangular
/// aperture quadruple, plus a moderator table file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConvertToQ {
    pub dimensionality: ReductionDimensionality,
    pub q_min: Option<f64>,
    pub q_max: Option<f64>,
    pub q_step: f64,
    pub q_xy_max: Option<f64>,
    pub q_xy_step: Option<f64>,
    pub use_gravity: bool,
    pub gravity_extra_length: f64,
    pub use_q_resolution: bool,
    pub q_resolution_a1: Option<f64>,
    pub q_resolution_a2: Option<f64>,
    pub q_resolution_h1: Option<f64>,
    pub q_resolution_w1: Option<f64>,
    pub q_resolution_h2: Option<f64>,
    pub q_resolution_w2: Option<f64>,
    pub moderator_file: Option<PathBuf>,
}

impl Default for StateConvertToQ {
    fn default() -> Self {
        Self {
            dimensionality: ReductionDimensionality::OneDim,
            q_min: None,
            q_max: None,
            q_step: 0.001,
            q_xy_max: None,
            q_xy_step: None,
            use_gravity: false,
            gravity_extra_length: 0.0,
            use_q_resolution: false,
            q_resolution_a1: None,
            q_resolution_a2: None,
            q_resolution_h1: None,
            q_resolution_w1: None,
            q_resolution_h2: None,
            q_resolution_w2: None,
            moderator_file: None,
        }
    }
}

impl StateConvertToQ {
    fn has_circular_aperture(&self) -> bool {
        self.q_resolution_a1.is_some() && self.q_resolution_a2.is_some()
    }

    fn has_rectangular_aperture(&self) -> bool {
        self.q_resolution_h1.is_some()
            && self.q_resolution_w1.is_some()
            && self.q_resolution_h2.is_some()
            && self.q_resolution_w2.is_some()
    }

    pub fn validate(&self, report: &mut ValidationReport) {
        report.check_bound_pair("convert_to_q.q", self.q_min, self.q_max);

        match self.dimensionality {
            ReductionDimensionality::OneDim => {
                if self.q_min.is_none() || self.q_max.is_none() {
                    report.add(
                        "convert_to_q.q",
                        "a 1D reduction requires both q_min and q_max",
                    );
                }
                if self.q_step <= 0.0 {
                    report.add("convert_to_q.q_step", "q_step must be a positive float");
                }
            }
            ReductionDimensionality::TwoDim => {
                match (self.q_xy_max, self.q_xy_step) {
                    (Some(max), Some(step)) => {
                        if max <= 0.0 {
                            report.add("convert_to_q.q_xy_max", "q_xy_max must be positive");
                        }
                        if step <= 0.0 {
                            report.add("convert_to_q.q_xy_step", "q_xy_step must be positive");
                        }
                    }
                    _ => report.add(
                        "convert_to_q.q_xy",
                        "a 2D reduction requires both q_xy_max and q_xy_step",
                    ),
                }
            }
        }

        if self.use_gravity && self.gravity_extra_length < 0.0 {
            report.add(
                "convert_to_q.gravity_extra_length",
                "gravity extra length must be non-negative",
            );
        }

        if self.use_q_resolution {
            if !self.has_circular_aperture() && !self.has_rectangular_aperture() {
                report.add(
                    "convert_to_q.q_resolution",
                    "Q resolution requires either the circular aperture pair (a1, a2) \
                     or the rectangular aperture quadruple (h1, w1, h2, w2)",
                );
            }
            if self.moderator_file.is_none() {
                report.add(
                    "convert_to_q.moderator_file",
                    "Q resolution requires a moderator file",
                );
            }
        }
    }
}

/// Builder for [`StateConvertToQ`], seeded with instrument defaults
#[derive(Debug, Clone)]
pub struct StateConvertToQBuilder {
    convert_to_q: StateConvertToQ,
}

impl StateConvertToQBuilder {
    pub fn new(_instrument: SansInstrument) -> Self {
        Self {
            convert_to_q: StateConvertToQ::default(),
        }
    }

    pub fn one_dim(mut self, q_min: f64, q_max: f64, q_step: f64) -> Self {
        self.convert_to_q.dimensionality = ReductionDimensionality::OneDim;
        self.convert_to_q.q_min = Some(q_min);
        self.convert_to_q.q_max = Some(q_max);
        self.convert_to_q.q_step = q_step;
        self
    }

    pub fn two_dim(mut self, q_xy_max: f64, q_xy_step: f64) -> Self {
        self.convert_to_q.dimensionality = ReductionDimensionality::TwoDim;
        self.convert_to_q.q_xy_max = Some(q_xy_max);
        self.convert_to_q.q_xy_step = Some(q_xy_step);
        self
    }

    pub fn gravity(mut self, extra_length: f64) -> Self {
        self.convert_to_q.use_gravity = true;
        self.convert_to_q.gravity_extra_length = extra_length;
        self
    }

    pub fn circular_aperture(mut self, a1: f64, a2: f64, moderator_file: PathBuf) -> Self {
        self.convert_to_q.use_q_resolution = true;
        self.convert_to_q.q_resolution_a1 = Some(a1);
        self.convert_to_q.q_resolution_a2 = Some(a2);
        self.convert_to_q.moderator_file = Some(moderator_file);
        self
    }

    pub fn rectangular_aperture(
        mut self,
        h1: f64,
        w1: f64,
        h2: f64,
        w2: f64,
        moderator_file: PathBuf,
    ) -> Self {
        self.convert_to_q.use_q_resolution = true;
        self.convert_to_q.q_resolution_h1 = Some(h1);
        self.convert_to_q.q_resolution_w1 = Some(w1);
        self.convert_to_q.q_resolution_h2 = Some(h2);
        self.convert_to_q.q_resolution_w2 = Some(w2);
        self.convert_to_q.moderator_file = Some(moderator_file);
        self
    }

    pub fn build(self) -> StateConvertToQ {
        self.convert_to_q
    }
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_dim_requires_q_window() {
        let state = StateConvertToQ::default();
        let mut report = ValidationReport::new();
        state.validate(&mut report);
        assert_eq!(report.len(), 1);

        let state = StateConvertToQBuilder::new(SansInstrument::Loq)
            .one_dim(0.01, 1.0, 0.02)
            .build();
        let mut report = ValidationReport::new();
        state.validate(&mut report);
        assert!(report.is_empty());
    }

    #[test]
    fn test_q_resolution_requires_aperture_and_moderator() {
        let mut state = StateConvertToQBuilder::new(SansInstrument::Loq)
            .one_dim(0.01, 1.0, 0.02)
            .build();
        state.use_q_resolution = true;
        let mut report = ValidationReport::new();
        state.validate(&mut report);
        assert_eq!(report.len(), 2);

        let state = StateConvertToQBuilder::new(SansInstrument::Loq)
            .one_dim(0.01, 1.0, 0.02)
            .circular_aperture(0.01, 0.008, PathBuf::from("moderator.csv"))
            .build();
        let mut report = ValidationReport::new();
        state.validate(&mut report);
        assert!(report.is_empty());
    }

    #[test]
    fn test_partial_rectangular_aperture_fails() {
        let mut state = StateConvertToQBuilder::new(SansInstrument::Sans2D)
            .one_dim(0.01, 1.0, 0.02)
            .rectangular_aperture(0.01, 0.01, 0.008, 0.008, PathBuf::from("moderator.csv"))
            .build();
        state.q_resolution_w2 = None;
        let mut report = ValidationReport::new();
        state.validate(&mut report);
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn test_two_dim_requires_qxy() {
        let mut state = StateConvertToQBuilder::new(SansInstrument::Sans2D)
            .two_dim(0.5, 0.01)
            .build();
        let mut report = ValidationReport::new();
        state.validate(&mut report);
        assert!(report.is_empty());

        state.q_xy_step = None;
        let mut report = ValidationReport::new();
        state.validate(&mut report);
        assert_eq!(report.len(), 1);
    }
}
