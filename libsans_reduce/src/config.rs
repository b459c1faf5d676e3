use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::bundles::{FitMode, ReductionMode};
use super::error::{ConfigError, StateError};
use super::instrument::SansInstrument;
use super::state::common::StateReduction;
use super::state::mask::RADIUS_UNSET;
use super::state::{SansState, SansStateBuilder};

/// Structure representing a batch reduction request. Contains pathing, run
/// range and reduction settings.
/// Requests are serializable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReductionRequest {
    pub instrument: String,
    pub data_path: PathBuf,
    pub output_path: PathBuf,
    pub first_run_number: i32,
    pub last_run_number: i32,
    pub can_run: Option<String>,
    pub monitor_run: Option<String>,
    pub sample_transmission_run: Option<String>,
    pub sample_direct_run: Option<String>,
    pub can_transmission_run: Option<String>,
    pub can_direct_run: Option<String>,
    pub reduction_mode: ReductionMode,
    pub merge_fit_mode: FitMode,
    pub merge_shift: f64,
    pub merge_scale: f64,
    pub merge_min: Option<f64>,
    pub merge_max: Option<f64>,
    pub wavelength_min: f64,
    pub wavelength_max: f64,
    pub wavelength_step: f64,
    pub q_min: f64,
    pub q_max: f64,
    pub q_step: f64,
    pub q_xy_max: Option<f64>,
    pub q_xy_step: Option<f64>,
    pub scale_factor: f64,
    pub slice_start: Option<f64>,
    pub slice_stop: Option<f64>,
    pub bin_mask_start: Vec<f64>,
    pub bin_mask_stop: Vec<f64>,
    pub spectrum_mask: Vec<usize>,
    pub radius_min: f64,
    pub radius_max: f64,
    pub use_gravity: bool,
    pub gravity_extra_length: f64,
    pub n_threads: i32,
}

impl Default for ReductionRequest {
    /// Generate a new ReductionRequest. Path fields will be empty/invalid
    fn default() -> Self {
        Self {
            instrument: String::from("SANS2D"),
            data_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            first_run_number: 0,
            last_run_number: 0,
            can_run: None,
            monitor_run: None,
            sample_transmission_run: None,
            sample_direct_run: None,
            can_transmission_run: None,
            can_direct_run: None,
            reduction_mode: ReductionMode::Lab,
            merge_fit_mode: FitMode::Both,
            merge_shift: 0.0,
            merge_scale: 1.0,
            merge_min: None,
            merge_max: None,
            wavelength_min: 1.75,
            wavelength_max: 16.5,
            wavelength_step: 0.125,
            q_min: 0.001,
            q_max: 1.0,
            q_step: 0.002,
            q_xy_max: None,
            q_xy_step: None,
            scale_factor: 1.0,
            slice_start: None,
            slice_stop: None,
            bin_mask_start: Vec::new(),
            bin_mask_stop: Vec::new(),
            spectrum_mask: Vec::new(),
            radius_min: RADIUS_UNSET,
            radius_max: RADIUS_UNSET,
            use_gravity: false,
            gravity_extra_length: 0.0,
            n_threads: 1,
        }
    }
}

impl ReductionRequest {
    /// Read the reduction request in a YAML file
    /// Returns a ReductionRequest if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    pub fn instrument(&self) -> Result<SansInstrument, StateError> {
        SansInstrument::from_str(&self.instrument)
    }

    /// Construct the run string using the ISIS file naming convention
    pub fn get_run_str(&self, run_number: i32) -> String {
        let prefix = SansInstrument::from_str(&self.instrument)
            .map(|i| i.run_prefix())
            .unwrap_or("RUN");
        format!("{prefix}{run_number:0>8}")
    }

    /// Check if a specific run exists by evaluating the existence of its data file
    pub fn does_run_exist(&self, run_number: i32) -> bool {
        self.get_run_file_name(run_number).exists()
    }

    /// Get the path to a run's data file
    pub fn get_run_file_name(&self, run_number: i32) -> PathBuf {
        self.data_path
            .join(format!("{}.yaml", self.get_run_str(run_number)))
    }

    /// Get the path to the can data file, if a can is configured
    pub fn get_can_file_name(&self) -> Option<PathBuf> {
        self.can_run
            .as_ref()
            .map(|can| self.data_path.join(format!("{can}.yaml")))
    }

    /// Get the path to any named data file (transmission and direct runs)
    pub fn get_data_file_name(&self, entry: &str) -> PathBuf {
        self.data_path.join(format!("{entry}.yaml"))
    }

    /// Get the path to the monitor data file, if one is configured
    pub fn get_monitor_file_name(&self) -> Option<PathBuf> {
        self.monitor_run
            .as_ref()
            .map(|monitor| self.data_path.join(format!("{monitor}.yaml")))
    }

    /// Get the path to an output curve file
    pub fn get_output_file_name(&self, run_number: i32, label: &str) -> Result<PathBuf, ConfigError> {
        if !self.output_path.exists() {
            return Err(ConfigError::BadOutputPath(self.output_path.clone()));
        }
        Ok(self
            .output_path
            .join(format!("{}_{label}.yaml", self.get_run_str(run_number))))
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    pub fn has_can(&self) -> bool {
        self.can_run.is_some()
    }

    /// Map the request onto the state builders and build the validated state
    /// for one run of the batch.
    pub fn build_state(&self, run_number: i32) -> Result<SansState, StateError> {
        let mut builder = SansStateBuilder::from_name(&self.instrument)?
            .with_data(|mut d| {
                d = d.sample_scatter(self.get_run_str(run_number));
                if let Some(can) = &self.can_run {
                    d = d.can_scatter(can.clone());
                }
                d.transmission_entries(
                    self.sample_transmission_run.clone(),
                    self.sample_direct_run.clone(),
                )
                .can_transmission_entries(
                    self.can_transmission_run.clone(),
                    self.can_direct_run.clone(),
                )
            })
            .with_wavelength(|w| {
                w.range(self.wavelength_min, self.wavelength_max, self.wavelength_step)
            })
            .with_mask(|m| {
                m.bin_mask(self.bin_mask_start.clone(), self.bin_mask_stop.clone())
                    .spectrum_mask(self.spectrum_mask.clone())
                    .radius(self.radius_min, self.radius_max)
            })
            .with_convert_to_q(|mut q| {
                q = match (self.q_xy_max, self.q_xy_step) {
                    (Some(max), Some(step)) => q.two_dim(max, step),
                    _ => q.one_dim(self.q_min, self.q_max, self.q_step),
                };
                if self.use_gravity {
                    q = q.gravity(self.gravity_extra_length);
                }
                q
            })
            .scale_factor(self.scale_factor)
            .reduction(StateReduction {
                mode: self.reduction_mode,
                merge_fit_mode: self.merge_fit_mode,
                merge_shift: self.merge_shift,
                merge_scale: self.merge_scale,
                merge_min: self.merge_min,
                merge_max: self.merge_max,
            });
        if let (Some(start), Some(stop)) = (self.slice_start, self.slice_stop) {
            builder = builder.slice_window(start, stop);
        }
        builder.build()
    }
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_roundtrips_through_yaml() {
        let request = ReductionRequest::default();
        let yaml_str = serde_yaml::to_string(&request).unwrap();
        let parsed = serde_yaml::from_str::<ReductionRequest>(&yaml_str).unwrap();
        assert_eq!(parsed.instrument, request.instrument);
        assert_eq!(parsed.n_threads, request.n_threads);
        assert_eq!(parsed.radius_min, RADIUS_UNSET);
    }

    #[test]
    fn test_run_file_naming_convention() {
        let request = ReductionRequest {
            instrument: String::from("LARMOR"),
            data_path: PathBuf::from("/data"),
            ..Default::default()
        };
        assert_eq!(
            request.get_run_file_name(12345),
            PathBuf::from("/data/LARMOR00012345.yaml")
        );
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = ReductionRequest::read_config_file(Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(ConfigError::BadFilePath(_))));
    }

    #[test]
    fn test_build_state_maps_request_fields() {
        let request = ReductionRequest {
            instrument: String::from("SANS2D"),
            reduction_mode: ReductionMode::Merged,
            can_run: Some(String::from("SANS2D00022048")),
            sample_transmission_run: Some(String::from("SANS2D00022041")),
            sample_direct_run: Some(String::from("SANS2D00022052")),
            scale_factor: 1.2,
            ..Default::default()
        };
        let state = request.build_state(22024).unwrap();
        assert_eq!(state.data.sample_scatter, "SANS2D00022024");
        assert_eq!(state.data.can_scatter.as_deref(), Some("SANS2D00022048"));
        assert_eq!(
            state.data.sample_transmission.as_deref(),
            Some("SANS2D00022041")
        );
        assert_eq!(state.data.sample_direct.as_deref(), Some("SANS2D00022052"));
        assert!((state.scale.factor - 1.2).abs() < 1e-12);
        assert!(state.reduction.wants_merge());
    }

    #[test]
    fn test_one_sided_transmission_fails_validation() {
        let request = ReductionRequest {
            sample_transmission_run: Some(String::from("SANS2D00022041")),
            ..Default::default()
        };
        assert!(matches!(
            request.build_state(1),
            Err(StateError::InvalidState(_))
        ));
    }

    #[test]
    fn test_build_state_rejects_bad_instrument() {
        let request = ReductionRequest {
            instrument: String::from("D22"),
            ..Default::default()
        };
        assert!(matches!(
            request.build_state(1),
            Err(StateError::UnsupportedInstrument(_))
        ));
    }
}
