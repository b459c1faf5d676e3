use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::error::WorkspaceError;

/// The x-axis unit carried by a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WsUnit {
    TimeOfFlight,
    Wavelength,
    MomentumTransfer,
}

impl std::fmt::Display for WsUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WsUnit::TimeOfFlight => write!(f, "TimeOfFlight"),
            WsUnit::Wavelength => write!(f, "Wavelength"),
            WsUnit::MomentumTransfer => write!(f, "MomentumTransfer"),
        }
    }
}

fn default_duration() -> f64 {
    1.0
}

/// A single binned spectrum: x bin edges with associated signal and error arrays,
/// an optional per-bin Q-resolution array, and the detector geometry of the pixel
/// (or pixel group) that recorded it.
///
/// The x array always has one more element than y and e (histogram convention).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spectrum {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub e: Vec<f64>,
    #[serde(default)]
    pub dx: Option<Vec<f64>>,
    /// Scattering angle of the detector pixel in radians
    pub two_theta: f64,
    /// Azimuthal angle of the detector pixel in radians
    pub azimuth: f64,
    #[serde(default)]
    pub masked: bool,
}

impl Spectrum {
    pub fn new(
        x: Vec<f64>,
        y: Vec<f64>,
        e: Vec<f64>,
        two_theta: f64,
        azimuth: f64,
    ) -> Result<Self, WorkspaceError> {
        if x.len() != y.len() + 1 || y.len() != e.len() {
            return Err(WorkspaceError::MismatchedArrays {
                x_len: x.len(),
                y_len: y.len(),
                e_len: e.len(),
            });
        }
        Ok(Self {
            x,
            y,
            e,
            dx: None,
            two_theta,
            azimuth,
            masked: false,
        })
    }

    pub fn bin_count(&self) -> usize {
        self.y.len()
    }

    /// Center of bin `idx`
    pub fn bin_center(&self, idx: usize) -> f64 {
        0.5 * (self.x[idx] + self.x[idx + 1])
    }
}

/// A workspace is the matrix-of-spectra abstraction the reduction operates on.
///
/// A 1D reduced curve is a workspace with a single spectrum; a 2D (Qx, Qy)
/// reduction is a workspace with one spectrum per Qy row. The duration field
/// is the wall-clock length of the measurement and is used to turn a slice
/// window into a proportional normalization factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub unit: WsUnit,
    pub spectra: Vec<Spectrum>,
    #[serde(default)]
    pub run_number: Option<i32>,
    #[serde(default = "default_duration")]
    pub duration: f64,
}

impl Workspace {
    pub fn new(unit: WsUnit, spectra: Vec<Spectrum>) -> Self {
        Self {
            unit,
            spectra,
            run_number: None,
            duration: 1.0,
        }
    }

    /// Wrap a single spectrum as a 1D workspace
    pub fn single(unit: WsUnit, spectrum: Spectrum) -> Self {
        Self::new(unit, vec![spectrum])
    }

    pub fn is_1d(&self) -> bool {
        self.spectra.len() == 1
    }

    pub fn first(&self) -> Result<&Spectrum, WorkspaceError> {
        self.spectra.first().ok_or(WorkspaceError::EmptyWorkspace)
    }

    /// Check that two 1D workspaces share identical bin edges
    pub fn same_binning(&self, other: &Workspace) -> Result<(), WorkspaceError> {
        let left = self.first()?;
        let right = other.first()?;
        if left.x.len() != right.x.len()
            || left
                .x
                .iter()
                .zip(right.x.iter())
                .any(|(a, b)| (a - b).abs() > f64::EPSILON * a.abs().max(1.0))
        {
            return Err(WorkspaceError::IncompatibleBinning(
                left.bin_count(),
                right.bin_count(),
            ));
        }
        Ok(())
    }
}

/// An explicit, named map of workspaces.
///
/// This stands in for the engine's process-wide workspace namespace, but is
/// passed explicitly to every component that needs it. Concurrent batch
/// drivers must give each worker its own store (single-writer-per-name
/// discipline, not transactional isolation).
#[derive(Debug, Default)]
pub struct WorkspaceStore {
    map: FxHashMap<String, Workspace>,
}

impl WorkspaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, workspace: Workspace) {
        self.map.insert(name.into(), workspace);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Workspace> {
        self.map.get(name)
    }

    pub fn retrieve(&self, name: &str) -> Result<&Workspace, WorkspaceError> {
        self.map
            .get(name)
            .ok_or_else(|| WorkspaceError::MissingWorkspace(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<Workspace> {
        self.map.remove(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
