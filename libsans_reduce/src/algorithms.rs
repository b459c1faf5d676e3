//! The primitive workspace operations the reduction core is written against.
//!
//! These stand in for the native analysis engine: each function has the
//! documented semantics the pipeline depends on and no knowledge of the
//! state model. Failures propagate as [`AlgorithmError`]; nothing here
//! retries or papers over a bad input.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use ndarray::Array2;

use super::error::AlgorithmError;
use super::workspace::{Spectrum, Workspace, WsUnit};

/// h / m_n expressed so that lambda[angstrom] = TOF_TO_WAVELENGTH * t[us] / L[m]
const TOF_TO_WAVELENGTH: f64 = 3.9560346e-3;
/// Standard gravitational acceleration in m/s^2
const GRAVITY_ACCEL: f64 = 9.80665;
/// Neutron velocity in m/s for a 1 angstrom neutron
const VELOCITY_PER_ANGSTROM: f64 = 3956.0346;

/// Load a workspace from its YAML serialization
pub fn load_workspace(path: &Path) -> Result<Workspace, AlgorithmError> {
    if !path.exists() {
        return Err(AlgorithmError::BadFilePath(path.to_path_buf()));
    }
    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;
    Ok(serde_yaml::from_str::<Workspace>(&contents)?)
}

/// Write a workspace back out as YAML
pub fn save_workspace(workspace: &Workspace, path: &Path) -> Result<(), AlgorithmError> {
    let yaml_str = serde_yaml::to_string(workspace)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

/// Crop every spectrum to bins whose centers lie inside [min, max]
pub fn crop_workspace(workspace: &mut Workspace, min: f64, max: f64) -> Result<(), AlgorithmError> {
    if min >= max {
        return Err(AlgorithmError::BadRange(min, max));
    }
    for spectrum in workspace.spectra.iter_mut() {
        let keep: Vec<usize> = (0..spectrum.bin_count())
            .filter(|&i| {
                let center = spectrum.bin_center(i);
                center >= min && center <= max
            })
            .collect();
        let mut x: Vec<f64> = keep.iter().map(|&i| spectrum.x[i]).collect();
        if let Some(&last) = keep.last() {
            x.push(spectrum.x[last + 1]);
        }
        spectrum.y = keep.iter().map(|&i| spectrum.y[i]).collect();
        spectrum.e = keep.iter().map(|&i| spectrum.e[i]).collect();
        if let Some(dx) = spectrum.dx.take() {
            spectrum.dx = Some(keep.iter().map(|&i| dx[i]).collect());
        }
        spectrum.x = x;
    }
    Ok(())
}

/// Convert the x axis between time-of-flight and wavelength.
///
/// The conversion is linear in the flight path; converting to momentum
/// transfer is the job of the Q kernels, not this operation.
pub fn convert_units(
    workspace: &mut Workspace,
    target: WsUnit,
    flight_path_m: f64,
) -> Result<(), AlgorithmError> {
    if workspace.unit == target {
        return Ok(());
    }
    let factor = match (workspace.unit, target) {
        (WsUnit::TimeOfFlight, WsUnit::Wavelength) => TOF_TO_WAVELENGTH / flight_path_m,
        (WsUnit::Wavelength, WsUnit::TimeOfFlight) => flight_path_m / TOF_TO_WAVELENGTH,
        (from, to) => {
            return Err(AlgorithmError::BadUnitConversion(
                from.to_string(),
                to.to_string(),
            ))
        }
    };
    for spectrum in workspace.spectra.iter_mut() {
        for edge in spectrum.x.iter_mut() {
            *edge *= factor;
        }
    }
    workspace.unit = target;
    Ok(())
}

/// Mask whole spectra by detector index
pub fn mask_spectra(workspace: &mut Workspace, indices: &[usize]) {
    for &idx in indices {
        if let Some(spectrum) = workspace.spectra.get_mut(idx) {
            spectrum.masked = true;
        }
    }
}

/// Mask inclusive detector-index ranges (strips)
pub fn mask_strips(workspace: &mut Workspace, start: &[usize], stop: &[usize]) {
    for (&lo, &hi) in start.iter().zip(stop.iter()) {
        for idx in lo..=hi {
            if let Some(spectrum) = workspace.spectra.get_mut(idx) {
                spectrum.masked = true;
            }
        }
    }
}

/// Zero out x ranges in every spectrum
pub fn mask_bins(workspace: &mut Workspace, start: &[f64], stop: &[f64]) {
    for spectrum in workspace.spectra.iter_mut() {
        for i in 0..spectrum.bin_count() {
            let center = spectrum.bin_center(i);
            if start
                .iter()
                .zip(stop.iter())
                .any(|(&lo, &hi)| center >= lo && center <= hi)
            {
                spectrum.y[i] = 0.0;
                spectrum.e[i] = 0.0;
            }
        }
    }
}

/// Mask pixels outside an annulus on the detector face. A negative bound is
/// treated as unset.
pub fn mask_radius(workspace: &mut Workspace, min: f64, max: f64, bank_distance_m: f64) {
    for spectrum in workspace.spectra.iter_mut() {
        let radius = bank_distance_m * spectrum.two_theta.tan().abs();
        if (min >= 0.0 && radius < min) || (max >= 0.0 && radius > max) {
            spectrum.masked = true;
        }
    }
}

/// Mask pixels outside an azimuthal wedge, optionally mirrored through the
/// beam center.
pub fn mask_phi(workspace: &mut Workspace, min_deg: f64, max_deg: f64, mirror: bool) {
    for spectrum in workspace.spectra.iter_mut() {
        let phi = spectrum.azimuth.to_degrees();
        let inside = |p: f64| p >= min_deg && p <= max_deg;
        let mirrored = if phi > 0.0 { phi - 180.0 } else { phi + 180.0 };
        if !(inside(phi) || (mirror && inside(mirrored))) {
            spectrum.masked = true;
        }
    }
}

/// Interpolate the monitor signal onto a set of x positions. Values outside
/// the monitor range clamp to its edge bins.
pub fn monitor_weights(monitor: &Spectrum, positions: &[f64]) -> Vec<f64> {
    let n = monitor.bin_count();
    positions
        .iter()
        .map(|&pos| {
            if n == 0 {
                return 1.0;
            }
            let first = monitor.bin_center(0);
            let last = monitor.bin_center(n - 1);
            if pos <= first {
                return monitor.y[0];
            }
            if pos >= last {
                return monitor.y[n - 1];
            }
            let mut idx = 0;
            while idx + 1 < n && monitor.bin_center(idx + 1) < pos {
                idx += 1;
            }
            let x0 = monitor.bin_center(idx);
            let x1 = monitor.bin_center(idx + 1);
            let frac = (pos - x0) / (x1 - x0);
            monitor.y[idx] * (1.0 - frac) + monitor.y[idx + 1] * frac
        })
        .collect()
}

/// Subtract b from a spectrum-by-spectrum with quadrature error propagation.
///
/// Requires identical binning; any Q-resolution data is dropped and must be
/// re-attached by the caller if wanted.
pub fn subtract(a: &Workspace, b: &Workspace) -> Result<Workspace, AlgorithmError> {
    a.same_binning(b)?;
    let mut out = a.clone();
    for (spectrum, other) in out.spectra.iter_mut().zip(b.spectra.iter()) {
        for i in 0..spectrum.bin_count() {
            spectrum.y[i] -= other.y[i];
            spectrum.e[i] = (spectrum.e[i].powi(2) + other.e[i].powi(2)).sqrt();
        }
        spectrum.dx = None;
    }
    Ok(out)
}

/// Strip leading and trailing NaN/Inf bins from each spectrum.
///
/// Trimming stops at the first finite value from each end; interior
/// non-finite bins are left alone. Detector-edge and extrapolation artifacts
/// only appear at the boundaries.
pub fn trim_flat_ends(workspace: &mut Workspace) {
    for spectrum in workspace.spectra.iter_mut() {
        let first = spectrum.y.iter().position(|v| v.is_finite());
        let (lo, hi) = match first {
            Some(lo) => {
                // A finite bin exists, so rposition must match too
                let hi = spectrum
                    .y
                    .iter()
                    .rposition(|v| v.is_finite())
                    .unwrap_or(spectrum.y.len() - 1);
                (lo, hi)
            }
            None => {
                spectrum.x.truncate(1);
                spectrum.y.clear();
                spectrum.e.clear();
                spectrum.dx = None;
                continue;
            }
        };
        spectrum.x = spectrum.x[lo..=hi + 1].to_vec();
        spectrum.y = spectrum.y[lo..=hi].to_vec();
        spectrum.e = spectrum.e[lo..=hi].to_vec();
        if let Some(dx) = spectrum.dx.take() {
            spectrum.dx = Some(dx[lo..=hi].to_vec());
        }
    }
}

/// A Q bin-edge grid
#[derive(Debug, Clone)]
pub struct QBinning {
    pub edges: Vec<f64>,
}

impl QBinning {
    /// Linear edges over [min, max] with the given step
    pub fn linear(min: f64, max: f64, step: f64) -> Result<Self, AlgorithmError> {
        if min >= max || step <= 0.0 {
            return Err(AlgorithmError::BadRange(min, max));
        }
        // Edges are computed by index, not accumulation, so float drift
        // cannot produce a spurious sliver bin at the top of the range
        let tolerance = step * 1e-9;
        let mut edges = Vec::new();
        let mut i = 0usize;
        loop {
            let edge = min + i as f64 * step;
            if edge >= max - tolerance {
                break;
            }
            edges.push(edge);
            i += 1;
        }
        edges.push(max);
        Ok(Self { edges })
    }

    /// Symmetric edges over [-max, max] for 2D reductions
    pub fn symmetric(max: f64, step: f64) -> Result<Self, AlgorithmError> {
        Self::linear(-max, max, step)
    }

    pub fn bin_count(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn centers(&self) -> Vec<f64> {
        (0..self.bin_count())
            .map(|i| 0.5 * (self.edges[i] + self.edges[i + 1]))
            .collect()
    }

    pub fn index_of(&self, value: f64) -> Option<usize> {
        if value < self.edges[0] || value >= self.edges[self.edges.len() - 1] {
            return None;
        }
        match self
            .edges
            .binary_search_by(|edge| edge.partial_cmp(&value).unwrap_or(std::cmp::Ordering::Less))
        {
            Ok(idx) => Some(idx.min(self.bin_count() - 1)),
            Err(idx) => Some(idx - 1),
        }
    }
}

/// Momentum transfer for a scattering angle and wavelength
pub fn q_value(two_theta: f64, lambda: f64) -> f64 {
    4.0 * std::f64::consts::PI * (two_theta / 2.0).sin() / lambda
}

/// Gravity correction to the effective scattering angle for a neutron of the
/// given wavelength: the drop over the flight distance lowers the apparent
/// pixel, which shifts the angle for long wavelengths.
pub fn gravity_angle_correction(lambda: f64, path_m: f64, bank_distance_m: f64) -> f64 {
    let velocity = VELOCITY_PER_ANGSTROM / lambda;
    let drop = 0.5 * GRAVITY_ACCEL * (path_m / velocity).powi(2);
    (drop / bank_distance_m).atan()
}

/// The undivided accumulation of a Q conversion: separate count and
/// normalization sums per Q bin, with the count variance tracked alongside.
#[derive(Debug, Clone)]
pub struct QAccumulation {
    pub counts: Vec<f64>,
    pub count_variance: Vec<f64>,
    pub norm: Vec<f64>,
}

impl QAccumulation {
    fn zeros(n: usize) -> Self {
        Self {
            counts: vec![0.0; n],
            count_variance: vec![0.0; n],
            norm: vec![0.0; n],
        }
    }
}

/// 1D Q conversion with deferred division.
///
/// Every unmasked bin of every unmasked spectrum contributes its raw counts
/// to the count sum and its normalization weight to the norm sum of the Q
/// bin it lands in. The division happens later (or not at all, when the
/// caller wants the partials).
pub fn accumulate_q1d(
    data: &Workspace,
    weights: &[Vec<f64>],
    binning: &QBinning,
    gravity: Option<(f64, f64)>,
) -> QAccumulation {
    let mut acc = QAccumulation::zeros(binning.bin_count());
    for (spectrum, spec_weights) in data.spectra.iter().zip(weights.iter()) {
        if spectrum.masked {
            continue;
        }
        for i in 0..spectrum.bin_count() {
            let lambda = spectrum.bin_center(i);
            if lambda <= 0.0 {
                continue;
            }
            let mut two_theta = spectrum.two_theta;
            if let Some((extra_length, bank_distance)) = gravity {
                two_theta += gravity_angle_correction(lambda, bank_distance + extra_length, bank_distance);
            }
            let q = q_value(two_theta, lambda);
            if let Some(bin) = binning.index_of(q) {
                acc.counts[bin] += spectrum.y[i];
                acc.count_variance[bin] += spectrum.e[i].powi(2);
                acc.norm[bin] += spec_weights[i];
            }
        }
    }
    acc
}

/// 2D (Qx, Qy) conversion with deferred division. Returns the count and norm
/// workspaces, one spectrum per Qy row.
pub fn accumulate_q2d(
    data: &Workspace,
    weights: &[Vec<f64>],
    binning: &QBinning,
) -> (Workspace, Workspace) {
    let n = binning.bin_count();
    let mut counts = Array2::<f64>::zeros((n, n));
    let mut variance = Array2::<f64>::zeros((n, n));
    let mut norm = Array2::<f64>::zeros((n, n));

    for (spectrum, spec_weights) in data.spectra.iter().zip(weights.iter()) {
        if spectrum.masked {
            continue;
        }
        for i in 0..spectrum.bin_count() {
            let lambda = spectrum.bin_center(i);
            if lambda <= 0.0 {
                continue;
            }
            let q = q_value(spectrum.two_theta, lambda);
            let qx = q * spectrum.azimuth.cos();
            let qy = q * spectrum.azimuth.sin();
            if let (Some(col), Some(row)) = (binning.index_of(qx), binning.index_of(qy)) {
                counts[[row, col]] += spectrum.y[i];
                variance[[row, col]] += spectrum.e[i].powi(2);
                norm[[row, col]] += spec_weights[i];
            }
        }
    }

    let build = |values: &Array2<f64>, errors: Option<&Array2<f64>>| {
        let spectra = (0..n)
            .map(|row| Spectrum {
                x: binning.edges.clone(),
                y: values.row(row).to_vec(),
                e: match errors {
                    Some(var) => var.row(row).iter().map(|v| v.sqrt()).collect(),
                    None => vec![0.0; n],
                },
                dx: None,
                two_theta: 0.0,
                azimuth: 0.0,
                masked: false,
            })
            .collect();
        Workspace::new(WsUnit::MomentumTransfer, spectra)
    };

    (build(&counts, Some(&variance)), build(&norm, None))
}

/// Divide an accumulated count sum by its norm sum. Bins with no
/// normalization become NaN so the flat-end trim can drop them at the edges.
pub fn divide_accumulation(acc: &QAccumulation, binning: &QBinning) -> Spectrum {
    let n = binning.bin_count();
    let mut y = vec![f64::NAN; n];
    let mut e = vec![f64::NAN; n];
    for i in 0..n {
        if acc.norm[i] > 0.0 {
            y[i] = acc.counts[i] / acc.norm[i];
            e[i] = acc.count_variance[i].sqrt() / acc.norm[i];
        }
    }
    Spectrum {
        x: binning.edges.clone(),
        y,
        e,
        dx: None,
        two_theta: 0.0,
        azimuth: 0.0,
        masked: false,
    }
}

/// Divide a count workspace by its norm workspace bin-by-bin. Bins with no
/// normalization become NaN. The count workspace's Q-resolution survives.
pub fn divide_workspaces(count: &Workspace, norm: &Workspace) -> Result<Workspace, AlgorithmError> {
    count.same_binning(norm)?;
    let mut out = count.clone();
    for (spectrum, norm_spectrum) in out.spectra.iter_mut().zip(norm.spectra.iter()) {
        for i in 0..spectrum.bin_count() {
            if norm_spectrum.y[i] > 0.0 {
                spectrum.y[i] /= norm_spectrum.y[i];
                spectrum.e[i] /= norm_spectrum.y[i];
            } else {
                spectrum.y[i] = f64::NAN;
                spectrum.e[i] = f64::NAN;
            }
        }
    }
    Ok(out)
}

/// The moderator wavelength-spread table used by the Q-resolution estimate
#[derive(Debug, Clone, Default)]
pub struct ModeratorTable {
    entries: Vec<(f64, f64)>,
}

impl ModeratorTable {
    /// Read a two-column CSV (wavelength, sigma) with a header line
    pub fn from_file(path: &Path) -> Result<Self, AlgorithmError> {
        if !path.exists() {
            return Err(AlgorithmError::BadFilePath(path.to_path_buf()));
        }
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        let mut table = ModeratorTable::default();
        let mut lines = contents.lines();
        lines.next(); // Skip the header
        for line in lines {
            let entries: Vec<&str> = line.split_terminator(",").collect();
            if entries.len() != 2 {
                return Err(AlgorithmError::BadModeratorFormat);
            }
            table.entries.push((entries[0].parse()?, entries[1].parse()?));
        }
        Ok(table)
    }

    /// Interpolated sigma at the given wavelength, clamped to the table ends
    pub fn sigma_at(&self, lambda: f64) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let first = self.entries[0];
        let last = self.entries[self.entries.len() - 1];
        if lambda <= first.0 {
            return first.1;
        }
        if lambda >= last.0 {
            return last.1;
        }
        for pair in self.entries.windows(2) {
            let (x0, s0) = pair[0];
            let (x1, s1) = pair[1];
            if lambda >= x0 && lambda <= x1 {
                let frac = (lambda - x0) / (x1 - x0);
                return s0 * (1.0 - frac) + s1 * frac;
            }
        }
        last.1
    }
}

/// Per-bin Q resolution from the aperture geometry and the moderator table.
///
/// Angular and wavelength contributions are combined in quadrature:
/// dq = q * sqrt((dtheta/theta)^2 + (sigma_mod/lambda)^2), with the angular
/// term from the effective aperture sizes over the collimation and
/// sample-detector distances. An estimate, deliberately independent of the
/// per-pixel geometry.
pub fn q_resolution(
    q_centers: &[f64],
    aperture_sigma: f64,
    collimation_m: f64,
    bank_distance_m: f64,
    lambda_mid: f64,
    moderator: &ModeratorTable,
) -> Vec<f64> {
    let dtheta = aperture_sigma * (1.0 / collimation_m + 1.0 / bank_distance_m);
    let lambda_term = moderator.sigma_at(lambda_mid) / lambda_mid;
    q_centers
        .iter()
        .map(|&q| {
            let theta = 2.0 * ((q * lambda_mid) / (4.0 * std::f64::consts::PI)).asin();
            let theta_term = if theta > 0.0 { dtheta / theta } else { 0.0 };
            q * (theta_term.powi(2) + lambda_term.powi(2)).sqrt()
        })
        .collect()
}

/// Effective aperture sigma for a circular aperture pair
pub fn circular_aperture_sigma(a1: f64, a2: f64) -> f64 {
    0.5 * (a1.powi(2) + a2.powi(2)).sqrt()
}

/// Effective aperture sigma for a rectangular aperture quadruple
pub fn rectangular_aperture_sigma(h1: f64, w1: f64, h2: f64, w2: f64) -> f64 {
    let r1 = ((h1.powi(2) + w1.powi(2)) / 12.0).sqrt();
    let r2 = ((h2.powi(2) + w2.powi(2)) / 12.0).sqrt();
    0.5 * (r1.powi(2) + r2.powi(2)).sqrt()
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(y: Vec<f64>) -> Spectrum {
        let n = y.len();
        Spectrum {
            x: (0..=n).map(|i| i as f64).collect(),
            e: vec![0.5; n],
            y,
            dx: None,
            two_theta: 0.02,
            azimuth: 0.0,
            masked: false,
        }
    }

    #[test]
    fn test_trim_strips_only_the_ends() {
        let mut ws = Workspace::single(
            WsUnit::MomentumTransfer,
            spectrum(vec![f64::NAN, 1.0, 2.0, f64::INFINITY]),
        );
        trim_flat_ends(&mut ws);
        assert_eq!(ws.spectra[0].y, vec![1.0, 2.0]);
        assert_eq!(ws.spectra[0].x, vec![1.0, 2.0, 3.0]);

        let mut ws = Workspace::single(
            WsUnit::MomentumTransfer,
            spectrum(vec![1.0, f64::NAN, 2.0]),
        );
        trim_flat_ends(&mut ws);
        assert_eq!(ws.spectra[0].y.len(), 3);
        assert!(ws.spectra[0].y[1].is_nan());
    }

    #[test]
    fn test_subtract_quadrature() {
        let a = Workspace::single(WsUnit::MomentumTransfer, spectrum(vec![5.0, 6.0]));
        let b = Workspace::single(WsUnit::MomentumTransfer, spectrum(vec![1.0, 2.0]));
        let out = subtract(&a, &b).unwrap();
        assert_eq!(out.spectra[0].y, vec![4.0, 4.0]);
        let expected_e = (0.25_f64 + 0.25).sqrt();
        assert!((out.spectra[0].e[0] - expected_e).abs() < 1e-12);
    }

    #[test]
    fn test_subtract_incompatible_binning() {
        let a = Workspace::single(WsUnit::MomentumTransfer, spectrum(vec![5.0, 6.0]));
        let b = Workspace::single(WsUnit::MomentumTransfer, spectrum(vec![1.0]));
        assert!(subtract(&a, &b).is_err());
    }

    #[test]
    fn test_crop_keeps_inner_bins() {
        let mut ws = Workspace::single(WsUnit::Wavelength, spectrum(vec![1.0, 2.0, 3.0, 4.0]));
        crop_workspace(&mut ws, 1.0, 3.0).unwrap();
        assert_eq!(ws.spectra[0].y, vec![2.0, 3.0]);
        assert!(crop_workspace(&mut ws, 3.0, 1.0).is_err());
    }

    #[test]
    fn test_unit_conversion_roundtrip() {
        let mut ws = Workspace::single(WsUnit::TimeOfFlight, spectrum(vec![1.0, 2.0]));
        let original = ws.spectra[0].x.clone();
        convert_units(&mut ws, WsUnit::Wavelength, 10.0).unwrap();
        assert_eq!(ws.unit, WsUnit::Wavelength);
        convert_units(&mut ws, WsUnit::TimeOfFlight, 10.0).unwrap();
        for (a, b) in ws.spectra[0].x.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_q_binning_index() {
        let binning = QBinning::linear(0.0, 1.0, 0.1).unwrap();
        assert_eq!(binning.bin_count(), 10);
        assert_eq!(binning.index_of(0.05), Some(0));
        assert_eq!(binning.index_of(0.95), Some(9));
        assert_eq!(binning.index_of(1.5), None);
        assert_eq!(binning.index_of(-0.1), None);
    }

    #[test]
    fn test_accumulation_defers_division() {
        let data = Workspace::single(WsUnit::Wavelength, spectrum(vec![10.0, 10.0]));
        let weights = vec![vec![2.0, 2.0]];
        let binning = QBinning::linear(1e-4, 1.0, 1e-3).unwrap();
        let acc = accumulate_q1d(&data, &weights, &binning, None);
        let total_counts: f64 = acc.counts.iter().sum();
        let total_norm: f64 = acc.norm.iter().sum();
        assert!((total_counts - 20.0).abs() < 1e-9);
        assert!((total_norm - 4.0).abs() < 1e-9);

        let divided = divide_accumulation(&acc, &binning);
        for (i, &n) in acc.norm.iter().enumerate() {
            if n > 0.0 {
                assert!((divided.y[i] - 5.0).abs() < 1e-9);
            } else {
                assert!(divided.y[i].is_nan());
            }
        }
    }

    #[test]
    fn test_masked_spectra_are_skipped() {
        let mut masked = spectrum(vec![10.0, 10.0]);
        masked.masked = true;
        let data = Workspace::new(WsUnit::Wavelength, vec![masked, spectrum(vec![1.0, 1.0])]);
        let weights = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        let binning = QBinning::linear(1e-4, 1.0, 1e-3).unwrap();
        let acc = accumulate_q1d(&data, &weights, &binning, None);
        let total: f64 = acc.counts.iter().sum();
        assert!((total - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_monitor_interpolation_clamps() {
        let monitor = spectrum(vec![2.0, 4.0]);
        // centers are 0.5 and 1.5
        let weights = monitor_weights(&monitor, &[0.0, 1.0, 5.0]);
        assert!((weights[0] - 2.0).abs() < 1e-12);
        assert!((weights[1] - 3.0).abs() < 1e-12);
        assert!((weights[2] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_gravity_correction_grows_with_wavelength() {
        let short = gravity_angle_correction(2.0, 4.0, 4.0);
        let long = gravity_angle_correction(10.0, 4.0, 4.0);
        assert!(long > short);
        assert!(short > 0.0);
    }
}
