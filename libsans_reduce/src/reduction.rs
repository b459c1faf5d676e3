//! The reduction core: one detector bank, one data type, one pass.
//!
//! The pipeline is a fixed, ordered list of typed stages. Counts and
//! normalization are kept as two separate accumulations all the way through
//! and divided only at the end, so a can reduction's partials can be cached
//! and recombined with a different sample without re-running the geometry
//! and masking steps.

use super::algorithms::{self, QAccumulation, QBinning};
use super::bundles::{OutputBundle, OutputPartsBundle, ReductionMode, ReductionSettingBundle};
use super::error::ReductionError;
use super::instrument::BankGeometry;
use super::state::convert_to_q::ReductionDimensionality;
use super::state::SansState;
use super::workspace::{Spectrum, Workspace, WorkspaceStore, WsUnit};

/// The stages of a partial reduction, applied strictly in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionStage {
    Slice,
    ConvertUnits,
    CropWavelength,
    Geometry,
    Mask,
    Normalize,
    ConvertToQ,
}

/// The fixed execution order. This is a constant, not a runtime-assembled
/// step list; tests pin it.
pub const REDUCTION_PIPELINE: [ReductionStage; 7] = [
    ReductionStage::Slice,
    ReductionStage::ConvertUnits,
    ReductionStage::CropWavelength,
    ReductionStage::Geometry,
    ReductionStage::Mask,
    ReductionStage::Normalize,
    ReductionStage::ConvertToQ,
];

/// Everything a stage may read: the validated state and the resolved bank
/// geometry for this execution.
struct StageContext<'a> {
    state: &'a SansState,
    reduction_mode: ReductionMode,
    bank: BankGeometry,
    flight_path_m: f64,
    monitor: Option<&'a Workspace>,
    transmission: Option<&'a Workspace>,
    direct: Option<&'a Workspace>,
}

/// The mutable work a stage operates on
struct WorkOrder {
    data: Workspace,
    /// Per-spectrum, per-bin normalization weights, filled by Normalize
    weights: Vec<Vec<f64>>,
    /// Scalar normalization collected before the weights exist
    norm_factor: f64,
    /// Accumulated Q sums, filled by ConvertToQ (1D)
    accumulation: Option<(QAccumulation, QBinning)>,
    /// Count/norm workspace pair, filled by ConvertToQ (2D)
    two_dim: Option<(Workspace, Workspace)>,
}

impl ReductionStage {
    fn apply(&self, ctx: &StageContext, work: &mut WorkOrder) -> Result<(), ReductionError> {
        match self {
            ReductionStage::Slice => apply_slice(ctx, work),
            ReductionStage::ConvertUnits => {
                algorithms::convert_units(&mut work.data, WsUnit::Wavelength, ctx.flight_path_m)?;
                Ok(())
            }
            ReductionStage::CropWavelength => {
                let wavelength = &ctx.state.wavelength;
                algorithms::crop_workspace(&mut work.data, wavelength.low, wavelength.high)?;
                Ok(())
            }
            ReductionStage::Geometry => apply_geometry(ctx, work),
            ReductionStage::Mask => apply_mask(ctx, work),
            ReductionStage::Normalize => apply_normalize(ctx, work),
            ReductionStage::ConvertToQ => apply_convert_to_q(ctx, work),
        }
    }
}

/// A slice window keeps only a fraction of the measurement: counts and
/// normalization shrink by the same proportion.
fn apply_slice(ctx: &StageContext, work: &mut WorkOrder) -> Result<(), ReductionError> {
    if let (Some(start), Some(stop)) = (ctx.state.slice.start, ctx.state.slice.stop) {
        let duration = work.data.duration.max(stop - start);
        let fraction = ((stop - start) / duration).clamp(0.0, 1.0);
        for spectrum in work.data.spectra.iter_mut() {
            for value in spectrum.y.iter_mut() {
                *value *= fraction;
            }
            for error in spectrum.e.iter_mut() {
                *error *= fraction;
            }
        }
        work.norm_factor *= fraction;
    }
    Ok(())
}

/// Fold the instrument bank offset and the state's move offsets into each
/// pixel's scattering angle.
fn apply_geometry(ctx: &StageContext, work: &mut WorkOrder) -> Result<(), ReductionError> {
    let move_offset = match ctx.reduction_mode {
        ReductionMode::Hab => ctx.state.mov.hab_two_theta_offset,
        _ => ctx.state.mov.lab_two_theta_offset,
    };
    let offset = ctx.bank.two_theta_offset + move_offset;
    if offset != 0.0 {
        for spectrum in work.data.spectra.iter_mut() {
            spectrum.two_theta += offset;
        }
    }
    Ok(())
}

fn apply_mask(ctx: &StageContext, work: &mut WorkOrder) -> Result<(), ReductionError> {
    let mask = &ctx.state.mask;
    algorithms::mask_spectra(&mut work.data, &mask.spectrum_mask);
    algorithms::mask_strips(&mut work.data, &mask.strip_mask_start, &mask.strip_mask_stop);
    algorithms::mask_bins(&mut work.data, &mask.bin_mask_start, &mask.bin_mask_stop);
    if mask.radius_min_set() || mask.radius_max_set() {
        algorithms::mask_radius(
            &mut work.data,
            mask.radius_min,
            mask.radius_max,
            ctx.bank.sample_distance_m,
        );
    }
    if mask.phi_min > -90.0 || mask.phi_max < 90.0 {
        algorithms::mask_phi(&mut work.data, mask.phi_min, mask.phi_max, mask.use_phi_mirror);
    }
    Ok(())
}

/// Build the per-bin normalization weights: monitor profile, transmission
/// profile, the scalar factors collected so far, and the absolute scale.
fn apply_normalize(ctx: &StageContext, work: &mut WorkOrder) -> Result<(), ReductionError> {
    let scale = ctx.state.scale.factor;
    let mut weights = Vec::with_capacity(work.data.spectra.len());
    for spectrum in work.data.spectra.iter() {
        let centers: Vec<f64> = (0..spectrum.bin_count())
            .map(|i| spectrum.bin_center(i))
            .collect();
        let mut spec_weights = vec![work.norm_factor / scale; centers.len()];
        if let Some(monitor) = ctx.monitor {
            let profile = algorithms::monitor_weights(monitor.first()?, &centers);
            for (w, p) in spec_weights.iter_mut().zip(profile.iter()) {
                *w *= p;
            }
        }
        if let (Some(transmission), Some(direct)) = (ctx.transmission, ctx.direct) {
            // Transmitted fraction per wavelength bin: T = trans / direct.
            // Folding T into the normalization divides it out of the curve.
            let trans_profile = algorithms::monitor_weights(transmission.first()?, &centers);
            let direct_profile = algorithms::monitor_weights(direct.first()?, &centers);
            for ((w, t), d) in spec_weights
                .iter_mut()
                .zip(trans_profile.iter())
                .zip(direct_profile.iter())
            {
                if *d > 0.0 {
                    *w *= t / d;
                }
            }
        }
        weights.push(spec_weights);
    }
    work.weights = weights;
    Ok(())
}

fn apply_convert_to_q(ctx: &StageContext, work: &mut WorkOrder) -> Result<(), ReductionError> {
    let convert = &ctx.state.convert_to_q;
    match convert.dimensionality {
        ReductionDimensionality::OneDim => {
            // Validation guarantees the window is present for 1D
            let q_min = convert.q_min.unwrap_or(1e-3);
            let q_max = convert.q_max.unwrap_or(1.0);
            let binning = QBinning::linear(q_min, q_max, convert.q_step)?;
            let gravity = convert
                .use_gravity
                .then_some((convert.gravity_extra_length, ctx.bank.sample_distance_m));
            let acc =
                algorithms::accumulate_q1d(&work.data, &work.weights, &binning, gravity);
            work.accumulation = Some((acc, binning));
        }
        ReductionDimensionality::TwoDim => {
            let max = convert.q_xy_max.unwrap_or(1.0);
            let step = convert.q_xy_step.unwrap_or(0.01);
            let binning = QBinning::symmetric(max, step)?;
            work.two_dim = Some(algorithms::accumulate_q2d(
                &work.data,
                &work.weights,
                &binning,
            ));
        }
    }
    Ok(())
}

/// Attach the estimated per-bin Q resolution, if the state asks for one
fn attach_q_resolution(
    state: &SansState,
    bank: &BankGeometry,
    binning: &QBinning,
    spectrum: &mut Spectrum,
) -> Result<(), ReductionError> {
    let convert = &state.convert_to_q;
    if !convert.use_q_resolution {
        return Ok(());
    }
    let sigma = match (
        convert.q_resolution_a1,
        convert.q_resolution_a2,
        convert.q_resolution_h1,
        convert.q_resolution_w1,
        convert.q_resolution_h2,
        convert.q_resolution_w2,
    ) {
        (Some(a1), Some(a2), ..) => algorithms::circular_aperture_sigma(a1, a2),
        (_, _, Some(h1), Some(w1), Some(h2), Some(w2)) => {
            algorithms::rectangular_aperture_sigma(h1, w1, h2, w2)
        }
        _ => return Ok(()),
    };
    let moderator = match &convert.moderator_file {
        Some(path) => algorithms::ModeratorTable::from_file(path)?,
        None => return Ok(()),
    };
    let lambda_mid = 0.5 * (state.wavelength.low + state.wavelength.high);
    spectrum.dx = Some(algorithms::q_resolution(
        &binning.centers(),
        sigma,
        bank.sample_distance_m,
        bank.sample_distance_m,
        lambda_mid,
        &moderator,
    ));
    Ok(())
}

/// Resolve the bank geometry this execution reduces
fn select_bank(bundle: &ReductionSettingBundle) -> BankGeometry {
    let params = bundle.state.instrument.parameters();
    match bundle.reduction_mode {
        ReductionMode::Hab => params.hab.unwrap_or(params.lab),
        _ => params.lab,
    }
}

/// Execute one partial reduction.
///
/// Returns the divided result and, when the bundle asks for them, the
/// undivided count/norm pair. The store is only read; intermediates live on
/// the stack and vanish on any exit path.
pub fn run_core_reduction(
    bundle: &ReductionSettingBundle,
    store: &WorkspaceStore,
) -> Result<(OutputBundle, Option<OutputPartsBundle>), ReductionError> {
    let state = &bundle.state;
    let params = state.instrument.parameters();
    let bank = select_bank(bundle);

    let monitor = match &bundle.monitor_workspace {
        Some(name) => {
            let workspace = store.retrieve(name)?;
            if workspace.spectra.get(params.monitor_spectrum).is_none() {
                return Err(ReductionError::MissingMonitor(params.monitor_spectrum));
            }
            Some(workspace)
        }
        None => None,
    };
    let transmission = match &bundle.transmission_workspace {
        Some(name) => Some(store.retrieve(name)?),
        None => None,
    };
    let direct = match &bundle.direct_workspace {
        Some(name) => Some(store.retrieve(name)?),
        None => None,
    };

    let ctx = StageContext {
        state,
        reduction_mode: bundle.reduction_mode,
        bank,
        flight_path_m: params.flight_path_m + state.mov.sample_offset_m,
        monitor,
        transmission,
        direct,
    };

    let mut work = WorkOrder {
        data: store.retrieve(&bundle.scatter_workspace)?.clone(),
        weights: Vec::new(),
        norm_factor: 1.0,
        accumulation: None,
        two_dim: None,
    };

    for stage in REDUCTION_PIPELINE {
        log::debug!(
            "Applying stage {:?} for {:?}/{}",
            stage,
            bundle.data_type,
            bundle.reduction_mode
        );
        stage.apply(&ctx, &mut work)?;
    }

    let (divided, counts, norm) = match (work.accumulation, work.two_dim) {
        (Some((acc, binning)), _) => {
            let mut divided = algorithms::divide_accumulation(&acc, &binning);
            attach_q_resolution(state, &bank, &binning, &mut divided)?;
            let counts = Spectrum {
                x: binning.edges.clone(),
                y: acc.counts.clone(),
                e: acc.count_variance.iter().map(|v| v.sqrt()).collect(),
                dx: divided.dx.clone(),
                two_theta: 0.0,
                azimuth: 0.0,
                masked: false,
            };
            let norm = Spectrum {
                x: binning.edges.clone(),
                y: acc.norm.clone(),
                e: vec![0.0; acc.norm.len()],
                dx: None,
                two_theta: 0.0,
                azimuth: 0.0,
                masked: false,
            };
            (
                Workspace::single(WsUnit::MomentumTransfer, divided),
                Workspace::single(WsUnit::MomentumTransfer, counts),
                Workspace::single(WsUnit::MomentumTransfer, norm),
            )
        }
        (None, Some((counts, norm))) => {
            let divided = algorithms::divide_workspaces(&counts, &norm)?;
            (divided, counts, norm)
        }
        (None, None) => {
            // ConvertToQ always fills one of the two accumulators
            return Err(ReductionError::WorkspaceError(
                crate::error::WorkspaceError::EmptyWorkspace,
            ));
        }
    };

    let output = OutputBundle {
        state: state.clone(),
        data_type: bundle.data_type,
        reduction_mode: bundle.reduction_mode,
        output_workspace: divided,
    };
    let parts = bundle.output_parts.then(|| OutputPartsBundle {
        state: state.clone(),
        data_type: bundle.data_type,
        reduction_mode: bundle.reduction_mode,
        output_workspace_count: counts,
        output_workspace_norm: norm,
    });
    Ok((output, parts))
}
