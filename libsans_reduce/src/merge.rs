//! Stitching the two detector banks into one curve.
//!
//! Only the ISIS SANS instruments with two banks get a real 1D merger; any
//! other selection is the unsupported merger, which is a typed error when
//! actually invoked. The stitch works on the undivided count/norm partials
//! so the combination preserves the deferred-division form.

use super::bundles::{FitMode, MergeBundle};
use super::error::MergeError;
use super::instrument::SansInstrument;
use super::workspace::{Spectrum, Workspace, WsUnit};

/// The merger variant selected for an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankMerger {
    Isis1D,
    Unsupported(SansInstrument),
}

/// Instrument to merger selection. Single-bank instruments have nothing to
/// stitch and get the unsupported merger.
pub fn select_merger(instrument: SansInstrument) -> BankMerger {
    match instrument {
        SansInstrument::Larmor | SansInstrument::Loq | SansInstrument::Sans2D => BankMerger::Isis1D,
        SansInstrument::Zoom => BankMerger::Unsupported(instrument),
    }
}

/// The undivided count/norm pair for one bank
#[derive(Debug, Clone, Copy)]
pub struct MergePartials<'a> {
    pub count: &'a Workspace,
    pub norm: &'a Workspace,
}

/// Everything the stitch needs. The primary bank's calibration wins; the
/// secondary bank is reconciled onto it (normally LAB primary, HAB
/// secondary).
#[derive(Debug, Clone, Copy)]
pub struct MergeRequest<'a> {
    pub primary: MergePartials<'a>,
    pub secondary: MergePartials<'a>,
    pub can_primary: Option<MergePartials<'a>>,
    pub can_secondary: Option<MergePartials<'a>>,
    pub fit_mode: FitMode,
    pub shift: f64,
    pub scale: f64,
    pub merge_min: Option<f64>,
    pub merge_max: Option<f64>,
}

struct BankArrays {
    counts: Vec<f64>,
    variance: Vec<f64>,
    norm: Vec<f64>,
}

/// Flatten a bank's partials and, when a complete can is supplied, subtract
/// the can rate in deferred-division form: C' = C - N * (C_can / N_can).
fn bank_arrays(
    sample: &MergePartials,
    can: Option<&MergePartials>,
) -> Result<BankArrays, MergeError> {
    let count = sample.count.first()?;
    let norm = sample.norm.first()?;
    let mut arrays = BankArrays {
        counts: count.y.clone(),
        variance: count.e.iter().map(|e| e.powi(2)).collect(),
        norm: norm.y.clone(),
    };
    if let Some(can) = can {
        sample.count.same_binning(can.count)?;
        can.count.same_binning(can.norm)?;
        let can_count = can.count.first()?;
        let can_norm = can.norm.first()?;
        for i in 0..arrays.counts.len() {
            if can_norm.y[i] > 0.0 {
                let rate = can_count.y[i] / can_norm.y[i];
                arrays.counts[i] -= arrays.norm[i] * rate;
                let factor = arrays.norm[i] / can_norm.y[i];
                arrays.variance[i] += (factor * can_count.e[i]).powi(2);
            }
        }
    }
    Ok(arrays)
}

/// Closed-form least squares of scale*sec + shift - pri over the overlap.
///
/// A degenerate overlap (no variance in the secondary signal) pins the shift
/// to its supplied value and fits scale alone.
fn fit_shift_scale(
    primary: &[f64],
    secondary: &[f64],
    fit_mode: FitMode,
    shift0: f64,
    scale0: f64,
) -> (f64, f64) {
    let n = primary.len() as f64;
    match fit_mode {
        FitMode::NoFit => (scale0, shift0),
        FitMode::ShiftOnly => {
            let shift = primary
                .iter()
                .zip(secondary.iter())
                .map(|(p, s)| p - scale0 * s)
                .sum::<f64>()
                / n;
            (scale0, shift)
        }
        FitMode::ScaleOnly => {
            let num: f64 = primary
                .iter()
                .zip(secondary.iter())
                .map(|(p, s)| s * (p - shift0))
                .sum();
            let den: f64 = secondary.iter().map(|s| s * s).sum();
            if den > 0.0 {
                (num / den, shift0)
            } else {
                (scale0, shift0)
            }
        }
        FitMode::Both => {
            let sum_s: f64 = secondary.iter().sum();
            let sum_p: f64 = primary.iter().sum();
            let sum_ss: f64 = secondary.iter().map(|s| s * s).sum();
            let sum_sp: f64 = primary.iter().zip(secondary.iter()).map(|(p, s)| p * s).sum();
            let det = n * sum_ss - sum_s * sum_s;
            if det.abs() < 1e-12 * (n * sum_ss).abs().max(1.0) {
                // Constant secondary signal over the overlap; fall back
                fit_shift_scale(primary, secondary, FitMode::ScaleOnly, shift0, scale0)
            } else {
                let scale = (n * sum_sp - sum_s * sum_p) / det;
                let shift = (sum_p - scale * sum_s) / n;
                (scale, shift)
            }
        }
    }
}

impl BankMerger {
    /// Stitch the secondary bank onto the primary and return the merged
    /// curve along with the shift/scale that were actually used.
    pub fn merge(&self, request: &MergeRequest) -> Result<MergeBundle, MergeError> {
        let instrument = match self {
            BankMerger::Isis1D => None,
            BankMerger::Unsupported(instrument) => Some(*instrument),
        };
        if let Some(instrument) = instrument {
            return Err(MergeError::NotImplemented(instrument.to_string()));
        }

        request.primary.count.same_binning(request.secondary.count)?;
        request.primary.count.same_binning(request.primary.norm)?;
        request.secondary.count.same_binning(request.secondary.norm)?;

        // A partially supplied can cannot be corrected for symmetrically;
        // skip the correction entirely rather than apply half of it.
        let (can_primary, can_secondary) =
            match (request.can_primary.as_ref(), request.can_secondary.as_ref()) {
                (Some(primary), Some(secondary)) => (Some(primary), Some(secondary)),
                (can_p, can_s) => {
                    if can_p.is_some() != can_s.is_some() {
                        log::warn!(
                            "Can partials are incomplete; skipping can correction in merge"
                        );
                    }
                    (None, None)
                }
            };

        let primary = bank_arrays(&request.primary, can_primary)?;
        let secondary = bank_arrays(&request.secondary, can_secondary)?;

        let edges = request.primary.count.first()?.x.clone();
        let centers: Vec<f64> = (0..edges.len() - 1)
            .map(|i| 0.5 * (edges[i] + edges[i + 1]))
            .collect();

        // Overlap: bins both banks normalized, inside the merge window
        let mut overlap_p = Vec::new();
        let mut overlap_s = Vec::new();
        for i in 0..centers.len() {
            if primary.norm[i] <= 0.0 || secondary.norm[i] <= 0.0 {
                continue;
            }
            if let Some(min) = request.merge_min {
                if centers[i] < min {
                    continue;
                }
            }
            if let Some(max) = request.merge_max {
                if centers[i] > max {
                    continue;
                }
            }
            overlap_p.push(primary.counts[i] / primary.norm[i]);
            overlap_s.push(secondary.counts[i] / secondary.norm[i]);
        }
        if overlap_p.is_empty() && request.fit_mode != FitMode::NoFit {
            return Err(MergeError::EmptyOverlap);
        }

        let (scale, shift) = fit_shift_scale(
            &overlap_p,
            &overlap_s,
            request.fit_mode,
            request.shift,
            request.scale,
        );

        // Combine in deferred-division form, folding the fitted factors into
        // the secondary counts: y = (Cp + scale*Cs + shift*Ns) / (Np + Ns)
        let n_bins = centers.len();
        let mut y = vec![f64::NAN; n_bins];
        let mut e = vec![f64::NAN; n_bins];
        for i in 0..n_bins {
            let total_norm = primary.norm[i] + secondary.norm[i];
            if total_norm > 0.0 {
                y[i] = (primary.counts[i]
                    + scale * secondary.counts[i]
                    + shift * secondary.norm[i])
                    / total_norm;
                e[i] = (primary.variance[i] + scale.powi(2) * secondary.variance[i]).sqrt()
                    / total_norm;
            }
        }

        let mut spectrum = Spectrum {
            x: edges,
            y,
            e,
            dx: None,
            two_theta: 0.0,
            azimuth: 0.0,
            masked: false,
        };
        // The merged curve inherits the primary bank's Q resolution
        if let Some(dx) = &request.primary.count.first()?.dx {
            spectrum.dx = Some(dx.clone());
        }

        Ok(MergeBundle {
            merged_workspace: Workspace::single(WsUnit::MomentumTransfer, spectrum),
            shift,
            scale,
        })
    }
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkspaceError;

    fn partial(y: Vec<f64>, norm: Vec<f64>) -> (Workspace, Workspace) {
        let n = y.len();
        let edges: Vec<f64> = (0..=n).map(|i| 0.1 + i as f64 * 0.1).collect();
        let count = Spectrum {
            x: edges.clone(),
            e: y.iter().map(|v: &f64| v.abs().sqrt()).collect(),
            y,
            dx: None,
            two_theta: 0.0,
            azimuth: 0.0,
            masked: false,
        };
        let norm = Spectrum {
            x: edges,
            e: vec![0.0; n],
            y: norm,
            dx: None,
            two_theta: 0.0,
            azimuth: 0.0,
            masked: false,
        };
        (
            Workspace::single(WsUnit::MomentumTransfer, count),
            Workspace::single(WsUnit::MomentumTransfer, norm),
        )
    }

    fn request<'a>(
        primary: (&'a Workspace, &'a Workspace),
        secondary: (&'a Workspace, &'a Workspace),
        fit_mode: FitMode,
    ) -> MergeRequest<'a> {
        MergeRequest {
            primary: MergePartials {
                count: primary.0,
                norm: primary.1,
            },
            secondary: MergePartials {
                count: secondary.0,
                norm: secondary.1,
            },
            can_primary: None,
            can_secondary: None,
            fit_mode,
            shift: 0.0,
            scale: 1.0,
            merge_min: None,
            merge_max: None,
        }
    }

    #[test]
    fn test_fit_recovers_known_scale_and_shift() {
        // Primary sees 10 over bins 0..3, secondary sees 20 over bins 1..4;
        // the overlap is offset by a known factor of 0.5 with no shift
        let (pc, pn) = partial(vec![10.0, 10.0, 10.0, 0.0], vec![1.0, 1.0, 1.0, 0.0]);
        let (sc, sn) = partial(vec![0.0, 20.0, 20.0, 20.0], vec![0.0, 1.0, 1.0, 1.0]);
        let bundle = select_merger(SansInstrument::Sans2D)
            .merge(&request((&pc, &pn), (&sc, &sn), FitMode::Both))
            .unwrap();
        assert!((bundle.scale - 0.5).abs() < 1e-9);
        assert!(bundle.shift.abs() < 1e-9);
        // Every merged bin reconciles to the primary calibration
        let spectrum = bundle.merged_workspace.first().unwrap();
        for value in spectrum.y.iter() {
            assert!((value - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sloped_overlap_fits_both_factors() {
        let (pc, pn) = partial(vec![4.0, 6.0, 8.0], vec![1.0, 1.0, 1.0]);
        // secondary = (primary - 1) * 2, so scale = 0.5 and shift = 1
        let (sc, sn) = partial(vec![6.0, 10.0, 14.0], vec![1.0, 1.0, 1.0]);
        let bundle = select_merger(SansInstrument::Loq)
            .merge(&request((&pc, &pn), (&sc, &sn), FitMode::Both))
            .unwrap();
        assert!((bundle.scale - 0.5).abs() < 1e-9);
        assert!((bundle.shift - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_shift_only_holds_scale_fixed() {
        let (pc, pn) = partial(vec![10.0, 10.0], vec![1.0, 1.0]);
        let (sc, sn) = partial(vec![8.0, 8.0], vec![1.0, 1.0]);
        let bundle = select_merger(SansInstrument::Larmor)
            .merge(&request((&pc, &pn), (&sc, &sn), FitMode::ShiftOnly))
            .unwrap();
        assert!((bundle.scale - 1.0).abs() < 1e-12);
        assert!((bundle.shift - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_fit_uses_supplied_factors() {
        let (pc, pn) = partial(vec![10.0, 10.0], vec![1.0, 1.0]);
        let (sc, sn) = partial(vec![8.0, 8.0], vec![1.0, 1.0]);
        let mut req = request((&pc, &pn), (&sc, &sn), FitMode::NoFit);
        req.shift = 0.25;
        req.scale = 2.0;
        let bundle = select_merger(SansInstrument::Sans2D).merge(&req).unwrap();
        assert!((bundle.scale - 2.0).abs() < 1e-12);
        assert!((bundle.shift - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_incomplete_can_partials_skip_correction() {
        let (pc, pn) = partial(vec![10.0, 10.0], vec![1.0, 1.0]);
        let (sc, sn) = partial(vec![20.0, 20.0], vec![1.0, 1.0]);
        let (cc, cn) = partial(vec![100.0, 100.0], vec![1.0, 1.0]);
        let mut req = request((&pc, &pn), (&sc, &sn), FitMode::Both);
        // Only the primary can is available; the correction must be skipped
        // entirely, not applied to one bank
        req.can_primary = Some(MergePartials {
            count: &cc,
            norm: &cn,
        });
        let bundle = select_merger(SansInstrument::Sans2D).merge(&req).unwrap();
        assert!((bundle.scale - 0.5).abs() < 1e-9);
        let spectrum = bundle.merged_workspace.first().unwrap();
        for value in spectrum.y.iter() {
            assert!((value - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_mis_binned_can_partials_are_rejected() {
        let (pc, pn) = partial(vec![10.0, 10.0], vec![1.0, 1.0]);
        let (sc, sn) = partial(vec![20.0, 20.0], vec![1.0, 1.0]);
        // The can has one bin fewer than the sample partials
        let (cc, cn) = partial(vec![100.0], vec![1.0]);
        let mut req = request((&pc, &pn), (&sc, &sn), FitMode::Both);
        req.can_primary = Some(MergePartials {
            count: &cc,
            norm: &cn,
        });
        req.can_secondary = Some(MergePartials {
            count: &cc,
            norm: &cn,
        });
        let result = select_merger(SansInstrument::Sans2D).merge(&req);
        assert!(matches!(
            result,
            Err(MergeError::WorkspaceError(
                WorkspaceError::IncompatibleBinning(_, _)
            ))
        ));
    }

    #[test]
    fn test_unsupported_merger_is_typed_error() {
        let (pc, pn) = partial(vec![1.0], vec![1.0]);
        let (sc, sn) = partial(vec![1.0], vec![1.0]);
        let result = select_merger(SansInstrument::Zoom)
            .merge(&request((&pc, &pn), (&sc, &sn), FitMode::Both));
        assert!(matches!(result, Err(MergeError::NotImplemented(_))));
    }

    #[test]
    fn test_disjoint_banks_have_no_overlap() {
        let (pc, pn) = partial(vec![10.0, 0.0], vec![1.0, 0.0]);
        let (sc, sn) = partial(vec![0.0, 20.0], vec![0.0, 1.0]);
        let result = select_merger(SansInstrument::Sans2D)
            .merge(&request((&pc, &pn), (&sc, &sn), FitMode::Both));
        assert!(matches!(result, Err(MergeError::EmptyOverlap)));
    }
}
