//! Per-bank finalization: can subtraction, Q-resolution transfer, and the
//! flat-end trim.

use super::algorithms;
use super::bundles::OutputBundle;
use super::error::ReductionError;
use super::workspace::Workspace;

/// Copy the sample's per-bin Q-resolution onto a 1D result verbatim.
///
/// The can's own resolution, if any, is deliberately ignored; it is treated
/// as negligible next to the sample's.
pub fn transfer_q_resolution(sample: &Workspace, target: &mut Workspace) {
    if !sample.is_1d() || !target.is_1d() {
        return;
    }
    if let (Ok(from), Some(to)) = (sample.first(), target.spectra.first_mut()) {
        if let Some(dx) = &from.dx {
            to.dx = Some(dx.clone());
        }
    }
}

/// Subtract the can from the sample for one bank, if a can was reduced;
/// otherwise pass the sample through unchanged. The subtracted result then
/// has its edge NaN/Inf bins stripped.
pub fn finalize_bank(
    sample: OutputBundle,
    can: Option<&OutputBundle>,
) -> Result<Workspace, ReductionError> {
    let mut result = match can {
        Some(can) => {
            let subtracted = algorithms::subtract(
                &sample.output_workspace,
                &can.output_workspace,
            )?;
            let mut subtracted = subtracted;
            transfer_q_resolution(&sample.output_workspace, &mut subtracted);
            subtracted
        }
        None => sample.output_workspace,
    };
    algorithms::trim_flat_ends(&mut result);
    Ok(result)
}
