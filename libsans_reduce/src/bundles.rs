use serde::{Deserialize, Serialize};

use super::state::SansState;
use super::workspace::Workspace;

/// Whether a unit of work reduces sample or background (can) data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Sample,
    Can,
}

/// Which detector banks a reduction request covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionMode {
    Lab,
    Hab,
    Merged,
    All,
}

impl std::fmt::Display for ReductionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReductionMode::Lab => write!(f, "LAB"),
            ReductionMode::Hab => write!(f, "HAB"),
            ReductionMode::Merged => write!(f, "Merged"),
            ReductionMode::All => write!(f, "All"),
        }
    }
}

/// Which of the shift/scale factors the stitch fits, the rest being held at
/// their caller-supplied values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitMode {
    Both,
    ShiftOnly,
    ScaleOnly,
    NoFit,
}

/// One unit of work for the reduction core: a validated state plus the
/// workspace names to operate on, for one (bank, data type) combination.
#[derive(Debug, Clone)]
pub struct ReductionSettingBundle {
    pub state: SansState,
    pub data_type: DataType,
    pub reduction_mode: ReductionMode,
    pub output_parts: bool,
    pub scatter_workspace: String,
    pub monitor_workspace: Option<String>,
    pub transmission_workspace: Option<String>,
    pub direct_workspace: Option<String>,
}

/// The divided (counts/normalization) result of one partial reduction
#[derive(Debug, Clone)]
pub struct OutputBundle {
    pub state: SansState,
    pub data_type: DataType,
    pub reduction_mode: ReductionMode,
    pub output_workspace: Workspace,
}

/// The undivided numerator/denominator pair of one partial reduction,
/// retained so a cached can reduction can recombine with a different sample
/// without redoing the pipeline.
#[derive(Debug, Clone)]
pub struct OutputPartsBundle {
    pub state: SansState,
    pub data_type: DataType,
    pub reduction_mode: ReductionMode,
    pub output_workspace_count: Workspace,
    pub output_workspace_norm: Workspace,
}

/// Final output of stitching two banks: the merged curve and the shift/scale
/// factors that were actually used (fitted or fixed).
#[derive(Debug, Clone)]
pub struct MergeBundle {
    pub merged_workspace: Workspace,
    pub shift: f64,
    pub scale: f64,
}

/// The (sample, can) cell for one reduction mode. A missing entry is an
/// explicit None, never a silently dropped bundle.
#[derive(Debug, Clone, Default)]
pub struct ModeBundles<T> {
    pub sample: Option<T>,
    pub can: Option<T>,
}

impl<T> ModeBundles<T> {
    fn put(&mut self, data_type: DataType, bundle: T) {
        match data_type {
            DataType::Sample => self.sample = Some(bundle),
            DataType::Can => self.can = Some(bundle),
        }
    }
}

/// Per-bank grouping of a flat list of reduction results
#[derive(Debug, Clone)]
pub struct GroupedBundles<T> {
    pub lab: ModeBundles<T>,
    pub hab: ModeBundles<T>,
}

impl<T> Default for GroupedBundles<T> {
    fn default() -> Self {
        Self {
            lab: ModeBundles {
                sample: None,
                can: None,
            },
            hab: ModeBundles {
                sample: None,
                can: None,
            },
        }
    }
}

impl<T> GroupedBundles<T> {
    pub fn cell(&self, mode: ReductionMode) -> &ModeBundles<T> {
        match mode {
            ReductionMode::Hab => &self.hab,
            _ => &self.lab,
        }
    }
}

/// Group divided results by reduction mode. Pure bookkeeping: no workspace is
/// touched, and later duplicates for a cell replace earlier ones.
pub fn group_output_bundles(bundles: Vec<OutputBundle>) -> GroupedBundles<OutputBundle> {
    let mut grouped = GroupedBundles::default();
    for bundle in bundles {
        match bundle.reduction_mode {
            ReductionMode::Hab => grouped.hab.put(bundle.data_type, bundle),
            _ => grouped.lab.put(bundle.data_type, bundle),
        }
    }
    grouped
}

/// Group undivided count/norm pairs by reduction mode
pub fn group_parts_bundles(bundles: Vec<OutputPartsBundle>) -> GroupedBundles<OutputPartsBundle> {
    let mut grouped = GroupedBundles::default();
    for bundle in bundles {
        match bundle.reduction_mode {
            ReductionMode::Hab => grouped.hab.put(bundle.data_type, bundle),
            _ => grouped.lab.put(bundle.data_type, bundle),
        }
    }
    grouped
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::SansInstrument;
    use crate::state::SansStateBuilder;
    use crate::workspace::{Spectrum, WsUnit};

    fn test_state() -> SansState {
        SansStateBuilder::new(SansInstrument::Loq)
            .with_data(|d| d.sample_scatter("LOQ74044"))
            .with_convert_to_q(|q| q.one_dim(0.01, 1.0, 0.02))
            .build()
            .unwrap()
    }

    fn test_workspace() -> Workspace {
        Workspace::single(
            WsUnit::MomentumTransfer,
            Spectrum::new(vec![0.0, 1.0], vec![1.0], vec![0.1], 0.01, 0.0).unwrap(),
        )
    }

    #[test]
    fn test_grouping_fills_cells() {
        let state = test_state();
        let bundles = vec![
            OutputBundle {
                state: state.clone(),
                data_type: DataType::Sample,
                reduction_mode: ReductionMode::Lab,
                output_workspace: test_workspace(),
            },
            OutputBundle {
                state: state.clone(),
                data_type: DataType::Can,
                reduction_mode: ReductionMode::Hab,
                output_workspace: test_workspace(),
            },
        ];
        let grouped = group_output_bundles(bundles);
        assert!(grouped.lab.sample.is_some());
        assert!(grouped.lab.can.is_none());
        assert!(grouped.hab.sample.is_none());
        assert!(grouped.hab.can.is_some());
    }
}
