//! Hash-keyed reuse of can reductions.
//!
//! A batch of sample reductions usually shares one can configuration, so the
//! can partials are tagged in the workspace store under the can-variant
//! state hash. A cache hit wraps the stored workspaces back into bundles;
//! callers cannot tell a hit from a fresh run except by timing.

use super::algorithms;
use super::bundles::{DataType, OutputBundle, OutputPartsBundle, ReductionMode};
use super::error::ReductionError;
use super::state::{SansState, StateHash};
use super::workspace::WorkspaceStore;

pub fn reduced_can_name(hash: &StateHash, mode: ReductionMode) -> String {
    format!("sans_can_{hash}_{mode}_reduced")
}

pub fn count_can_name(hash: &StateHash, mode: ReductionMode) -> String {
    format!("sans_can_{hash}_{mode}_count")
}

pub fn norm_can_name(hash: &StateHash, mode: ReductionMode) -> String {
    format!("sans_can_{hash}_{mode}_norm")
}

/// A cache hit, shaped exactly like a fresh reduction's outputs
#[derive(Debug, Clone)]
pub struct CachedCan {
    pub output: OutputBundle,
    pub parts: Option<OutputPartsBundle>,
}

/// Consult the store for a previously computed can reduction.
///
/// Reuse is safe only when the caller does not need fresh partials, or when
/// both partial workspaces already exist. If partials are wanted and either
/// one is missing, any stale non-partial result under this hash is discarded
/// and None is returned so a fresh reduction runs.
pub fn check_can_cache(
    store: &mut WorkspaceStore,
    hash: &StateHash,
    mode: ReductionMode,
    want_parts: bool,
    can_state: &SansState,
) -> Result<Option<CachedCan>, ReductionError> {
    let reduced_name = reduced_can_name(hash, mode);
    let count_name = count_can_name(hash, mode);
    let norm_name = norm_can_name(hash, mode);

    let have_count = store.contains(&count_name);
    let have_norm = store.contains(&norm_name);
    let have_reduced = store.contains(&reduced_name);

    let wrap_output = |workspace| OutputBundle {
        state: can_state.clone(),
        data_type: DataType::Can,
        reduction_mode: mode,
        output_workspace: workspace,
    };

    if want_parts {
        if !(have_count && have_norm) {
            if have_reduced {
                log::info!(
                    "Discarding stale cached can {hash} ({mode}): partials are required but incomplete"
                );
                store.remove(&reduced_name);
            }
            return Ok(None);
        }
        let count = store.retrieve(&count_name)?.clone();
        let norm = store.retrieve(&norm_name)?.clone();
        let output = match store.get(&reduced_name) {
            Some(reduced) => wrap_output(reduced.clone()),
            None => wrap_output(algorithms::divide_workspaces(&count, &norm)?),
        };
        log::debug!("Reusing cached can partials for {hash} ({mode})");
        return Ok(Some(CachedCan {
            output,
            parts: Some(OutputPartsBundle {
                state: can_state.clone(),
                data_type: DataType::Can,
                reduction_mode: mode,
                output_workspace_count: count,
                output_workspace_norm: norm,
            }),
        }));
    }

    if have_reduced {
        log::debug!("Reusing cached can reduction for {hash} ({mode})");
        let output = wrap_output(store.retrieve(&reduced_name)?.clone());
        return Ok(Some(CachedCan {
            output,
            parts: None,
        }));
    }
    if have_count && have_norm {
        let count = store.retrieve(&count_name)?;
        let norm = store.retrieve(&norm_name)?;
        let output = wrap_output(algorithms::divide_workspaces(count, norm)?);
        log::debug!("Rebuilt can reduction from cached partials for {hash} ({mode})");
        return Ok(Some(CachedCan {
            output,
            parts: None,
        }));
    }
    Ok(None)
}

/// Tag a fresh can reduction's outputs in the store so later samples in the
/// batch can reuse them.
pub fn store_can_outputs(
    store: &mut WorkspaceStore,
    hash: &StateHash,
    output: &OutputBundle,
    parts: Option<&OutputPartsBundle>,
) {
    let mode = output.reduction_mode;
    store.insert(reduced_can_name(hash, mode), output.output_workspace.clone());
    if let Some(parts) = parts {
        store.insert(
            count_can_name(hash, mode),
            parts.output_workspace_count.clone(),
        );
        store.insert(
            norm_can_name(hash, mode),
            parts.output_workspace_norm.clone(),
        );
    }
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::SansInstrument;
    use crate::state::SansStateBuilder;
    use crate::workspace::{Spectrum, Workspace, WsUnit};

    fn can_state() -> SansState {
        SansStateBuilder::new(SansInstrument::Sans2D)
            .with_data(|d| d.sample_scatter("SANS2D00022048"))
            .with_convert_to_q(|q| q.one_dim(0.01, 1.0, 0.02))
            .build()
            .unwrap()
    }

    fn curve(y: Vec<f64>) -> Workspace {
        let n = y.len();
        Workspace::single(
            WsUnit::MomentumTransfer,
            Spectrum {
                x: (0..=n).map(|i| i as f64 * 0.1).collect(),
                e: vec![0.1; n],
                y,
                dx: None,
                two_theta: 0.0,
                azimuth: 0.0,
                masked: false,
            },
        )
    }

    fn hash() -> StateHash {
        can_state().hash().unwrap()
    }

    #[test]
    fn test_miss_on_empty_store() {
        let mut store = WorkspaceStore::new();
        let result =
            check_can_cache(&mut store, &hash(), ReductionMode::Lab, false, &can_state()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_hit_on_reduced_result() {
        let mut store = WorkspaceStore::new();
        let hash = hash();
        store.insert(reduced_can_name(&hash, ReductionMode::Lab), curve(vec![5.0, 6.0]));
        let cached = check_can_cache(&mut store, &hash, ReductionMode::Lab, false, &can_state())
            .unwrap()
            .unwrap();
        assert_eq!(cached.output.data_type, DataType::Can);
        assert_eq!(cached.output.output_workspace.first().unwrap().y, vec![5.0, 6.0]);
        assert!(cached.parts.is_none());
    }

    #[test]
    fn test_want_parts_with_missing_norm_is_a_miss() {
        let mut store = WorkspaceStore::new();
        let hash = hash();
        // Only the count partial exists; the stale reduced result must be
        // discarded and no reuse allowed
        store.insert(count_can_name(&hash, ReductionMode::Lab), curve(vec![5.0]));
        store.insert(reduced_can_name(&hash, ReductionMode::Lab), curve(vec![5.0]));
        let result =
            check_can_cache(&mut store, &hash, ReductionMode::Lab, true, &can_state()).unwrap();
        assert!(result.is_none());
        assert!(!store.contains(&reduced_can_name(&hash, ReductionMode::Lab)));
        // The partial itself is left for a later non-parts lookup to ignore
        assert!(store.contains(&count_can_name(&hash, ReductionMode::Lab)));
    }

    #[test]
    fn test_want_parts_with_both_partials_is_a_hit() {
        let mut store = WorkspaceStore::new();
        let hash = hash();
        store.insert(count_can_name(&hash, ReductionMode::Hab), curve(vec![10.0, 20.0]));
        store.insert(norm_can_name(&hash, ReductionMode::Hab), curve(vec![2.0, 4.0]));
        let cached = check_can_cache(&mut store, &hash, ReductionMode::Hab, true, &can_state())
            .unwrap()
            .unwrap();
        let parts = cached.parts.unwrap();
        assert_eq!(
            parts.output_workspace_count.first().unwrap().y,
            vec![10.0, 20.0]
        );
        // The divided output is rebuilt from the partials
        assert_eq!(cached.output.output_workspace.first().unwrap().y, vec![5.0, 5.0]);
    }

    #[test]
    fn test_roundtrip_through_store() {
        let mut store = WorkspaceStore::new();
        let hash = hash();
        let output = OutputBundle {
            state: can_state(),
            data_type: DataType::Can,
            reduction_mode: ReductionMode::Lab,
            output_workspace: curve(vec![1.0, 2.0]),
        };
        let parts = OutputPartsBundle {
            state: can_state(),
            data_type: DataType::Can,
            reduction_mode: ReductionMode::Lab,
            output_workspace_count: curve(vec![2.0, 8.0]),
            output_workspace_norm: curve(vec![2.0, 4.0]),
        };
        store_can_outputs(&mut store, &hash, &output, Some(&parts));
        let cached = check_can_cache(&mut store, &hash, ReductionMode::Lab, true, &can_state())
            .unwrap()
            .unwrap();
        assert_eq!(cached.output.output_workspace.first().unwrap().y, vec![1.0, 2.0]);
        assert!(cached.parts.is_some());
    }
}
