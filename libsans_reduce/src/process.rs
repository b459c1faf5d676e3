//! The batch driver: loads raw data, runs the per-bank reductions with can
//! caching, finalizes each bank, stitches when requested, and writes the
//! output curves.

use std::sync::mpsc::Sender;

use super::algorithms;
use super::bundles::{
    group_output_bundles, group_parts_bundles, DataType, MergeBundle, ModeBundles, OutputBundle,
    OutputPartsBundle, ReductionMode, ReductionSettingBundle,
};
use super::cache;
use super::config::ReductionRequest;
use super::error::{MergeError, ProcessorError, ReductionError, WorkspaceError};
use super::merge::{select_merger, MergePartials, MergeRequest};
use super::postprocess::finalize_bank;
use super::reduction::run_core_reduction;
use super::state::SansState;
use super::worker_status::{RunStage, WorkerStatus};
use super::workspace::{Workspace, WorkspaceStore};

/// Everything one run's reduction produced. Bank curves are present only for
/// the modes that output them; the merged curve only when stitching ran.
#[derive(Debug, Clone)]
pub struct ReductionOutput {
    pub lab: Option<Workspace>,
    pub hab: Option<Workspace>,
    pub merged: Option<MergeBundle>,
}

/// The banks a reduction mode executes. Merged and All reduce both so the
/// stitch has partials from each.
fn banks_for(mode: ReductionMode) -> Vec<ReductionMode> {
    match mode {
        ReductionMode::Lab => vec![ReductionMode::Lab],
        ReductionMode::Hab => vec![ReductionMode::Hab],
        ReductionMode::Merged | ReductionMode::All => {
            vec![ReductionMode::Lab, ReductionMode::Hab]
        }
    }
}

fn sample_bundle(
    state: &SansState,
    bank: ReductionMode,
    want_parts: bool,
    scatter_name: &str,
    monitor_name: Option<&str>,
) -> ReductionSettingBundle {
    ReductionSettingBundle {
        state: state.clone(),
        data_type: DataType::Sample,
        reduction_mode: bank,
        output_parts: want_parts,
        scatter_workspace: scatter_name.to_string(),
        monitor_workspace: monitor_name.map(String::from),
        transmission_workspace: state.data.sample_transmission.clone(),
        direct_workspace: state.data.sample_direct.clone(),
    }
}

fn take_partials<'a>(
    cell: &'a ModeBundles<OutputPartsBundle>,
    label: &str,
) -> Result<MergePartials<'a>, MergeError> {
    let parts = cell
        .sample
        .as_ref()
        .ok_or_else(|| MergeError::MissingPartial(label.to_string()))?;
    Ok(MergePartials {
        count: &parts.output_workspace_count,
        norm: &parts.output_workspace_norm,
    })
}

fn can_partials(cell: &ModeBundles<OutputPartsBundle>) -> Option<MergePartials<'_>> {
    cell.can.as_ref().map(|parts| MergePartials {
        count: &parts.output_workspace_count,
        norm: &parts.output_workspace_norm,
    })
}

/// Reduce one validated state against raw workspaces already present in the
/// store under the given names.
///
/// Can reductions are served from the store cache whenever the reuse rules
/// allow; fresh can results are tagged back into the store for later runs in
/// the batch. The raw scatter workspace is the caller's to clean up.
pub fn reduce_state(
    state: &SansState,
    scatter_name: &str,
    can_name: Option<&str>,
    monitor_name: Option<&str>,
    store: &mut WorkspaceStore,
) -> Result<ReductionOutput, ProcessorError> {
    let mode = state.reduction.mode;
    let banks = banks_for(mode);
    let want_parts = state.reduction.wants_merge();

    let mut outputs: Vec<OutputBundle> = Vec::new();
    let mut parts: Vec<OutputPartsBundle> = Vec::new();

    for bank in &banks {
        let bundle = sample_bundle(state, *bank, want_parts, scatter_name, monitor_name);
        let (output, part) = run_core_reduction(&bundle, store)?;
        outputs.push(output);
        if let Some(part) = part {
            parts.push(part);
        }
    }

    if let (Some(can_name), Some(can_state)) = (can_name, state.can_variant()) {
        let hash = can_state.hash().map_err(ReductionError::StateError)?;
        for bank in &banks {
            match cache::check_can_cache(store, &hash, *bank, want_parts, &can_state)? {
                Some(cached) => {
                    outputs.push(cached.output);
                    if let Some(part) = cached.parts {
                        parts.push(part);
                    }
                }
                None => {
                    let bundle = ReductionSettingBundle {
                        state: can_state.clone(),
                        data_type: DataType::Can,
                        reduction_mode: *bank,
                        output_parts: want_parts,
                        scatter_workspace: can_name.to_string(),
                        monitor_workspace: monitor_name.map(String::from),
                        // can_variant folds the can transmission entries into
                        // the sample slots
                        transmission_workspace: can_state.data.sample_transmission.clone(),
                        direct_workspace: can_state.data.sample_direct.clone(),
                    };
                    let (output, part) = run_core_reduction(&bundle, store)?;
                    cache::store_can_outputs(store, &hash, &output, part.as_ref());
                    outputs.push(output);
                    if let Some(part) = part {
                        parts.push(part);
                    }
                }
            }
        }
    }

    let mut grouped = group_output_bundles(outputs);
    let grouped_parts = group_parts_bundles(parts);

    let mut lab = None;
    let mut hab = None;
    if mode != ReductionMode::Merged {
        for bank in &banks {
            let cell = match bank {
                ReductionMode::Hab => &mut grouped.hab,
                _ => &mut grouped.lab,
            };
            let sample = cell.sample.take().ok_or_else(|| {
                ReductionError::WorkspaceError(WorkspaceError::MissingWorkspace(format!(
                    "sample {bank} reduction output"
                )))
            })?;
            let finalized = finalize_bank(sample, cell.can.as_ref())?;
            match bank {
                ReductionMode::Hab => hab = Some(finalized),
                _ => lab = Some(finalized),
            }
        }
    }

    let merged = if state.reduction.wants_merge() {
        let merger = select_merger(state.instrument);
        let request = MergeRequest {
            primary: take_partials(&grouped_parts.lab, "LAB sample")?,
            secondary: take_partials(&grouped_parts.hab, "HAB sample")?,
            can_primary: can_partials(&grouped_parts.lab),
            can_secondary: can_partials(&grouped_parts.hab),
            fit_mode: state.reduction.merge_fit_mode,
            shift: state.reduction.merge_shift,
            scale: state.reduction.merge_scale,
            merge_min: state.reduction.merge_min,
            merge_max: state.reduction.merge_max,
        };
        let mut bundle = merger.merge(&request)?;
        algorithms::trim_flat_ends(&mut bundle.merged_workspace);
        Some(bundle)
    } else {
        None
    };

    Ok(ReductionOutput { lab, hab, merged })
}

/// Reduce one run of the batch and write its output curves.
///
/// Raw can and monitor data are loaded into the store once and kept for later
/// runs; the raw scatter workspace is removed on every exit path.
pub fn process_run(
    request: &ReductionRequest,
    run_number: i32,
    store: &mut WorkspaceStore,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<(), ProcessorError> {
    let state = request.build_state(run_number)?;

    tx.send(WorkerStatus::new(
        0.0,
        run_number,
        *worker_id,
        RunStage::Loading,
    ))?;

    let can_name = request.can_run.clone();
    if let (Some(name), Some(path)) = (&can_name, request.get_can_file_name()) {
        if !store.contains(name) {
            store.insert(name.clone(), algorithms::load_workspace(&path)?);
        }
    }
    let monitor_name = request.monitor_run.clone();
    if let (Some(name), Some(path)) = (&monitor_name, request.get_monitor_file_name()) {
        if !store.contains(name) {
            store.insert(name.clone(), algorithms::load_workspace(&path)?);
        }
    }
    for entry in [
        state.data.sample_transmission.as_ref(),
        state.data.sample_direct.as_ref(),
        state.data.can_transmission.as_ref(),
        state.data.can_direct.as_ref(),
    ]
    .into_iter()
    .flatten()
    {
        if !store.contains(entry) {
            store.insert(
                entry.clone(),
                algorithms::load_workspace(&request.get_data_file_name(entry))?,
            );
        }
    }

    // The scatter workspace loads last, after every shared input, so a failed
    // support load leaves nothing run-specific behind in the store
    let scatter_name = request.get_run_str(run_number);
    store.insert(
        scatter_name.clone(),
        algorithms::load_workspace(&request.get_run_file_name(run_number))?,
    );

    tx.send(WorkerStatus::new(
        0.1,
        run_number,
        *worker_id,
        RunStage::Reducing,
    ))?;

    let outcome = reduce_state(
        &state,
        &scatter_name,
        can_name.as_deref(),
        monitor_name.as_deref(),
        store,
    );
    store.remove(&scatter_name);
    let output = outcome?;

    tx.send(WorkerStatus::new(
        0.8,
        run_number,
        *worker_id,
        RunStage::Writing,
    ))?;

    if let Some(lab) = &output.lab {
        algorithms::save_workspace(lab, &request.get_output_file_name(run_number, "LAB")?)?;
    }
    if let Some(hab) = &output.hab {
        algorithms::save_workspace(hab, &request.get_output_file_name(run_number, "HAB")?)?;
    }
    if let Some(merged) = &output.merged {
        log::info!(
            "Merged run {} with scale {:.4} and shift {:.4}",
            run_number,
            merged.scale,
            merged.shift
        );
        algorithms::save_workspace(
            &merged.merged_workspace,
            &request.get_output_file_name(run_number, "Merged")?,
        )?;
    }

    tx.send(WorkerStatus::new(
        1.0,
        run_number,
        *worker_id,
        RunStage::Done,
    ))?;
    Ok(())
}

/// The function to be called by a separate thread.
/// This flavor walks the whole configured run range; the CLI uses
/// [`process_subset`] so the range can be split across workers.
pub fn process(
    request: ReductionRequest,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<(), ProcessorError> {
    let mut store = WorkspaceStore::new();
    for run in request.first_run_number..(request.last_run_number + 1) {
        if request.does_run_exist(run) {
            log::info!("Processing run {}...", run);
            process_run(&request, run, &mut store, &tx, &worker_id)?;
            log::info!("Finished processing run {}.", run);
        } else {
            log::info!("Run {} does not exist, skipping...", run);
        }
    }
    Ok(())
}

/// Process a subset of runs
pub fn process_subset(
    request: ReductionRequest,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<i32>,
) -> Result<(), ProcessorError> {
    let mut store = WorkspaceStore::new();
    for run in subset {
        if request.does_run_exist(run) {
            log::info!("Processing run {}...", run);
            process_run(&request, run, &mut store, &tx, &worker_id)?;
            log::info!("Finished processing run {}.", run);
        } else {
            log::info!("Run {} does not exist, skipping...", run);
        }
    }
    Ok(())
}

/// Divide a run range in to a set of subranges (per thread/worker)
pub fn create_subsets(request: &ReductionRequest) -> Vec<Vec<i32>> {
    let mut subsets: Vec<Vec<i32>> = vec![Vec::new(); request.n_threads as usize];
    let n_subsets = subsets.len();

    for (idx, run) in (request.first_run_number..(request.last_run_number + 1)).enumerate() {
        subsets[idx % n_subsets].push(run)
    }

    subsets
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::common::StateReduction;
    use crate::state::SansStateBuilder;
    use crate::workspace::{Spectrum, WsUnit};
    use std::path::PathBuf;

    fn synthetic_bank(y_value: f64, n_spectra: usize) -> Workspace {
        let spectra = (0..n_spectra)
            .map(|i| {
                let x: Vec<f64> = (0..=20).map(|j| 1.0 + j as f64 * 0.5).collect();
                Spectrum {
                    y: vec![y_value; 20],
                    e: vec![y_value.sqrt(); 20],
                    x,
                    dx: None,
                    two_theta: 0.02 + i as f64 * 0.05,
                    azimuth: (i as f64) * 0.3,
                    masked: false,
                }
            })
            .collect();
        Workspace::new(WsUnit::Wavelength, spectra)
    }

    fn test_state(mode: ReductionMode, with_can: bool) -> SansState {
        SansStateBuilder::new(crate::instrument::SansInstrument::Sans2D)
            .with_data(|mut d| {
                d = d.sample_scatter("SANS2D00022024");
                if with_can {
                    d = d.can_scatter("SANS2D00022048");
                }
                d
            })
            .with_wavelength(|w| w.range(1.75, 16.5, 0.125))
            .with_convert_to_q(|q| q.one_dim(1e-3, 1.0, 5e-3))
            .reduction(StateReduction {
                mode,
                ..Default::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_lab_reduction_with_can() {
        let mut store = WorkspaceStore::new();
        store.insert("sample", synthetic_bank(100.0, 4));
        store.insert("can", synthetic_bank(10.0, 4));
        let state = test_state(ReductionMode::Lab, true);
        let output = reduce_state(&state, "sample", Some("can"), None, &mut store).unwrap();
        let lab = output.lab.unwrap();
        // Can subtraction leaves the flat excess rate; empty Q bins inside
        // the covered range stay NaN and are skipped
        let finite: Vec<f64> = lab
            .first()
            .unwrap()
            .y
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        assert!(!finite.is_empty());
        for value in finite {
            assert!((value - 90.0).abs() < 1e-9);
        }
        assert!(output.hab.is_none());
        assert!(output.merged.is_none());
        // The raw inputs are untouched; the can cache entries were tagged
        assert!(store.contains("sample"));
        let hash = state.can_variant().unwrap().hash().unwrap();
        assert!(store.contains(&cache::reduced_can_name(&hash, ReductionMode::Lab)));
    }

    #[test]
    fn test_all_mode_outputs_banks_and_merged() {
        let mut store = WorkspaceStore::new();
        store.insert("sample", synthetic_bank(100.0, 4));
        let state = test_state(ReductionMode::All, false);
        let output = reduce_state(&state, "sample", None, None, &mut store).unwrap();
        assert!(output.lab.is_some());
        assert!(output.hab.is_some());
        let merged = output.merged.unwrap();
        let finite: Vec<f64> = merged
            .merged_workspace
            .first()
            .unwrap()
            .y
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        assert!(!finite.is_empty());
        for value in finite {
            assert!((value - 100.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_merged_mode_outputs_only_merged() {
        let mut store = WorkspaceStore::new();
        store.insert("sample", synthetic_bank(100.0, 4));
        let state = test_state(ReductionMode::Merged, false);
        let output = reduce_state(&state, "sample", None, None, &mut store).unwrap();
        assert!(output.lab.is_none());
        assert!(output.hab.is_none());
        assert!(output.merged.is_some());
    }

    #[test]
    fn test_second_run_is_served_from_can_cache() {
        let mut store = WorkspaceStore::new();
        store.insert("sample", synthetic_bank(100.0, 4));
        store.insert("can", synthetic_bank(10.0, 4));
        let state = test_state(ReductionMode::Merged, true);
        let first = reduce_state(&state, "sample", Some("can"), None, &mut store).unwrap();
        // Remove the raw can data; a second identical run can only succeed by
        // reusing the cached partials
        store.remove("can");
        let second = reduce_state(&state, "sample", Some("can"), None, &mut store).unwrap();
        let first_y = first.merged.unwrap().merged_workspace.first().unwrap().y.clone();
        let second_y = second.merged.unwrap().merged_workspace.first().unwrap().y.clone();
        // Bitwise comparison so identical NaN bins count as equal
        assert_eq!(first_y.len(), second_y.len());
        for (a, b) in first_y.iter().zip(second_y.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_process_run_writes_output_files() {
        let dir = std::env::temp_dir().join("sans_reduce_process_test");
        let data_dir = dir.join("data");
        let out_dir = dir.join("out");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::create_dir_all(&out_dir).unwrap();

        let request = ReductionRequest {
            instrument: String::from("SANS2D"),
            data_path: data_dir.clone(),
            output_path: out_dir.clone(),
            first_run_number: 7,
            last_run_number: 7,
            wavelength_min: 1.75,
            wavelength_max: 10.0,
            q_min: 1e-3,
            q_max: 1.0,
            q_step: 5e-3,
            ..Default::default()
        };
        algorithms::save_workspace(
            &synthetic_bank(100.0, 4),
            &request.get_run_file_name(7),
        )
        .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let mut store = WorkspaceStore::new();
        process_run(&request, 7, &mut store, &tx, &0).unwrap();
        drop(tx);

        let out_file: PathBuf = out_dir.join("SANS2D00000007_LAB.yaml");
        let curve = algorithms::load_workspace(&out_file).unwrap();
        let finite: Vec<f64> = curve
            .first()
            .unwrap()
            .y
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        assert!(!finite.is_empty());
        for value in finite {
            assert!((value - 100.0).abs() < 1e-9);
        }
        // The temp scatter workspace was cleaned out of the store
        assert!(store.is_empty());
        // The worker reported start and completion
        let statuses: Vec<WorkerStatus> = rx.iter().collect();
        assert!(statuses.first().unwrap().progress == 0.0);
        assert!(statuses.last().unwrap().progress == 1.0);
        assert_eq!(statuses.last().unwrap().stage, RunStage::Done);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_failed_can_load_leaves_store_clean() {
        let dir = std::env::temp_dir().join("sans_reduce_missing_can_test");
        let data_dir = dir.join("data");
        let out_dir = dir.join("out");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::create_dir_all(&out_dir).unwrap();

        let request = ReductionRequest {
            instrument: String::from("SANS2D"),
            data_path: data_dir.clone(),
            output_path: out_dir.clone(),
            first_run_number: 7,
            last_run_number: 7,
            can_run: Some(String::from("SANS2D00022048")),
            ..Default::default()
        };
        algorithms::save_workspace(&synthetic_bank(100.0, 4), &request.get_run_file_name(7))
            .unwrap();

        let (tx, _rx) = std::sync::mpsc::channel();
        let mut store = WorkspaceStore::new();
        // No can file exists, so the load fails before the scatter data is
        // ever inserted
        let result = process_run(&request, 7, &mut store, &tx, &0);
        assert!(result.is_err());
        assert!(store.is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_create_subsets_round_robin() {
        let request = ReductionRequest {
            first_run_number: 1,
            last_run_number: 5,
            n_threads: 2,
            ..Default::default()
        };
        let subsets = create_subsets(&request);
        assert_eq!(subsets, vec![vec![1, 3, 5], vec![2, 4]]);
    }
}
