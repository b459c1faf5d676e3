use std::path::PathBuf;
use thiserror::Error;

use super::state::validate::ValidationReport;
use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load reduction request as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Reduction request failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Reduction request failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Reduction request output directory {0:?} does not exist")]
    BadOutputPath(PathBuf),
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("No state builder is implemented for instrument {0}")]
    UnsupportedInstrument(String),
    #[error("State validation failed: {0}")]
    InvalidState(ValidationReport),
    #[error("State could not be serialized for hashing: {0}")]
    HashingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Workspace {0} does not exist in the workspace store")]
    MissingWorkspace(String),
    #[error(
        "Spectrum arrays are mismatched -- x: {x_len}, y: {y_len}, e: {e_len}; expected x = y + 1 = e + 1"
    )]
    MismatchedArrays {
        x_len: usize,
        y_len: usize,
        e_len: usize,
    },
    #[error("Workspaces have incompatible binning -- left: {0} bins, right: {1} bins")]
    IncompatibleBinning(usize, usize),
    #[error("Workspace has no spectra")]
    EmptyWorkspace,
}

#[derive(Debug, Error)]
pub enum AlgorithmError {
    #[error("Could not load workspace because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Algorithm failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Algorithm failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Algorithm failed due to workspace error: {0}")]
    WorkspaceError(#[from] WorkspaceError),
    #[error("Invalid range given to crop -- min: {0}, max: {1}")]
    BadRange(f64, f64),
    #[error("No unit conversion is available from {0} to {1}")]
    BadUnitConversion(String, String),
    #[error("Moderator file has an incorrect format; most likely the number of columns is wrong")]
    BadModeratorFormat,
    #[error("Moderator file failed to parse a float: {0}")]
    ModeratorParsingError(#[from] std::num::ParseFloatError),
}

#[derive(Debug, Error)]
pub enum ReductionError {
    #[error("Reduction failed due to state error: {0}")]
    StateError(#[from] StateError),
    #[error("Reduction failed due to algorithm error: {0}")]
    AlgorithmError(#[from] AlgorithmError),
    #[error("Reduction failed due to workspace error: {0}")]
    WorkspaceError(#[from] WorkspaceError),
    #[error("Reduction requires a monitor spectrum but the scatter data has none at index {0}")]
    MissingMonitor(usize),
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("No bank merger is implemented for instrument {0}")]
    NotImplemented(String),
    #[error("Merge is missing the required sample partial workspace: {0}")]
    MissingPartial(String),
    #[error("Merge found no overlapping bins between the detector banks")]
    EmptyOverlap,
    #[error("Merge failed due to workspace error: {0}")]
    WorkspaceError(#[from] WorkspaceError),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to state error: {0}")]
    StateError(#[from] StateError),
    #[error("Processor failed due to reduction error: {0}")]
    ReductionError(#[from] ReductionError),
    #[error("Processor failed due to merge error: {0}")]
    MergeError(#[from] MergeError),
    #[error("Processor failed due to algorithm error: {0}")]
    AlgorithmError(#[from] AlgorithmError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
