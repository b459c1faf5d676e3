/// The phase a worker's current run is in. The UI keys its bar color and
/// label off the stage rather than raw progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunStage {
    #[default]
    Loading,
    Reducing,
    Writing,
    Done,
}

impl RunStage {
    pub fn label(&self) -> &'static str {
        match self {
            RunStage::Loading => "loading",
            RunStage::Reducing => "reducing",
            RunStage::Writing => "writing",
            RunStage::Done => "done",
        }
    }
}

/// Progress report sent from a reduction worker to the UI thread
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub run_number: i32,
    pub worker_id: usize,
    pub stage: RunStage,
}

impl WorkerStatus {
    pub fn new(progress: f32, run_number: i32, worker_id: usize, stage: RunStage) -> Self {
        Self {
            progress,
            run_number,
            worker_id,
            stage,
        }
    }
}
