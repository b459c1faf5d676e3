use clap::{Arg, Command};
use fxhash::FxHashMap;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;

use libsans_reduce::config::ReductionRequest;
use libsans_reduce::process::{create_subsets, process_subset};
use libsans_reduce::worker_status::{RunStage, WorkerStatus};

fn make_template_config(path: &Path) {
    let request = ReductionRequest::default();
    let yaml_str = serde_yaml::to_string(&request).unwrap();
    let mut file = File::create(path).expect("Could create template config file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

fn bar_style(stage: &RunStage) -> ProgressStyle {
    let template = match stage {
        RunStage::Loading => "{msg}: {bar:40.green} {percent}%",
        RunStage::Reducing => "{msg}: {bar:40.cyan} {percent}%",
        RunStage::Writing => "{msg}: {bar:40.magenta} {percent}%",
        RunStage::Done => "{msg}: {bar:40.blue} {percent}%",
    };
    ProgressStyle::with_template(template).expect("Could not create progress bar style!")
}

fn main() {
    // Create a cli
    let matches = Command::new("sans_reduce_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );

        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // Load our reduction request
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let request = match ReductionRequest::read_config_file(&config_path) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Instrument: {}", request.instrument);
    log::info!("Data Path: {}", request.data_path.to_string_lossy());
    log::info!("Output Path: {}", request.output_path.to_string_lossy());
    log::info!(
        "First Run: {} Last Run: {}",
        request.first_run_number,
        request.last_run_number
    );
    log::info!("Reduction Mode: {}", request.reduction_mode);
    match &request.can_run {
        Some(can) => log::info!("Can Run: {can}"),
        None => log::info!("Can Run: not set"),
    }

    if !request.is_n_threads_valid() {
        log::error!(
            "Number of workers must be at least 1, got {}",
            request.n_threads
        );
        return;
    }

    // Split the run range across the workers; workers without any runs to do
    // are never spawned
    let subsets: Vec<Vec<i32>> = create_subsets(&request)
        .into_iter()
        .filter(|subset| !subset.is_empty())
        .collect();

    let (tx, rx) = channel::<WorkerStatus>();
    let mut handles = Vec::new();
    let mut bars: FxHashMap<usize, ProgressBar> = FxHashMap::default();
    for (worker_id, subset) in subsets.into_iter().enumerate() {
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(bar_style(&RunStage::Loading));
        bar.set_message(format!("Worker {worker_id}"));
        bars.insert(worker_id, bar);

        let worker_request = request.clone();
        let worker_tx = tx.clone();
        handles.push(std::thread::spawn(move || {
            process_subset(worker_request, worker_tx, worker_id, subset)
        }));
    }
    drop(tx);

    // Drain status updates until every worker hangs up
    for status in rx {
        if let Some(bar) = bars.get(&status.worker_id) {
            bar.set_style(bar_style(&status.stage));
            bar.set_message(format!(
                "Worker {} | Run {} | {}",
                status.worker_id,
                status.run_number,
                status.stage.label()
            ));
            bar.set_position((status.progress * 100.0) as u64);
        }
    }

    for (worker_id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(result) => match result {
                Ok(_) => log::info!("Worker {worker_id} finished successfully."),
                Err(e) => log::error!("Worker {worker_id} failed with error: {e}"),
            },
            Err(_) => log::error!("Failed to join worker {worker_id}!"),
        }
    }

    for bar in bars.values() {
        bar.finish();
    }

    log::info!("Done.");
}
