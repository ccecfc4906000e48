//! gradscope
//!
//! Trains the configured MLP on MNIST and, when asked, records a short
//! instrumented run of the fixed 784→128→64→10 network to JSON.
//!
//! Run with:
//!   RUST_LOG=info cargo run --release -- config.json [capture.json]
//!
//! The config is a JSON object with any of `hiddenLayers`, `epochs`,
//! `batchSize`, `learningRate`, `datasetPath`, and `seed`; missing keys take
//! their defaults.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;

use log::{error, info};

use gradscope::capture::engine::run_capture;
use gradscope::error::{Error, Result};
use gradscope::train::loop_fn::{run_training, TrainingOutcome};
use gradscope::train::train_config::{TrainOptions, TrainingConfiguration, TrainingPlan};

const CAPTURE_ITERATIONS: usize = 1;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: gradscope <config.json> [capture.json]");
        return ExitCode::from(2);
    };
    let capture_path = args.next().map(PathBuf::from);

    match run(config_path, capture_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::InvalidConfiguration(errors)) => {
            eprintln!("Invalid configuration:");
            for e in errors {
                eprintln!("  - {}", e);
            }
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: PathBuf, capture_path: Option<PathBuf>) -> Result<()> {
    let plan = TrainingConfiguration::load_json(&config_path)?.into_plan()?;
    info!("training {} for {} epoch(s)", plan.architecture(), plan.epochs());

    let TrainingOutcome { model, result } = train_with_progress(plan.clone())?;
    info!(
        "trained {} over {} epoch(s), final test loss {:.4}",
        model.architecture(),
        result.epochs_run,
        result.final_test_loss
    );

    if let Some(path) = capture_path {
        let data = run_capture(&plan, CAPTURE_ITERATIONS)?;
        data.save_json(&path)?;
        println!("Wrote {} captured iteration(s) to {}", data.iterations.len(), path.display());
    }
    Ok(())
}

// Training runs on its own thread; this one prints progress until the sender
// is dropped.
fn train_with_progress(plan: TrainingPlan) -> Result<TrainingOutcome> {
    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        let options = TrainOptions::new().with_progress(tx);
        run_training(&plan, &options)
    });

    for event in rx {
        println!("{}", event);
    }

    match worker.join() {
        Ok(outcome) => outcome,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
