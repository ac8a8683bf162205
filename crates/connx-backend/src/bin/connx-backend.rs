use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use connx_backend::{Backend, BackendConfig, BackendError, PrepareOptions, logger};
use connx_ir::TensorValue;
use log::LevelFilter;

/// Compile an ONNX model for the connx runtime, run it and print its outputs.
#[derive(Parser, Debug)]
#[command(name = "connx-backend", version)]
struct Args {
    /// ONNX model file
    onnx: PathBuf,

    /// Input tensor files (serialized TensorProto), in graph input order
    pb: Vec<PathBuf>,

    /// Directory receiving the compiled artifact (default: a temporary directory)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Log the time spent loading, preparing and running
    #[arg(short, long)]
    profile: bool,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => BackendConfig::load(path).map_err(BackendError::from),
        None => Ok(BackendConfig::default()),
    };

    let level = match (&config, args.verbose) {
        (_, true) => LevelFilter::Debug,
        (Ok(config), false) => config.level_filter(),
        (Err(_), false) => LevelFilter::Info,
    };
    if let Err(err) = logger::init_log(level) {
        eprintln!("Failed to initialize logging: {err}");
    }

    match config.and_then(|config| run(&args, config)) {
        Ok(outputs) => {
            for output in outputs {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, config: BackendConfig) -> Result<Vec<TensorValue>, BackendError> {
    let backend = Backend::new(config);

    let start = Instant::now();
    let model = connx_ir::load_model(&args.onnx)?;
    let inputs = args
        .pb
        .iter()
        .map(connx_ir::load_tensor)
        .collect::<Result<Vec<_>, _>>()?;
    if args.profile {
        log::info!("Loaded model and {} inputs in {:?}", inputs.len(), start.elapsed());
    }

    if !backend.is_compatible(&model) {
        log::warn!("Model uses operators connx does not implement, running anyway");
    }

    let mut options = PrepareOptions::default();
    if let Some(out) = &args.out {
        options = options.with_out(out);
    }

    let start = Instant::now();
    let prepared = backend.prepare(&model, &options)?;
    if args.profile {
        log::info!("Prepared in {:?}", start.elapsed());
    }

    let start = Instant::now();
    let outputs = prepared.run(&inputs)?;
    if args.profile {
        log::info!("Ran in {:?}", start.elapsed());
    }

    prepared.target.dispose()?;
    Ok(outputs)
}
