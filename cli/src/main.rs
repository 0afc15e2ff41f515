//! `video-cascade` binary: loads a JSON master config, builds
//! the opaque backends the core pipeline needs (placeholders in [`stub`]
//! until a real decode/scale/inference stack is wired in), and runs one
//! pipeline to completion: parse args, init the logger, build
//! collaborators, hand off to a blocking `run`, map the exit code.

mod args;
mod logger;
mod stub;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use signal_hook::{consts::SIGINT, iterator::Signals};
use tracing::{error, info};

use video_cascade_core::config::PipelineConfig;
use video_cascade_core::pipeline::launcher::{self, PipelineDeps};
use video_cascade_core::types::StreamId;

use stub::{null_frame_alloc, CascadeSink, NullDecoder, NullDpu, NullOverlay, NullScaler};

/// Typical YOLOv3 detector input geometry; the real detector's `get_config`
/// would report this from the loaded model instead of a constant.
const DETECTOR_MODEL_WIDTH: u32 = 416;
const DETECTOR_MODEL_HEIGHT: u32 = 416;
/// Typical ResNet-18 classifier input geometry, same caveat.
const CLASSIFIER_MODEL_WIDTH: u32 = 224;
const CLASSIFIER_MODEL_HEIGHT: u32 = 224;

fn main() -> ExitCode {
    let args = args::Args::parse();

    let config = match PipelineConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config {}: {err}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    logger::init_logger(args.log_level.as_deref().unwrap_or(&config.log_level));

    let interrupt = Arc::new(AtomicBool::new(false));
    spawn_sigint_watcher(Arc::clone(&interrupt));

    let deps = match build_deps(&config) {
        Ok(deps) => deps,
        Err(err) => {
            error!(%err, "failed to build pipeline backends");
            return ExitCode::FAILURE;
        }
    };

    info!(streams = config.input_streams.len(), "starting pipeline");
    match launcher::run(&config, deps, interrupt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "pipeline finished with an error");
            ExitCode::FAILURE
        }
    }
}

/// One OS thread blocked on `Signals::new([SIGINT]).forever().next()`,
/// flipping a shared flag instead of unblocking an event loop, since every
/// stage thread here polls `interrupt` itself.
fn spawn_sigint_watcher(interrupt: Arc<AtomicBool>) {
    let mut signals = match Signals::new([SIGINT]) {
        Ok(signals) => signals,
        Err(err) => {
            error!(%err, "failed to install SIGINT handler, ctrl-c will not drain cleanly");
            return;
        }
    };
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("interrupt received, draining streams");
            interrupt.store(true, Ordering::SeqCst);
        }
    });
}

fn build_deps(config: &PipelineConfig) -> std::io::Result<PipelineDeps> {
    let detector = NullDpu::from_model_config_path(
        &config.yolov3_config_path,
        DETECTOR_MODEL_WIDTH,
        DETECTOR_MODEL_HEIGHT,
    )?;
    let color = NullDpu::from_model_config_path(
        &config.resnet18_carcolor_config_path,
        CLASSIFIER_MODEL_WIDTH,
        CLASSIFIER_MODEL_HEIGHT,
    )?;
    let make = NullDpu::from_model_config_path(
        &config.resnet18_carmake_config_path,
        CLASSIFIER_MODEL_WIDTH,
        CLASSIFIER_MODEL_HEIGHT,
    )?;
    let kind = NullDpu::from_model_config_path(
        &config.resnet18_cartype_config_path,
        CLASSIFIER_MODEL_WIDTH,
        CLASSIFIER_MODEL_HEIGHT,
    )?;

    let sink_type = config.sink_type;
    Ok(PipelineDeps {
        frame_alloc: null_frame_alloc(),
        make_decoder: Box::new(|_stream_id: StreamId| Box::new(NullDecoder::new()) as Box<_>),
        make_scaler: Box::new(|_stream_id: StreamId| Box::new(NullScaler::new()) as Box<_>),
        make_crop_scaler: Box::new(|_stream_id: StreamId| Box::new(NullScaler::new()) as Box<_>),
        detector: Box::new(detector),
        classifiers: [Box::new(color), Box::new(make), Box::new(kind)],
        make_overlay: Box::new(|_stream_id: StreamId| Box::new(NullOverlay) as Box<_>),
        make_sink: Box::new(move |stream_id: StreamId| {
            Box::new(
                CascadeSink::new(sink_type, stream_id.0)
                    .expect("null/screen/file sink construction is infallible for these targets"),
            ) as Box<_>
        }),
    })
}
