//! reverb-render - offline binaural reverb renderer
//!
//! Loads a BRIR through the background loader, then pushes a WAV file through
//! the real-time processor block by block and writes the stereo result.

mod args;
mod render;
mod wav;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use reverb_core::config::{default_config_path, load_config};
use reverb_core::{
    BrirLoadRequest, ConvolutionCore, FormatDecoders, LoadEvent, ReverbConfig, ReverbStage,
};

use args::{RenderArgs, USAGE};

/// Upper bound on how long a BRIR load may take
const LOAD_TIMEOUT: Duration = Duration::from_secs(120);

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let Some(args) = RenderArgs::parse(std::env::args().skip(1))? else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config: ReverbConfig = load_config(&config_path);

    let input = wav::read_wav(&args.input)?;
    log::info!(
        "Input {:?}: {} channels, {} frames @ {}Hz",
        args.input,
        input.channels.len(),
        input.frames(),
        input.sample_rate
    );

    let core = Arc::new(ConvolutionCore::with_block_size(
        input.sample_rate,
        config.max_block_size,
    ));
    let mut stage = ReverbStage::new(core, FormatDecoders::default(), &config);
    if let Some(level_db) = args.level_db {
        stage.params.set_level_db(level_db);
    }
    if let Some(distance_db) = args.distance_db {
        stage.params.set_distance_attenuation_db(distance_db);
    }

    if !stage.loader.submit_load(BrirLoadRequest::new(&args.brir)) {
        bail!("BRIR load of {:?} was not started", args.brir);
    }
    if !stage.loader.wait_for_idle(LOAD_TIMEOUT) {
        bail!("Timed out loading {:?}", args.brir);
    }
    for event in stage.events.drain() {
        if let LoadEvent::Failed { source, error } = event {
            return Err(error).with_context(|| format!("Failed to load BRIR {:?}", source));
        }
    }
    log::info!("BRIR ready: {:?}", stage.loader.current_identity());

    let started = Instant::now();
    let block_size = render::RENDER_BLOCK.min(stage.processor.max_block_size());
    let (left, right) = render::render(&mut stage.processor, &input, args.mode, block_size)?;
    log::info!(
        "Rendered {} frames in {:.2}s (last block RMS {:.4})",
        left.len(),
        started.elapsed().as_secs_f64(),
        stage.meter.power()
    );

    wav::write_stereo_wav(&args.output, input.sample_rate, &left, &right)?;
    log::info!("Wrote {:?}", args.output);
    Ok(())
}
