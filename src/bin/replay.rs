//! replay - run recorded detections through tracking and resolution
//!
//! Prints one JSON line per resolved crossing. Nothing is sent to the backend.

use anyhow::Result;
use clap::Parser;
use std::io::Write;

use checkout_witness::{
    DetectionSource, FileConfig, FileSource, FrameLoop, GapDebouncer, ProductResolver,
    ResolverConfig, StepOutcome, TrackerConfig, ZoneCrossingTracker,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay recorded detections and print resolved crossings")]
struct Args {
    /// JSON-lines detection file, or stub://<name> for the synthetic sweep.
    path: String,

    /// Crossing threshold (normalized horizontal displacement).
    #[arg(long, default_value_t = 0.6)]
    threshold: f32,

    /// Consecutive empty frames before a partial crossing is dropped.
    #[arg(long, default_value_t = 10)]
    debounce_limit: u32,

    /// Labels below this confidence are ignored by the resolver.
    #[arg(long, default_value_t = 0.5)]
    min_confidence: f32,

    /// Seed for the synthetic source.
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let tracker_cfg = TrackerConfig {
        crossing_threshold: args.threshold,
        ..TrackerConfig::default()
    };
    tracker_cfg.validate()?;
    let resolver_cfg = ResolverConfig {
        min_confidence: args.min_confidence,
        ..ResolverConfig::default()
    };
    resolver_cfg.validate()?;

    let mut frame_loop = FrameLoop::new(
        ZoneCrossingTracker::new(tracker_cfg, GapDebouncer::new(args.debounce_limit)),
        ProductResolver::new(resolver_cfg),
    );
    let mut source = FileSource::new(FileConfig {
        path: args.path,
        seed: args.seed,
        ..FileConfig::default()
    })?;
    source.connect()?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while let Some(frame) = source.next_frame()? {
        if let StepOutcome::Resolved(resolved) = frame_loop.step(&frame) {
            serde_json::to_writer(&mut out, &resolved)?;
            writeln!(out)?;
        }
    }

    let stats = frame_loop.stats();
    eprintln!(
        "frames={} crossings={} abandoned={} unresolved={}",
        stats.frames, stats.crossings, stats.abandoned, stats.unresolved
    );
    Ok(())
}
