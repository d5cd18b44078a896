//! checkoutd - checkout lane witness daemon
//!
//! This daemon:
//! 1. Loads cashier credentials and tuning from CHECKOUT_CONFIG / CHECKOUT_* env
//! 2. Pulls per-frame detections from the configured source
//! 3. Tracks one item at a time through the checkout zone
//! 4. Resolves each crossing to a product name
//! 5. Queues a stock decrease on the bounded dispatch pool

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use checkout_witness::{
    CheckoutConfig, Dispatcher, FileConfig, FileSource, FrameLoop, GapDebouncer, HttpTransport,
    LogTransport, ProductResolver, StockTransport, ZoneCrossingTracker,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Checkout lane witness daemon")]
struct Args {
    /// Config file (.toml or .json). Overrides CHECKOUT_CONFIG.
    #[arg(long, env = "CHECKOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Detection source: JSON-lines file or stub://<name>.
    #[arg(long)]
    source: Option<String>,

    /// Log notifications instead of sending them.
    #[arg(long)]
    dry_run: bool,

    /// Frames for the synthetic stub:// source (0 = endless).
    #[arg(long, default_value_t = 600)]
    synthetic_frames: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = CheckoutConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.source = source;
    }
    cfg.dry_run |= args.dry_run;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::SeqCst);
    })
    .context("install ctrl-c handler")?;

    let transport: Arc<dyn StockTransport> = if cfg.dry_run {
        log::warn!("dry run: notifications are logged, not sent");
        Arc::new(LogTransport)
    } else {
        Arc::new(HttpTransport::new(&cfg.backend_endpoint)?)
    };
    let dispatcher = Dispatcher::new(cfg.dispatch.clone(), cfg.credentials.clone(), transport)?;

    let tracker = ZoneCrossingTracker::new(cfg.tracker, GapDebouncer::new(cfg.debounce_limit));
    let resolver = ProductResolver::new(cfg.resolver);
    let mut frame_loop = FrameLoop::new(tracker, resolver).with_dispatcher(dispatcher);

    let mut source = FileSource::new(FileConfig {
        path: cfg.source.clone(),
        synthetic_frames: args.synthetic_frames,
        ..FileConfig::default()
    })?;

    log::info!(
        "checkoutd running: cashier={} endpoint={} source={}",
        cfg.credentials.cashier_id(),
        cfg.backend_endpoint,
        cfg.source
    );
    log::info!(
        "threshold={} entry_zone=[{}, {}] debounce={} min_confidence={}",
        cfg.tracker.crossing_threshold,
        cfg.tracker.entry_zone_min,
        cfg.tracker.entry_zone_max,
        cfg.debounce_limit,
        cfg.resolver.min_confidence
    );

    let run_result = frame_loop.run(&mut source, &stop);
    let (stats, dispatch) = frame_loop.finish()?;
    log::info!(
        "frames={} empty={} crossings={} abandoned={} unresolved={} submitted={} rejected={}",
        stats.frames,
        stats.empty_frames,
        stats.crossings,
        stats.abandoned,
        stats.unresolved,
        stats.submitted,
        stats.rejected
    );
    if let Some(dispatch) = dispatch {
        log::info!(
            "dispatch: succeeded={} failed={} rejected={}",
            dispatch.succeeded,
            dispatch.failed,
            dispatch.rejected
        );
    }
    log::info!("source stats: {:?}", source.stats());
    run_result.map(|_| ())
}
