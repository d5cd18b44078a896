//! Frame processing loop.
//!
//! Single-threaded and synchronous: blocks on the source for each frame, runs
//! the tracker, and on a confirmed crossing resolves the product and hands it
//! to the dispatcher. Only a source error stops the loop; unresolved
//! crossings and dispatch rejections are logged, counted and skipped.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::detect::{DetectionSource, FrameDetections};
use crate::dispatch::{DispatchError, DispatchSnapshot, Dispatcher};
use crate::resolve::ProductResolver;
use crate::tracker::{Observation, TrackingSession, ZoneCrossingTracker};
use crate::{CrossingEvent, ResolvedCrossing};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub empty_frames: u64,
    pub crossings: u64,
    /// Sessions dropped by the gap debouncer.
    pub abandoned: u64,
    /// Crossings where no label survived resolution.
    pub unresolved: u64,
    pub submitted: u64,
    pub rejected: u64,
}

/// Result of processing one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    Idle,
    Tracking,
    Abandoned,
    Unresolved(CrossingEvent),
    /// Resolved; queued for dispatch when a dispatcher is attached.
    Resolved(ResolvedCrossing),
    Rejected(ResolvedCrossing, DispatchError),
}

pub struct FrameLoop {
    tracker: ZoneCrossingTracker,
    resolver: ProductResolver,
    dispatcher: Option<Dispatcher>,
    session: TrackingSession,
    stats: LoopStats,
}

impl FrameLoop {
    pub fn new(tracker: ZoneCrossingTracker, resolver: ProductResolver) -> Self {
        Self {
            tracker,
            resolver,
            dispatcher: None,
            session: TrackingSession::new(),
            stats: LoopStats::default(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Process a single frame.
    pub fn step(&mut self, frame: &FrameDetections) -> StepOutcome {
        self.stats.frames += 1;
        if frame.is_empty() {
            self.stats.empty_frames += 1;
        }

        let event = match self.tracker.observe_frame(&mut self.session, frame) {
            Observation::Idle => return StepOutcome::Idle,
            Observation::Tracking => return StepOutcome::Tracking,
            Observation::Abandoned => {
                self.stats.abandoned += 1;
                return StepOutcome::Abandoned;
            }
            Observation::Crossed(event) => event,
        };
        self.stats.crossings += 1;

        let Some(item_name) = self.resolver.resolve(&event.label_buffer) else {
            self.stats.unresolved += 1;
            log::warn!(
                "crossing at frame {} dropped: no label above {:.2} in {} samples",
                event.frame_index,
                self.resolver.config().min_confidence,
                event.label_buffer.len()
            );
            return StepOutcome::Unresolved(event);
        };
        log::info!(
            "crossing at frame {}: '{}' (dx={:.3}, {} samples)",
            event.frame_index,
            item_name,
            event.displacement.x,
            event.label_buffer.len()
        );
        let resolved = ResolvedCrossing { item_name, event };

        let Some(dispatcher) = &self.dispatcher else {
            return StepOutcome::Resolved(resolved);
        };
        match dispatcher.dispatch(&resolved.item_name) {
            Ok(()) => {
                self.stats.submitted += 1;
                StepOutcome::Resolved(resolved)
            }
            Err(e) => {
                self.stats.rejected += 1;
                log::warn!("notification for '{}' not queued: {}", resolved.item_name, e);
                StepOutcome::Rejected(resolved, e)
            }
        }
    }

    /// Pull frames until end of stream or until `stop` is set.
    ///
    /// A source error ends the loop and is returned to the caller.
    pub fn run<S: DetectionSource + ?Sized>(
        &mut self,
        source: &mut S,
        stop: &AtomicBool,
    ) -> Result<LoopStats> {
        source
            .connect()
            .with_context(|| format!("connect detection source '{}'", source.name()))?;
        log::info!("frame loop running on source '{}'", source.name());

        while !stop.load(Ordering::SeqCst) {
            let frame = source
                .next_frame()
                .with_context(|| format!("detection source '{}' failed", source.name()))?;
            let Some(frame) = frame else {
                log::info!("detection source '{}' reached end of stream", source.name());
                break;
            };
            self.step(&frame);
        }
        Ok(self.stats)
    }

    /// Shut down the dispatcher (draining queued notifications) and return final counts.
    pub fn finish(self) -> Result<(LoopStats, Option<DispatchSnapshot>)> {
        let dispatch = match self.dispatcher {
            Some(dispatcher) => Some(dispatcher.shutdown()?),
            None => None,
        };
        Ok((self.stats, dispatch))
    }
}
