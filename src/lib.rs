//! Checkout Witness
//!
//! Turns a noisy stream of per-frame object detections from a checkout camera
//! into discrete "item moved through the checkout zone" events, resolves each
//! one to a single product name and reports it once to the stock backend.
//!
//! # Architecture
//!
//! One frame at a time flows through:
//!
//! 1. **Zone crossing tracker**: maintains enter/exit anchors for the single
//!    live session and confirms a crossing once the horizontal displacement
//!    reaches the threshold.
//! 2. **Gap debouncer**: abandons a stale session after consecutive empty frames.
//! 3. **Product resolver**: votes over the labels buffered during the session.
//! 4. **Dispatcher**: bounded worker pool that POSTs the stock decrease without
//!    blocking the frame loop.
//!
//! # Module Structure
//!
//! - `detect`: Detection, FrameDetections, DetectionSource
//! - `ingest`: Frame detection sources (JSON-lines replay, synthetic, scripted)
//! - `tracker` / `debounce`: session state machine
//! - `resolve`: product identity voting
//! - `dispatch`: notification payloads, transports and worker pool
//! - `pipeline`: the frame processing loop
//! - Core types: Point, LabelSample, CrossingEvent, ResolvedCrossing

use serde::{Deserialize, Serialize};

pub mod config;
pub mod debounce;
pub mod detect;
pub mod dispatch;
pub mod ingest;
pub mod pipeline;
pub mod resolve;
pub mod tracker;

pub use config::{CashierCredentials, CheckoutConfig};
pub use debounce::GapDebouncer;
pub use detect::{BoundingBox, Detection, DetectionSource, FrameDetections};
pub use dispatch::{
    normalize_item_name, Backpressure, DispatchError, DispatchSnapshot, DispatchStats, Dispatcher,
    DispatcherConfig, HttpTransport, LogTransport, NotificationRequest, StockTransport,
};
pub use ingest::{FileConfig, FileSource, ScriptedSource};
pub use pipeline::{FrameLoop, LoopStats, StepOutcome};
pub use resolve::{ProductResolver, ProductVote, ResolverConfig};
pub use tracker::{Observation, TrackerConfig, TrackerState, TrackingSession, ZoneCrossingTracker};

/// Default backend endpoint for stock decrease notifications.
pub const DEFAULT_BACKEND_ENDPOINT: &str =
    "https://recognition-items-backend.up.railway.app/item/decrease";

// -------------------- Geometry --------------------

/// Normalized image coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// `self - origin`.
    pub fn offset_from(self, origin: Point) -> Point {
        Point::new(self.x - origin.x, self.y - origin.y)
    }
}

// -------------------- Events --------------------

/// A label observed during a session, as fed to the resolver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelSample {
    pub name: String,
    pub confidence: f32,
}

impl LabelSample {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

impl From<&Detection> for LabelSample {
    fn from(det: &Detection) -> Self {
        Self::new(det.class_label.clone(), det.confidence)
    }
}

/// Raised the instant a crossing is confirmed. Consumed by resolution and dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    /// `exit - enter`.
    pub displacement: Point,
    pub enter: Point,
    pub exit: Point,
    /// Labels buffered from the entering frame through the crossing frame.
    pub label_buffer: Vec<LabelSample>,
    /// Index of the frame that confirmed the crossing.
    pub frame_index: u64,
}

/// A crossing with the product name the resolver picked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCrossing {
    pub item_name: String,
    pub event: CrossingEvent,
}
