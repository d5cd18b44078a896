//! Zone crossing state machine.
//!
//! A single `TrackingSession` follows at most one item at a time. The session
//! is owned by the frame loop and handed to the tracker by reference each frame.
//!
//! - `Idle`: no enter anchor. A detection inside the entry zone sets it; one
//!   outside the zone overwrites the exit anchor instead.
//! - `Tracking`: enter anchor set; every later detection overwrites the exit anchor.
//!
//! The exit anchor survives until the session is reset, so an edge detection
//! followed by an in-zone entry can confirm a crossing straight away.
//!
//! A crossing is confirmed when `|exit.x - enter.x| >= threshold` after a
//! frame has been processed; the session then returns to `Idle`. The gap
//! debouncer also returns it to `Idle`, silently.

use anyhow::{anyhow, Result};

use crate::debounce::GapDebouncer;
use crate::detect::FrameDetections;
use crate::{CrossingEvent, LabelSample, Point};

pub const DEFAULT_CROSSING_THRESHOLD: f32 = 0.6;
pub const DEFAULT_ENTRY_ZONE_MIN: f32 = 0.1;
pub const DEFAULT_ENTRY_ZONE_MAX: f32 = 0.9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerConfig {
    /// Minimum normalized horizontal displacement between anchors.
    pub crossing_threshold: f32,
    /// Inclusive bounds on centre x for a detection to become the enter anchor.
    pub entry_zone_min: f32,
    pub entry_zone_max: f32,
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.crossing_threshold > 0.0 && self.crossing_threshold <= 1.0) {
            return Err(anyhow!(
                "crossing threshold must be in (0, 1], got {}",
                self.crossing_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.entry_zone_min)
            || !(0.0..=1.0).contains(&self.entry_zone_max)
            || self.entry_zone_min >= self.entry_zone_max
        {
            return Err(anyhow!(
                "entry zone must satisfy 0 <= min < max <= 1, got [{}, {}]",
                self.entry_zone_min,
                self.entry_zone_max
            ));
        }
        Ok(())
    }

    fn in_entry_zone(&self, x: f32) -> bool {
        self.entry_zone_min <= x && x <= self.entry_zone_max
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            crossing_threshold: DEFAULT_CROSSING_THRESHOLD,
            entry_zone_min: DEFAULT_ENTRY_ZONE_MIN,
            entry_zone_max: DEFAULT_ENTRY_ZONE_MAX,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Tracking,
}

/// The one live crossing session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackingSession {
    pub enter: Option<Point>,
    pub exit: Option<Point>,
    pub empty_frame_count: u32,
    /// Labels seen since the enter anchor was set, in observation order.
    pub labels: Vec<LabelSample>,
}

impl TrackingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TrackerState {
        if self.enter.is_some() {
            TrackerState::Tracking
        } else {
            TrackerState::Idle
        }
    }

    pub fn reset(&mut self) {
        self.enter = None;
        self.exit = None;
        self.empty_frame_count = 0;
        self.labels.clear();
    }
}

/// What a single frame did to the session.
#[derive(Clone, Debug, PartialEq)]
pub enum Observation {
    Idle,
    Tracking,
    Crossed(CrossingEvent),
    Abandoned,
}

pub struct ZoneCrossingTracker {
    config: TrackerConfig,
    debouncer: GapDebouncer,
    frame_index: u64,
}

impl ZoneCrossingTracker {
    pub fn new(config: TrackerConfig, debouncer: GapDebouncer) -> Self {
        Self {
            config,
            debouncer,
            frame_index: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Number of frames observed so far.
    pub fn frames_observed(&self) -> u64 {
        self.frame_index
    }

    /// Feed one frame; returns the crossing it confirmed, if any.
    pub fn observe(
        &mut self,
        session: &mut TrackingSession,
        frame: &FrameDetections,
    ) -> Option<CrossingEvent> {
        match self.observe_frame(session, frame) {
            Observation::Crossed(event) => Some(event),
            _ => None,
        }
    }

    /// Feed one frame and report the resulting transition.
    pub fn observe_frame(
        &mut self,
        session: &mut TrackingSession,
        frame: &FrameDetections,
    ) -> Observation {
        let frame_index = self.frame_index;
        self.frame_index += 1;

        if frame.is_empty() {
            if self.debouncer.on_empty_frame(session) {
                return Observation::Abandoned;
            }
            return match session.state() {
                TrackerState::Idle => Observation::Idle,
                TrackerState::Tracking => Observation::Tracking,
            };
        }

        // Detector order is preserved: the exit anchor ends up at whichever
        // detection was processed last.
        for det in frame.iter() {
            let center = det.center();
            if session.enter.is_none() && self.config.in_entry_zone(center.x) {
                log::debug!("frame {}: enter anchor {:?}", frame_index, center);
                session.enter = Some(center);
                session.empty_frame_count = 0;
            } else {
                if session.enter.is_none() {
                    // Idle buffer holds only the label behind the current exit anchor.
                    session.labels.clear();
                }
                session.exit = Some(center);
            }
            session.labels.push(LabelSample::from(det));
        }

        let (Some(enter), Some(exit)) = (session.enter, session.exit) else {
            return match session.state() {
                TrackerState::Idle => Observation::Idle,
                TrackerState::Tracking => Observation::Tracking,
            };
        };

        if (exit.x - enter.x).abs() < self.config.crossing_threshold {
            return Observation::Tracking;
        }

        let event = CrossingEvent {
            displacement: exit.offset_from(enter),
            enter,
            exit,
            label_buffer: std::mem::take(&mut session.labels),
            frame_index,
        };
        session.reset();
        log::debug!(
            "frame {}: crossing confirmed dx={:.3} dy={:.3} labels={}",
            frame_index,
            event.displacement.x,
            event.displacement.y,
            event.label_buffer.len()
        );
        Observation::Crossed(event)
    }
}

impl Default for ZoneCrossingTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default(), GapDebouncer::default())
    }
}
