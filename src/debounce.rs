use crate::tracker::TrackingSession;

/// Consecutive empty frames after which an in-progress session is abandoned.
pub const DEFAULT_DEBOUNCE_LIMIT: u32 = 10;

/// Drops a partial crossing once the item has been gone for too long.
#[derive(Clone, Copy, Debug)]
pub struct GapDebouncer {
    limit: u32,
}

impl GapDebouncer {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Record a frame with zero detections.
    ///
    /// Returns true when the session was abandoned. No crossing is emitted for
    /// an abandoned session. The counter keeps growing while idle; only a new
    /// enter anchor resets it, exit-side updates do not.
    pub fn on_empty_frame(&self, session: &mut TrackingSession) -> bool {
        session.empty_frame_count = session.empty_frame_count.saturating_add(1);
        if session.empty_frame_count >= self.limit && session.enter.is_some() {
            log::debug!(
                "session abandoned after {} empty frames (enter={:?}, exit={:?}, labels={})",
                session.empty_frame_count,
                session.enter,
                session.exit,
                session.labels.len()
            );
            session.reset();
            return true;
        }
        false
    }
}

impl Default for GapDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;

    #[test]
    fn empty_frame_increments_by_one() {
        let debouncer = GapDebouncer::default();
        let mut session = TrackingSession::new();
        for expected in 1..=25 {
            assert!(!debouncer.on_empty_frame(&mut session));
            assert_eq!(session.empty_frame_count, expected);
        }
    }

    #[test]
    fn abandons_tracking_session_at_limit() {
        let debouncer = GapDebouncer::default();
        let mut session = TrackingSession::new();
        session.enter = Some(Point::new(0.3, 0.5));
        session.exit = Some(Point::new(0.5, 0.5));

        for _ in 0..9 {
            assert!(!debouncer.on_empty_frame(&mut session));
        }
        assert_eq!(session.empty_frame_count, 9);
        assert!(debouncer.on_empty_frame(&mut session));
        assert_eq!(session, TrackingSession::new());
    }

    #[test]
    fn idle_session_is_never_reset() {
        let debouncer = GapDebouncer::new(2);
        let mut session = TrackingSession::new();
        assert!(!debouncer.on_empty_frame(&mut session));
        assert!(!debouncer.on_empty_frame(&mut session));
        assert!(!debouncer.on_empty_frame(&mut session));
        assert_eq!(session.empty_frame_count, 3);
    }

    #[test]
    fn zero_limit_is_raised_to_one() {
        assert_eq!(GapDebouncer::new(0).limit(), 1);
    }
}
