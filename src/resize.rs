// Tracks window size changes between frames.
//
// Recreation is requested by resize events or by a stale swapchain, and is
// held back while the window has zero area (minimized).

use ash::vk;

#[derive(Debug, Clone)]
pub struct ResizeTracker {
    width: u32,
    height: u32,
    pending: bool,
}

impl ResizeTracker {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pending: false,
        }
    }

    pub fn on_resized(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pending = true;
    }

    /// The swapchain reported out-of-date or suboptimal
    pub fn mark_stale(&mut self) {
        self.pending = true;
    }

    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    /// Extent to recreate at, if a recreation is due and the window has area.
    /// While minimized the request stays pending.
    pub fn take_pending(&mut self) -> Option<vk::Extent2D> {
        if !self.pending || self.is_minimized() {
            return None;
        }
        self.pending = false;
        Some(self.extent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn nothing_pending_initially() {
        let mut tracker = ResizeTracker::new(800, 600);
        assert!(!tracker.is_minimized());
        assert_eq!(tracker.take_pending(), None);
    }

    #[test]
    fn resize_is_taken_once() {
        let mut tracker = ResizeTracker::new(800, 600);
        tracker.on_resized(1024, 768);
        assert_eq!(tracker.take_pending(), Some(extent(1024, 768)));
        assert_eq!(tracker.take_pending(), None);
    }

    #[test]
    fn minimize_defers_until_area_returns() {
        let mut tracker = ResizeTracker::new(800, 600);
        tracker.on_resized(0, 0);
        assert!(tracker.is_minimized());
        assert_eq!(tracker.take_pending(), None);
        assert_eq!(tracker.take_pending(), None);

        tracker.on_resized(640, 0);
        assert_eq!(tracker.take_pending(), None);

        tracker.on_resized(640, 480);
        assert!(!tracker.is_minimized());
        assert_eq!(tracker.take_pending(), Some(extent(640, 480)));
    }

    #[test]
    fn stale_swapchain_requests_recreation_at_current_size() {
        let mut tracker = ResizeTracker::new(800, 600);
        tracker.mark_stale();
        assert_eq!(tracker.take_pending(), Some(extent(800, 600)));
    }

    #[test]
    fn stale_while_minimized_waits_for_restore() {
        let mut tracker = ResizeTracker::new(800, 600);
        tracker.on_resized(0, 600);
        tracker.mark_stale();
        assert_eq!(tracker.take_pending(), None);

        tracker.on_resized(800, 600);
        assert_eq!(tracker.take_pending(), Some(extent(800, 600)));
    }

    #[test]
    fn latest_size_wins() {
        let mut tracker = ResizeTracker::new(800, 600);
        tracker.on_resized(100, 100);
        tracker.on_resized(200, 150);
        assert_eq!(tracker.take_pending(), Some(extent(200, 150)));
    }
}
