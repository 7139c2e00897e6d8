// Synchronization primitives
//
// Fences and semaphores per frame in flight, plus the bookkeeping that maps
// swapchain images to the fence of the frame last rendering into them.

use ash::vk;
use anyhow::{Context, Result};
use super::VulkanDevice;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signaled so the first wait on each slot returns immediately
        let fence_info = vk::FenceCreateInfo::builder()
            .flags(vk::FenceCreateFlags::SIGNALED);

        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
        };

        let created = unsafe {
            (|| -> Result<()> {
                sync.image_available = device.device.create_semaphore(&semaphore_info, None)
                    .context("Failed to create image-available semaphore")?;
                sync.render_finished = device.device.create_semaphore(&semaphore_info, None)
                    .context("Failed to create render-finished semaphore")?;
                sync.in_flight_fence = device.device.create_fence(&fence_info, None)
                    .context("Failed to create in-flight fence")?;
                Ok(())
            })()
        };

        match created {
            Ok(()) => Ok(sync),
            Err(e) => {
                sync.destroy(&device.device);
                Err(e)
            }
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Cycles the frame slot and remembers which fence last targeted each image
#[derive(Debug)]
pub struct FrameTracker {
    frames_in_flight: usize,
    current: usize,
    images_in_flight: Vec<Option<vk::Fence>>,
}

impl FrameTracker {
    pub fn new(frames_in_flight: usize, image_count: usize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            current: 0,
            images_in_flight: vec![None; image_count],
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames_in_flight;
    }

    /// Record `fence` as the owner of `image_index`.
    ///
    /// Returns the previous owner when it is a different fence; the caller
    /// must wait on it before reusing the image's resources.
    pub fn claim_image(&mut self, image_index: usize, fence: vk::Fence) -> Option<vk::Fence> {
        let slot = self.images_in_flight.get_mut(image_index)?;
        let previous = slot.replace(fence);
        previous.filter(|&prev| prev != fence)
    }

    /// Forget all image owners; only valid once the device is idle
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
    }

    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    #[test]
    fn slot_cycles_with_period_n() {
        for n in 1..=4 {
            let mut tracker = FrameTracker::new(n, 3);
            let mut seen = Vec::new();
            for _ in 0..n * 3 {
                seen.push(tracker.current());
                tracker.advance();
            }
            let expected: Vec<usize> = (0..n * 3).map(|i| i % n).collect();
            assert_eq!(seen, expected);
            assert_eq!(tracker.current(), 0);
        }
    }

    #[test]
    fn zero_frames_in_flight_is_clamped() {
        let mut tracker = FrameTracker::new(0, 2);
        assert_eq!(tracker.frames_in_flight(), 1);
        tracker.advance();
        assert_eq!(tracker.current(), 0);
    }

    #[test]
    fn first_claim_has_nothing_to_wait_on() {
        let mut tracker = FrameTracker::new(2, 3);
        assert_eq!(tracker.claim_image(1, fence(10)), None);
    }

    #[test]
    fn claim_by_other_slot_returns_previous_fence() {
        let mut tracker = FrameTracker::new(2, 3);
        tracker.claim_image(0, fence(10));
        assert_eq!(tracker.claim_image(0, fence(20)), Some(fence(10)));
        assert_eq!(tracker.claim_image(0, fence(10)), Some(fence(20)));
    }

    #[test]
    fn reclaim_by_same_slot_does_not_wait_twice() {
        let mut tracker = FrameTracker::new(2, 3);
        tracker.claim_image(2, fence(10));
        assert_eq!(tracker.claim_image(2, fence(10)), None);
    }

    #[test]
    fn more_images_than_frames_keeps_independent_owners() {
        let mut tracker = FrameTracker::new(2, 3);
        let fences = [fence(1), fence(2)];

        // Image order 0,1,2,0 with slots 0,1,0,1
        assert_eq!(tracker.claim_image(0, fences[0]), None);
        assert_eq!(tracker.claim_image(1, fences[1]), None);
        assert_eq!(tracker.claim_image(2, fences[0]), None);
        assert_eq!(tracker.claim_image(0, fences[1]), Some(fences[0]));
    }

    #[test]
    fn reset_resizes_and_clears_owners() {
        let mut tracker = FrameTracker::new(2, 2);
        tracker.claim_image(0, fence(1));
        tracker.reset_images(4);

        assert_eq!(tracker.image_count(), 4);
        assert_eq!(tracker.claim_image(0, fence(2)), None);
        assert_eq!(tracker.claim_image(3, fence(2)), None);
    }

    #[test]
    fn out_of_range_image_is_ignored() {
        let mut tracker = FrameTracker::new(2, 1);
        assert_eq!(tracker.claim_image(5, fence(1)), None);
    }
}
