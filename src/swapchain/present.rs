//! `Present` and `present_callback` (spec §4.6). `Present` runs on the
//! caller thread and only ever touches `user.*` plus the request ring;
//! `present_callback` is the submission thread's exclusive view of
//! `present.*`, ported from `dxgi_vk_swap_chain_Present` and
//! `dxgi_vk_swap_chain_present_callback`.

use ash::vk;

use crate::format::DxgiFormat;
use crate::swapchain::timing::Hdr10Metadata;
use crate::swapchain::ColorSpaceType;

bitflags::bitflags! {
    #[derive(Default)]
    pub struct PresentFlags: u32 {
        /// `DXGI_PRESENT_TEST`: validate only, never submit.
        const TEST = 1 << 0;
        const DO_NOT_WAIT = 1 << 1;
        const RESTART = 1 << 2;
    }
}

/// One ring slot's worth of state captured at `Present` time and consumed
/// by `present_callback` (§4.6 step 3).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PresentRequest {
    pub color_space: ColorSpaceType,
    pub hdr_metadata: Option<Hdr10Metadata>,
    pub modifies_hdr_metadata: bool,
    pub format: DxgiFormat,
    pub user_index: u32,
    pub sync_interval: u32,
    pub frame_time_ns: u64,
    pub low_latency_frame_id: u64,
}

/// Outcome of a `Present` call, before `present_callback` ever runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    /// A `present_callback` was enqueued on the submission thread.
    Enqueued { user_index: u32 },
    /// Surface occluded; caller gets `DXGI_STATUS_OCCLUDED`.
    Occluded,
    /// `DXGI_PRESENT_TEST`; no callback enqueued.
    Tested,
}

/// A fixed-capacity ring of `PresentRequest`s, one per in-flight present
/// (spec: `request_ring[(user.present_count+1) mod N]`).
pub struct PresentRing<const N: usize> {
    slots: [PresentRequest; N],
}

impl<const N: usize> Default for PresentRing<N> {
    fn default() -> Self {
        PresentRing { slots: [PresentRequest::default(); N] }
    }
}

impl<const N: usize> PresentRing<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill(&mut self, present_count: u64, request: PresentRequest) {
        self.slots[((present_count + 1) as usize) % N] = request;
    }

    pub fn get(&self, present_count: u64) -> &PresentRequest {
        &self.slots[(present_count as usize) % N]
    }
}

/// Caller-thread state touched by `Present` (§4.6: "Writes to `user.*` and
/// `request_ring[]`").
pub struct PresentCaller<const N: usize> {
    pub index: u32,
    pub buffer_count: u32,
    pub present_count: u64,
    pub ring: PresentRing<N>,
    pub is_occluded: bool,
}

impl<const N: usize> PresentCaller<N> {
    pub fn new(buffer_count: u32) -> Self {
        PresentCaller {
            index: 0,
            buffer_count,
            present_count: 0,
            ring: PresentRing::new(),
            is_occluded: false,
        }
    }

    /// Steps 1-5 of `Present` (§4.6). Step 6 (blocking on the frame-latency
    /// event) is the caller's responsibility once this returns `Enqueued`,
    /// since it requires the platform waitable handle and the low-latency
    /// GPU-bound heuristic, neither of which belong to pure ring bookkeeping.
    pub fn present(&mut self, flags: PresentFlags, request: PresentRequest) -> PresentOutcome {
        if self.is_occluded {
            return PresentOutcome::Occluded;
        }
        if flags.contains(PresentFlags::TEST) {
            return PresentOutcome::Tested;
        }

        self.ring.fill(self.present_count, request);
        self.present_count += 1;
        let enqueued_index = self.index;
        self.index = (self.index + 1) % self.buffer_count;

        PresentOutcome::Enqueued { user_index: enqueued_index }
    }
}

/// Whether `present_callback` must force a swapchain recreation given how
/// the new request differs from the last one it processed (§4.6 step 1).
pub fn requests_force_recreation(
    previous: &PresentRequest,
    next: &PresentRequest,
    present_mode_is_fixed: bool,
) -> bool {
    if previous.color_space != next.color_space {
        return true;
    }
    if previous.format != next.format {
        return true;
    }
    if present_mode_is_fixed {
        let previous_is_vsync = previous.sync_interval > 0;
        let next_is_vsync = next.sync_interval > 0;
        if previous_is_vsync != next_is_vsync {
            return true;
        }
    }
    false
}

/// Number of times `present_callback` retries image acquisition after
/// `VK_ERROR_OUT_OF_DATE_KHR` before giving up (§4.6 step 5).
pub const MAX_ACQUIRE_RETRIES: u32 = 3;

/// `VKD3D_LOW_LATENCY_FRAME_ID_STRIDE`'s default multiplier: the wait
/// thread's reported present ID equals `frame_id * stride` (spec §8
/// scenario 6).
pub const DEFAULT_LOW_LATENCY_FRAME_ID_STRIDE: u64 = 1;

pub fn present_id_for_low_latency_frame(frame_id: u64, stride: u64) -> u64 {
    frame_id * stride
}

/// Outcome of a `present_callback` run (§4.6 step 3-6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentCallbackOutcome {
    /// Blit was recorded, submitted and presented from `image_index`.
    Presented { image_index: u32 },
    /// Acquire or present reported `VK_ERROR_SURFACE_LOST_KHR`; the
    /// swapchain is unusable until the surface is recreated from scratch.
    SurfaceLost,
    /// Acquisition kept returning `VK_ERROR_OUT_OF_DATE_KHR` through
    /// `MAX_ACQUIRE_RETRIES` recreations; this frame is dropped rather than
    /// blocking the submission thread indefinitely.
    Skipped,
}

/// The submission thread's exclusive view of `present.*` (§4.6 steps 3-6),
/// ported from `dxgi_vk_swap_chain_present_callback`. Every Vulkan call is
/// injected as a closure so the acquire-retry and error-mapping logic can be
/// exercised without a live device:
///
/// - `acquire_image` wraps `vkAcquireNextImageKHR`.
/// - `recreate_swapchain` wraps the out-of-date teardown/rebuild path; it
///   runs between retries, never after the final one.
/// - `record_and_submit_blit` records the present blit into the acquired
///   image and submits it, ported from the callback's blit step.
/// - `queue_present` wraps `vkQueuePresentKHR`.
/// - `signal_blit_complete_timeline` signals the submission-thread timeline
///   semaphore the wait thread polls, once present has actually been
///   queued.
pub fn present_callback(
    request: &PresentRequest,
    acquire_image: impl Fn() -> std::result::Result<u32, vk::Result>,
    mut recreate_swapchain: impl FnMut(),
    record_and_submit_blit: impl FnOnce(u32),
    queue_present: impl FnOnce(u32) -> vk::Result,
    signal_blit_complete_timeline: impl FnOnce(u64),
) -> PresentCallbackOutcome {
    let mut acquired = None;
    for attempt in 0..=MAX_ACQUIRE_RETRIES {
        match acquire_image() {
            Ok(image_index) => {
                acquired = Some(image_index);
                break;
            }
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => return PresentCallbackOutcome::SurfaceLost,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                if attempt == MAX_ACQUIRE_RETRIES {
                    break;
                }
                recreate_swapchain();
            }
            Err(_) => return PresentCallbackOutcome::SurfaceLost,
        }
    }

    let image_index = match acquired {
        Some(image_index) => image_index,
        None => return PresentCallbackOutcome::Skipped,
    };

    record_and_submit_blit(image_index);

    match queue_present(image_index) {
        vk::Result::SUCCESS | vk::Result::SUBOPTIMAL_KHR => {}
        vk::Result::ERROR_SURFACE_LOST_KHR => return PresentCallbackOutcome::SurfaceLost,
        _ => return PresentCallbackOutcome::Skipped,
    }

    signal_blit_complete_timeline(request.low_latency_frame_id);
    PresentCallbackOutcome::Presented { image_index }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_on_occluded_surface_does_not_enqueue() {
        let mut caller = PresentCaller::<4>::new(3);
        caller.is_occluded = true;
        let outcome = caller.present(PresentFlags::empty(), PresentRequest::default());
        assert_eq!(outcome, PresentOutcome::Occluded);
        assert_eq!(caller.present_count, 0);
    }

    #[test]
    fn present_test_flag_short_circuits_without_enqueueing() {
        let mut caller = PresentCaller::<4>::new(3);
        let outcome = caller.present(PresentFlags::TEST, PresentRequest::default());
        assert_eq!(outcome, PresentOutcome::Tested);
        assert_eq!(caller.present_count, 0);
    }

    #[test]
    fn present_advances_index_and_present_count_and_wraps_at_buffer_count() {
        let mut caller = PresentCaller::<4>::new(3);
        for expected in 0..3u32 {
            let outcome = caller.present(PresentFlags::empty(), PresentRequest::default());
            assert_eq!(outcome, PresentOutcome::Enqueued { user_index: expected });
        }
        assert_eq!(caller.index, 0);
        assert_eq!(caller.present_count, 3);
    }

    #[test]
    fn ring_fill_uses_present_count_plus_one_modulo_capacity() {
        let mut ring: PresentRing<4> = PresentRing::new();
        let request = PresentRequest { user_index: 7, ..Default::default() };
        ring.fill(3, request);
        assert_eq!(ring.get(4).user_index, 7);
    }

    #[test]
    fn color_space_change_forces_recreation() {
        let previous = PresentRequest { color_space: ColorSpaceType::SrgbNonlinear, ..Default::default() };
        let next = PresentRequest { color_space: ColorSpaceType::Hdr10St2084, ..Default::default() };
        assert!(requests_force_recreation(&previous, &next, false));
    }

    #[test]
    fn sync_interval_polarity_flip_only_forces_recreation_with_fixed_present_mode() {
        let previous = PresentRequest { sync_interval: 1, ..Default::default() };
        let next = PresentRequest { sync_interval: 0, ..Default::default() };
        assert!(requests_force_recreation(&previous, &next, true));
        assert!(!requests_force_recreation(&previous, &next, false));
    }

    #[test]
    fn low_latency_frame_id_scales_by_configured_stride() {
        assert_eq!(present_id_for_low_latency_frame(5, 3), 15);
    }

    #[test]
    fn acquire_retry_then_success_presents_from_the_recovered_image() {
        let request = PresentRequest { low_latency_frame_id: 9, ..Default::default() };
        let attempt = std::cell::Cell::new(0u32);
        let recreate_calls = std::cell::Cell::new(0u32);
        let signalled = std::cell::Cell::new(None);

        let outcome = present_callback(
            &request,
            || {
                let n = attempt.get();
                attempt.set(n + 1);
                if n < 2 {
                    Err(vk::Result::ERROR_OUT_OF_DATE_KHR)
                } else {
                    Ok(2)
                }
            },
            || recreate_calls.set(recreate_calls.get() + 1),
            |_image_index| {},
            |_image_index| vk::Result::SUCCESS,
            |value| signalled.set(Some(value)),
        );

        assert_eq!(outcome, PresentCallbackOutcome::Presented { image_index: 2 });
        assert_eq!(recreate_calls.get(), 2);
        assert_eq!(signalled.get(), Some(9));
    }

    #[test]
    fn acquire_retries_exhausted_skips_the_frame() {
        let request = PresentRequest::default();
        let outcome = present_callback(
            &request,
            || Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
            || {},
            |_| panic!("blit must not run when acquisition never recovers"),
            |_| panic!("present must not run when acquisition never recovers"),
            |_| panic!("timeline must not be signalled when acquisition never recovers"),
        );
        assert_eq!(outcome, PresentCallbackOutcome::Skipped);
    }

    #[test]
    fn surface_lost_on_acquire_is_reported_without_retrying() {
        let request = PresentRequest::default();
        let recreate_calls = std::cell::Cell::new(0u32);
        let outcome = present_callback(
            &request,
            || Err(vk::Result::ERROR_SURFACE_LOST_KHR),
            || recreate_calls.set(recreate_calls.get() + 1),
            |_| panic!("blit must not run after a lost surface"),
            |_| panic!("present must not run after a lost surface"),
            |_| panic!("timeline must not be signalled after a lost surface"),
        );
        assert_eq!(outcome, PresentCallbackOutcome::SurfaceLost);
        assert_eq!(recreate_calls.get(), 0);
    }

    #[test]
    fn surface_lost_on_present_is_reported_after_the_blit_runs() {
        let request = PresentRequest::default();
        let blit_calls = std::cell::Cell::new(0u32);
        let outcome = present_callback(
            &request,
            || Ok(1),
            || {},
            |_| blit_calls.set(blit_calls.get() + 1),
            |_| vk::Result::ERROR_SURFACE_LOST_KHR,
            |_| panic!("timeline must not be signalled when present fails"),
        );
        assert_eq!(outcome, PresentCallbackOutcome::SurfaceLost);
        assert_eq!(blit_calls.get(), 1);
    }

    #[test]
    fn suboptimal_present_still_counts_as_presented() {
        let request = PresentRequest::default();
        let outcome = present_callback(
            &request,
            || Ok(0),
            || {},
            |_| {},
            |_| vk::Result::SUBOPTIMAL_KHR,
            |_| {},
        );
        assert_eq!(outcome, PresentCallbackOutcome::Presented { image_index: 0 });
    }
}
