//! Wait-thread loop (spec §4.6 "Wait thread loop"), ported from
//! `dxgi_vk_swap_chain_wait_worker`. The actual blocking Vulkan/OS calls
//! (`vkWaitForPresentKHR`, semaphore waits) are injected as closures so the
//! sequencing and bookkeeping can be exercised without a live device.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::swapchain::frame_limiter::FrameRateLimiter;
use crate::swapchain::sync_handle::NativeSyncHandle;
use crate::swapchain::timing::FrameStatisticsCell;

/// One queued wait-thread job. `present_count == 0` is the shutdown
/// sentinel (§4.6: "If the head entry's present_count == 0, exit").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresentWaitEntry {
    pub present_count: u64,
    pub present_id: u64,
    pub present_timing_enabled: bool,
    pub begin_frame_time_ns: u64,
}

impl PresentWaitEntry {
    pub fn shutdown() -> Self {
        PresentWaitEntry::default()
    }

    pub fn is_shutdown(&self) -> bool {
        self.present_count == 0
    }
}

/// The FIFO queue shared between the submission thread (producer) and the
/// wait thread (consumer), guarded by one lock/condvar pair.
#[derive(Default)]
pub struct WaitQueue {
    state: Mutex<VecDeque<PresentWaitEntry>>,
    cond: Condvar,
}

impl WaitQueue {
    pub fn new() -> Self {
        WaitQueue::default()
    }

    pub fn push(&self, entry: PresentWaitEntry) {
        let mut queue = self.state.lock().unwrap();
        queue.push_back(entry);
        self.cond.notify_all();
    }

    /// Blocks until an entry is available, pops it, and wakes any drainer if
    /// the queue just became empty.
    pub fn pop_blocking(&self) -> PresentWaitEntry {
        let mut queue = self.state.lock().unwrap();
        while queue.is_empty() {
            queue = self.cond.wait(queue).unwrap();
        }
        let entry = queue.pop_front().unwrap();
        if queue.is_empty() {
            self.cond.notify_all();
        }
        entry
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until the queue drains, used before destroying a swapchain
    /// (§4.6 "Recreation drains").
    pub fn wait_until_drained(&self) {
        let mut queue = self.state.lock().unwrap();
        while !queue.is_empty() {
            queue = self.cond.wait(queue).unwrap();
        }
    }
}

/// Bounded correlation list between a present ID and the `present_count` it
/// belongs to, used to attribute `VkPresentTimingEXT` feedback back to the
/// `Present` call that produced it. Mirrors
/// `wait_thread.id_correlation[16]`: on overflow the whole list is flushed,
/// since a full list means feedback isn't being drained as fast as presents
/// are produced.
pub const MAX_ID_CORRELATION_ENTRIES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdCorrelation {
    pub present_id: u64,
    pub present_count: u64,
}

#[derive(Default)]
pub struct IdCorrelationTable {
    entries: Vec<IdCorrelation>,
}

impl IdCorrelationTable {
    pub fn new() -> Self {
        IdCorrelationTable::default()
    }

    pub fn push(&mut self, present_id: u64, present_count: u64) {
        if self.entries.len() == MAX_ID_CORRELATION_ENTRIES {
            log::warn!("id correlation list filled, flushing; present timing feedback may not be keeping up");
            self.entries.clear();
        }
        self.entries.push(IdCorrelation { present_id, present_count });
    }

    pub fn present_count_for(&self, present_id: u64) -> Option<u64> {
        self.entries.iter().find(|e| e.present_id == present_id).map(|e| e.present_count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runs one iteration of the wait-thread body for a non-shutdown entry
/// (§4.6 "Wait thread loop"), returning the frame-rate-limiter delay (in ns)
/// the caller should sleep before looping back for the next entry.
///
/// `wait_for_present` is called only when the entry carries a present ID and
/// `skip_waits` is false; `drain_blit_complete` runs instead when the entry
/// has no present ID (present-wait isn't supported, so the wait thread
/// drains the blit-complete timeline directly).
#[allow(clippy::too_many_arguments)]
pub fn process_entry(
    entry: PresentWaitEntry,
    skip_waits: bool,
    wait_for_present: impl FnOnce(u64),
    drain_blit_complete: impl FnOnce(u64),
    now_ns: impl Fn() -> u64,
    present_wait_supported: bool,
    frame_latency: u32,
    limiter: &mut FrameRateLimiter,
    frame_statistics: &FrameStatisticsCell,
    frame_latency_event: &NativeSyncHandle,
    frame_latency_event_internal: &NativeSyncHandle,
) -> u64 {
    debug_assert!(!entry.is_shutdown());

    if entry.present_id != 0 {
        if !skip_waits {
            wait_for_present(entry.present_id);
        }
    } else {
        drain_blit_complete(entry.present_count);
    }

    let end_frame_time_ns = now_ns();

    let delay_ns = if present_wait_supported && !entry.present_timing_enabled {
        limiter.compute_delay_ns(end_frame_time_ns, frame_latency, present_wait_supported)
    } else {
        0
    };

    frame_statistics.update(entry.present_count, end_frame_time_ns);

    let _ = frame_latency_event.release(1);
    let _ = frame_latency_event_internal.release(1);

    delay_ns
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn shutdown_entry_is_recognized_by_zero_present_count() {
        assert!(PresentWaitEntry::shutdown().is_shutdown());
        assert!(!PresentWaitEntry { present_count: 1, ..Default::default() }.is_shutdown());
    }

    #[test]
    fn queue_pop_blocking_returns_pushed_entries_in_order() {
        let queue = WaitQueue::new();
        queue.push(PresentWaitEntry { present_count: 1, ..Default::default() });
        queue.push(PresentWaitEntry { present_count: 2, ..Default::default() });
        assert_eq!(queue.pop_blocking().present_count, 1);
        assert_eq!(queue.pop_blocking().present_count, 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn id_correlation_table_flushes_on_overflow() {
        let mut table = IdCorrelationTable::new();
        for i in 0..MAX_ID_CORRELATION_ENTRIES as u64 {
            table.push(i, i);
        }
        assert_eq!(table.len(), MAX_ID_CORRELATION_ENTRIES);
        table.push(999, 999);
        assert_eq!(table.len(), 1);
        assert_eq!(table.present_count_for(0), None);
        assert_eq!(table.present_count_for(999), Some(999));
    }

    #[test]
    fn process_entry_with_present_id_waits_and_releases_latency_handles() {
        let waited = AtomicU64::new(0);
        let mut limiter = FrameRateLimiter::disabled();
        let stats = FrameStatisticsCell::new();
        let latency_event = NativeSyncHandle::new(0, 16).unwrap();
        let latency_event_internal = NativeSyncHandle::new(0, 16).unwrap();

        let entry = PresentWaitEntry { present_count: 4, present_id: 42, ..Default::default() };
        let delay = process_entry(
            entry,
            false,
            |id| waited.store(id, Ordering::SeqCst),
            |_| panic!("should not drain blit-complete when present_id is set"),
            || 1_000_000,
            false,
            3,
            &mut limiter,
            &stats,
            &latency_event,
            &latency_event_internal,
        );

        assert_eq!(waited.load(Ordering::SeqCst), 42);
        assert_eq!(delay, 0);
        assert_eq!(stats.snapshot().present_count, 4);
    }

    #[test]
    fn process_entry_without_present_id_drains_blit_complete_instead() {
        let drained = AtomicU64::new(0);
        let mut limiter = FrameRateLimiter::disabled();
        let stats = FrameStatisticsCell::new();
        let latency_event = NativeSyncHandle::invalid();
        let latency_event_internal = NativeSyncHandle::invalid();

        let entry = PresentWaitEntry { present_count: 9, present_id: 0, ..Default::default() };
        process_entry(
            entry,
            false,
            |_| panic!("should not wait for present when present_id is 0"),
            |count| drained.store(count, Ordering::SeqCst),
            || 500,
            true,
            3,
            &mut limiter,
            &stats,
            &latency_event,
            &latency_event_internal,
        );

        assert_eq!(drained.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn skip_waits_suppresses_the_present_wait_call() {
        let waited = AtomicU64::new(0);
        let mut limiter = FrameRateLimiter::disabled();
        let stats = FrameStatisticsCell::new();
        let latency_event = NativeSyncHandle::invalid();
        let latency_event_internal = NativeSyncHandle::invalid();

        let entry = PresentWaitEntry { present_count: 1, present_id: 7, ..Default::default() };
        process_entry(
            entry,
            true,
            |id| waited.store(id, Ordering::SeqCst),
            |_| {},
            || 0,
            false,
            3,
            &mut limiter,
            &stats,
            &latency_event,
            &latency_event_internal,
        );

        assert_eq!(waited.load(Ordering::SeqCst), 0);
    }
}
