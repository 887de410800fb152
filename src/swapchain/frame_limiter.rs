//! CPU-side frame-rate limiter (spec §4.6 "Frame-rate limiter target
//! logic"). Ported from `dxgi_vk_swap_chain_delay_next_frame`: measures
//! observed frame rate over a sliding window and, once it exceeds the
//! target, switches to a deadline-based pacer with drift correction.

use std::time::Duration;

pub const MIN_WINDOW_SIZE: u32 = 8;
pub const MAX_WINDOW_SIZE: u32 = 128;
pub const DEFAULT_FRAME_LATENCY: u32 = 3;

/// The estimated timer/scheduler jitter for the platform's sleep call; the
/// limiter busy-waits through the last `SLEEP_THRESHOLD_NS + remaining/6` of
/// any wait rather than trusting the OS to wake it up exactly on time.
const SLEEP_THRESHOLD_NS: u64 = 2_000_000;

#[derive(Debug, Default)]
pub struct FrameRateLimiter {
    target_interval_ns: u64,
    enable: bool,
    next_deadline_ns: u64,
    heuristic_frame_time_ns: u64,
    heuristic_frame_count: u32,
}

impl FrameRateLimiter {
    pub fn disabled() -> Self {
        FrameRateLimiter::default()
    }

    /// `rate_hz == 0.0` disables the limiter entirely. A negative rate only
    /// changes how the target is reported elsewhere (VKD3D_FRAME_RATE's
    /// "only kick in if measured FPS exceeds |rate|" semantics are already
    /// implemented by the heuristic window below); the pacing target itself
    /// is always `1e9 / |rate|` ns.
    pub fn with_target_rate(rate_hz: f64) -> Self {
        let target_interval_ns = if rate_hz == 0.0 {
            0
        } else {
            (1.0e9 / rate_hz.abs()) as u64
        };
        FrameRateLimiter {
            target_interval_ns,
            ..FrameRateLimiter::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.target_interval_ns != 0
    }

    pub fn is_enabled(&self) -> bool {
        self.enable
    }

    /// Mirrors `dxgi_vk_swap_chain_delay_next_frame`'s bookkeeping exactly:
    /// updates the heuristic window / enables the limiter / advances the
    /// deadline, then returns the number of nanoseconds the caller should
    /// wait before the next present (0 if no wait is needed).
    ///
    /// `frame_latency` is the app's requested `MaxLatency`; it's only
    /// trusted when `wait_supported` (the implementation honors present
    /// timing), since otherwise the reported value may not be reliable.
    pub fn compute_delay_ns(&mut self, current_time_ns: u64, frame_latency: u32, wait_supported: bool) -> u64 {
        let mut local_deadline_ns = 0u64;

        if self.target_interval_ns != 0 {
            if !self.enable {
                let frame_latency = if wait_supported { frame_latency } else { DEFAULT_FRAME_LATENCY };
                let frame_count = self.heuristic_frame_count;

                if frame_count >= MIN_WINDOW_SIZE {
                    let window_total_ns = current_time_ns.saturating_sub(self.heuristic_frame_time_ns);
                    let window_expected_ns = frame_count as u64 * self.target_interval_ns;
                    let frame_count_min = (frame_count - 1) as u64;
                    let frame_count_max = frame_count as u64 + frame_latency as u64;

                    if frame_count_max * window_total_ns < frame_count as u64 * window_expected_ns {
                        log::info!(
                            "measured frame rate exceeds the target interval of {}ns, enabling frame-rate limiter",
                            self.target_interval_ns
                        );
                        self.enable = true;
                    } else if frame_count_min * window_total_ns > frame_count as u64 * window_expected_ns
                        || frame_count >= MAX_WINDOW_SIZE
                    {
                        self.heuristic_frame_count = 0;
                        self.heuristic_frame_time_ns = 0;
                    }
                }
            }

            if self.enable {
                if current_time_ns < self.next_deadline_ns + self.target_interval_ns {
                    self.next_deadline_ns += self.target_interval_ns;
                } else {
                    self.next_deadline_ns = current_time_ns + self.target_interval_ns;
                }
                local_deadline_ns = self.next_deadline_ns;
            } else {
                if self.heuristic_frame_time_ns == 0 {
                    self.heuristic_frame_time_ns = current_time_ns;
                }
                self.heuristic_frame_count += 1;
            }
        }

        if current_time_ns >= local_deadline_ns {
            0
        } else {
            local_deadline_ns - current_time_ns
        }
    }
}

/// Blocks the calling thread until `deadline_ns` (as reported by `now_ns`),
/// sleeping for the bulk of the wait and busy-spinning through the final
/// jittery tail for accuracy. Not unit-tested: it is a thin wrapper around
/// real sleeping and would make the test suite slow and timing-dependent.
pub fn sleep_until(deadline_ns: u64, now_ns: impl Fn() -> u64) {
    loop {
        let current = now_ns();
        if current >= deadline_ns {
            return;
        }
        let remaining_ns = deadline_ns - current;
        let threshold_ns = SLEEP_THRESHOLD_NS + remaining_ns / 6;
        if remaining_ns > threshold_ns {
            std::thread::sleep(Duration::from_nanos(remaining_ns - threshold_ns));
        } else {
            std::hint::spin_loop();
        }
    }
}
