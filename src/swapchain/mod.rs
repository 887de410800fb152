//! Presentation engine (spec §2 item 11, §4.6). Swapchain state is split
//! across the three threads that touch it: the caller thread owns
//! [`present::PresentCaller`], the submission thread owns the Vulkan
//! swapchain/blit state (modeled here only as the pure recreation-decision
//! helpers it needs), and the wait thread owns [`wait_thread::WaitQueue`].
//! Grounded on `struct dxgi_vk_swap_chain` in the original runtime.

pub mod frame_limiter;
pub mod present;
pub mod sync_handle;
pub mod timing;
pub mod wait_thread;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use ash::vk;

use crate::error::{Result, ValidationError};
use crate::format::DxgiFormat;

use frame_limiter::FrameRateLimiter;
use present::PresentCaller;
use sync_handle::NativeSyncHandle;
use timing::{CalibrationTable, FrameStatisticsCell, Hdr10Metadata};
use wait_thread::WaitQueue;

/// `DXGI_MAX_SWAP_CHAIN_BUFFERS`-equivalent cap on back buffers; also sizes
/// the present-request ring.
pub const MAX_BACK_BUFFERS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpaceType {
    SrgbNonlinear,
    Hdr10St2084,
    ExtendedSrgbLinear,
}

impl Default for ColorSpaceType {
    fn default() -> Self {
        ColorSpaceType::SrgbNonlinear
    }
}

pub fn convert_color_space(space: ColorSpaceType) -> vk::ColorSpaceKHR {
    match space {
        ColorSpaceType::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpaceType::Hdr10St2084 => vk::ColorSpaceKHR::HDR10_ST2084_EXT,
        ColorSpaceType::ExtendedSrgbLinear => vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
    }
}

pub fn supports_color_space(available: &[vk::ColorSpaceKHR], space: ColorSpaceType) -> bool {
    available.contains(&convert_color_space(space))
}

/// Chooses a present mode for swapchain (re)creation (§4.6 "Swapchain
/// recreation decides: Present mode"). `sync_interval > 0` always forces
/// FIFO; otherwise, if the implementation can switch present modes on an
/// existing swapchain without recreating it, prefer IMMEDIATE, then
/// MAILBOX, then FIFO.
pub fn decide_present_mode(
    sync_interval: u32,
    supports_mode_switch: bool,
    available: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    if sync_interval > 0 {
        return vk::PresentModeKHR::FIFO;
    }
    if supports_mode_switch {
        for candidate in [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO] {
            if available.contains(&candidate) {
                return candidate;
            }
        }
    }
    vk::PresentModeKHR::FIFO
}

/// §4.6 "Image count: at least max(3, surfaceCapabilities.minImageCount),
/// clamped to maxImageCount; an override env var can raise it."
/// `max_image_count == 0` means "unbounded", per the Vulkan spec's
/// convention for `VkSurfaceCapabilitiesKHR::maxImageCount`.
pub fn choose_image_count(min_image_count: u32, max_image_count: u32, env_override: Option<u32>) -> u32 {
    let mut count = min_image_count.max(3);
    if let Some(override_count) = env_override {
        count = count.max(override_count);
    }
    if max_image_count != 0 {
        count = count.min(max_image_count);
    }
    count
}

/// §4.6 "Extent: clamp surface-reported extent into [minImageExtent,
/// maxImageExtent]; if the implementation reports 'undefined' extent, fall
/// back to the DXGI_SWAP_CHAIN_DESC1.Width/Height... If the surface reports
/// maxImageExtent = 0 (minimized), record occlusion and do not create a
/// swapchain." Returns `None` for that minimized case.
pub fn clamp_extent(
    min_extent: (u32, u32),
    max_extent: (u32, u32),
    current_extent: Option<(u32, u32)>,
    fallback_extent: (u32, u32),
) -> Option<(u32, u32)> {
    if max_extent == (0, 0) {
        return None;
    }
    let (width, height) = current_extent.unwrap_or(fallback_extent);
    Some((
        width.clamp(min_extent.0.min(max_extent.0), max_extent.0),
        height.clamp(min_extent.1.min(max_extent.1), max_extent.1),
    ))
}

fn is_srgb_format(format: vk::Format) -> bool {
    matches!(format, vk::Format::R8G8B8A8_SRGB | vk::Format::B8G8R8A8_SRGB | vk::Format::A8B8G8R8_SRGB_PACK32)
}

/// §4.6 "Format/color-space: choose the first surface format that matches
/// both the DXGI format and the color space; if sRGB and the exact format
/// isn't offered, fall back to any sRGB format; for HDR, refuse to present
/// on format mismatch." `accept_srgb_fallback` should be `false` for HDR
/// color spaces, per the "refuse to present on format mismatch" clause.
pub fn find_surface_format(
    available: &[(vk::Format, vk::ColorSpaceKHR)],
    desired_format: vk::Format,
    desired_color_space: vk::ColorSpaceKHR,
    accept_srgb_fallback: bool,
) -> Option<(vk::Format, vk::ColorSpaceKHR)> {
    if let Some(exact) = available
        .iter()
        .find(|(format, space)| *format == desired_format && *space == desired_color_space)
    {
        return Some(*exact);
    }
    if accept_srgb_fallback && is_srgb_format(desired_format) {
        if let Some(fallback) = available
            .iter()
            .find(|(format, space)| is_srgb_format(*format) && *space == desired_color_space)
        {
            return Some(*fallback);
        }
    }
    None
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub format: DxgiFormat,
    pub buffer_count: u32,
}

/// Ties together the per-thread state split described in the module doc
/// comment. The Vulkan swapchain/image/semaphore objects themselves belong
/// to the submission thread and are intentionally not modeled here (they
/// are plain `ash` handles owned by the caller that drives `present_callback`);
/// this struct owns the cross-thread bookkeeping that has real sequencing
/// rules worth getting right independent of any particular device.
pub struct Swapchain {
    pub desc: Mutex<SwapchainDesc>,
    pub caller: Mutex<PresentCaller<MAX_BACK_BUFFERS>>,
    pub color_space: Mutex<ColorSpaceType>,
    pub hdr_metadata: Mutex<Option<Hdr10Metadata>>,
    pub supported_color_spaces: Vec<vk::ColorSpaceKHR>,
    pub frame_latency_event: NativeSyncHandle,
    pub frame_latency_event_internal: NativeSyncHandle,
    pub wait_queue: WaitQueue,
    pub frame_rate_limit: Mutex<FrameRateLimiter>,
    pub calibration: Mutex<CalibrationTable>,
    pub frame_statistics: FrameStatisticsCell,
    pub force_swapchain_recreation: AtomicBool,
    pub is_surface_lost: AtomicBool,
}

impl Swapchain {
    pub fn new(
        desc: SwapchainDesc,
        internal_latency: u32,
        supported_color_spaces: Vec<vk::ColorSpaceKHR>,
    ) -> Result<Self> {
        // Deliberately initialized one below internal_latency so the first
        // `internal_latency` presents don't block on this handle (§4.6 step 6).
        let initial_count = internal_latency.saturating_sub(1) as i32;
        Ok(Swapchain {
            caller: Mutex::new(PresentCaller::new(desc.buffer_count)),
            desc: Mutex::new(desc),
            color_space: Mutex::new(ColorSpaceType::default()),
            hdr_metadata: Mutex::new(None),
            supported_color_spaces,
            frame_latency_event: NativeSyncHandle::new(initial_count, 16)?,
            frame_latency_event_internal: NativeSyncHandle::new(initial_count, 16)?,
            wait_queue: WaitQueue::new(),
            frame_rate_limit: Mutex::new(FrameRateLimiter::disabled()),
            calibration: Mutex::new(CalibrationTable::new()),
            frame_statistics: FrameStatisticsCell::new(),
            force_swapchain_recreation: AtomicBool::new(false),
            is_surface_lost: AtomicBool::new(false),
        })
    }

    pub fn check_color_space_support(&self, space: ColorSpaceType) -> bool {
        supports_color_space(&self.supported_color_spaces, space)
    }

    pub fn set_color_space(&self, space: ColorSpaceType) -> Result<()> {
        if !self.check_color_space_support(space) {
            log::warn!("requested color space {space:?} is not in the surface's supported list");
            return Err(ValidationError::ColorSpaceUnsupported.into());
        }
        *self.color_space.lock().unwrap() = space;
        Ok(())
    }

    pub fn set_hdr_metadata(&self, metadata: Option<Hdr10Metadata>) {
        *self.hdr_metadata.lock().unwrap() = metadata;
    }

    /// `ChangeProperties` (spec §8 scenario 5): replaces the swap-chain
    /// description, resets `user.index` if it no longer fits the new buffer
    /// count, and marks the swapchain for recreation on the next present.
    /// Callers are responsible for verifying that all backbuffer refcounts
    /// are zero before calling this, per the same scenario.
    pub fn change_properties(&self, new_desc: SwapchainDesc) {
        let mut desc = self.desc.lock().unwrap();
        let mut caller = self.caller.lock().unwrap();
        *desc = new_desc;
        if caller.index >= new_desc.buffer_count {
            caller.index = 0;
        }
        caller.buffer_count = new_desc.buffer_count;
        self.force_swapchain_recreation.store(true, Ordering::SeqCst);
    }

    pub fn is_surface_lost(&self) -> bool {
        self.is_surface_lost.load(Ordering::SeqCst)
    }

    pub fn latch_surface_lost(&self) {
        log::warn!("presentation surface lost; no further swapchain will be created for it");
        self.is_surface_lost.store(true, Ordering::SeqCst);
    }
}
