//! Present-timing feedback and HDR metadata conversion (spec §4.6
//! "Present-timing feedback"). Grounded on `convert_hdr_metadata_hdr10` and
//! the calibration/feedback fields of `struct dxgi_vk_swap_chain::timing` in
//! the original runtime.

use std::sync::Mutex;

/// Candidate present stages, in the implementation's preference order
/// (`FIRST_PIXEL_OUT` over `FIRST_PIXEL_VISIBLE` over `REQUEST_DEQUEUED`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStage {
    RequestDequeued,
    FirstPixelVisible,
    FirstPixelOut,
}

bitflags::bitflags! {
    #[derive(Default)]
    pub struct PresentStageFlags: u32 {
        const REQUEST_DEQUEUED   = 1 << 0;
        const FIRST_PIXEL_VISIBLE = 1 << 1;
        const FIRST_PIXEL_OUT    = 1 << 2;
    }
}

/// Picks a single present stage to request timestamps for, per §4.6.
pub fn select_present_stage(supported: PresentStageFlags) -> Option<PresentStage> {
    if supported.contains(PresentStageFlags::FIRST_PIXEL_OUT) {
        Some(PresentStage::FirstPixelOut)
    } else if supported.contains(PresentStageFlags::FIRST_PIXEL_VISIBLE) {
        Some(PresentStage::FirstPixelVisible)
    } else if supported.contains(PresentStageFlags::REQUEST_DEQUEUED) {
        Some(PresentStage::RequestDequeued)
    } else {
        None
    }
}

/// Vendor documentation for this field is ambiguous about units; kept as a
/// direct, unscaled cast to match observed driver behavior.
pub fn convert_max_luminance(dxgi_luminance: u32) -> f32 {
    dxgi_luminance as f32
}

pub fn convert_min_luminance(dxgi_luminance: u32) -> f32 {
    dxgi_luminance as f32 * 0.0001
}

pub fn convert_level(dxgi_level: u16) -> f32 {
    dxgi_level as f32
}

pub fn convert_xy_color(x: u16, y: u16) -> (f32, f32) {
    (x as f32 / 50000.0, y as f32 / 50000.0)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Hdr10Metadata {
    pub red_primary: (u16, u16),
    pub green_primary: (u16, u16),
    pub blue_primary: (u16, u16),
    pub white_point: (u16, u16),
    pub max_mastering_luminance: u32,
    pub min_mastering_luminance: u32,
    pub max_content_light_level: u16,
    pub max_frame_average_light_level: u16,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct VkHdrMetadata {
    pub display_primary_red: (f32, f32),
    pub display_primary_green: (f32, f32),
    pub display_primary_blue: (f32, f32),
    pub white_point: (f32, f32),
    pub max_luminance: f32,
    pub min_luminance: f32,
    pub max_content_light_level: f32,
    pub max_frame_average_light_level: f32,
}

pub fn convert_hdr_metadata_hdr10(metadata: &Hdr10Metadata) -> VkHdrMetadata {
    VkHdrMetadata {
        display_primary_red: convert_xy_color(metadata.red_primary.0, metadata.red_primary.1),
        display_primary_green: convert_xy_color(metadata.green_primary.0, metadata.green_primary.1),
        display_primary_blue: convert_xy_color(metadata.blue_primary.0, metadata.blue_primary.1),
        white_point: convert_xy_color(metadata.white_point.0, metadata.white_point.1),
        max_luminance: convert_max_luminance(metadata.max_mastering_luminance),
        min_luminance: convert_min_luminance(metadata.min_mastering_luminance),
        max_content_light_level: convert_level(metadata.max_content_light_level),
        max_frame_average_light_level: convert_level(metadata.max_frame_average_light_level),
    }
}

/// Bounded store of time-domain calibration pairs. §4.6: "if an
/// implementation wants us to keep track of more than 16 time domains ...
/// just ignore the extra ones".
pub const MAX_TIME_DOMAINS: usize = 16;

#[derive(Clone, Copy, Debug)]
struct CalibrationEntry {
    domain_id: u64,
    device_timestamp: u64,
    reference_timestamp: u64,
}

#[derive(Default)]
pub struct CalibrationTable {
    entries: Vec<CalibrationEntry>,
}

impl CalibrationTable {
    pub fn new() -> Self {
        CalibrationTable::default()
    }

    /// Records a (device-domain timestamp, reference-domain timestamp) pair
    /// for `domain_id`, overwriting any prior calibration for that domain.
    pub fn update(&mut self, domain_id: u64, device_timestamp: u64, reference_timestamp: u64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.domain_id == domain_id) {
            entry.device_timestamp = device_timestamp;
            entry.reference_timestamp = reference_timestamp;
            return;
        }
        if self.entries.len() < MAX_TIME_DOMAINS {
            self.entries.push(CalibrationEntry { domain_id, device_timestamp, reference_timestamp });
        }
    }

    /// Translates a raw device-domain timestamp into the reference domain
    /// via the fixed offset recorded by the most recent `update`.
    pub fn translate(&self, domain_id: u64, device_timestamp: u64) -> Option<u64> {
        let entry = self.entries.iter().find(|e| e.domain_id == domain_id)?;
        let offset = entry.reference_timestamp as i128 - entry.device_timestamp as i128;
        Some((device_timestamp as i128 + offset).max(0) as u64)
    }

    pub fn domain_count(&self) -> usize {
        self.entries.len()
    }
}

/// Published past-presentation feedback (spec §4.6, and the `frame_statistics`
/// / `timing.feedback` fields of the original struct). Guarded by a single
/// lock since both the wait thread (writer) and the application (reader via
/// `GetFrameStatistics`) touch it.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStatistics {
    pub present_count: u64,
    pub present_time_ns: u64,
}

#[derive(Default)]
pub struct FrameStatisticsCell {
    inner: Mutex<FrameStatistics>,
}

impl FrameStatisticsCell {
    pub fn new() -> Self {
        FrameStatisticsCell::default()
    }

    pub fn update(&self, present_count: u64, present_time_ns: u64) {
        let mut guard = self.inner.lock().unwrap();
        guard.present_count = present_count;
        guard.present_time_ns = present_time_ns;
    }

    pub fn snapshot(&self) -> FrameStatistics {
        *self.inner.lock().unwrap()
    }
}
