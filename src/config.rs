//! Process-wide configuration snapshot, read once from environment
//! variables.
//!
//! Replaces the "global mutable state read via `getenv` at static init"
//! pattern with an explicit, lazily-initialized, process-wide state object
//! (the re-architecture called out in the Design Notes).

use std::path::PathBuf;
use std::sync::OnceLock;

/// Snapshot of every environment variable this crate honors (spec §6).
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// `VKD3D_SWAPCHAIN_LATENCY_FRAMES`, clamped to `1..=16`.
    pub swapchain_latency_frames: Option<u32>,
    /// `VKD3D_SWAPCHAIN_IMAGES`.
    pub swapchain_min_images: Option<u32>,
    /// `VKD3D_SWAPCHAIN_DEBUG_LATENCY`.
    pub debug_latency: bool,
    /// `VKD3D_FRAME_RATE`.
    pub target_frame_rate: Option<f64>,
    /// `VKD3D_TIMESTAMP_PROFILE`.
    pub timestamp_profile_path: Option<PathBuf>,
}

impl RuntimeConfig {
    fn from_env() -> Self {
        RuntimeConfig {
            swapchain_latency_frames: parse_env_u32("VKD3D_SWAPCHAIN_LATENCY_FRAMES")
                .map(|v| v.clamp(1, 16)),
            swapchain_min_images: parse_env_u32("VKD3D_SWAPCHAIN_IMAGES"),
            debug_latency: parse_env_bool("VKD3D_SWAPCHAIN_DEBUG_LATENCY"),
            target_frame_rate: parse_env_f64("VKD3D_FRAME_RATE"),
            timestamp_profile_path: std::env::var_os("VKD3D_TIMESTAMP_PROFILE").map(PathBuf::from),
        }
    }

    /// Returns the process-wide configuration, parsing the environment on
    /// first access and reusing the result thereafter.
    pub fn get() -> &'static RuntimeConfig {
        static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();
        CONFIG.get_or_init(RuntimeConfig::from_env)
    }
}

fn parse_env_u32(name: &str) -> Option<u32> {
    match std::env::var(name) {
        Ok(value) => match value.parse::<u32>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                log::warn!("{name}={value:?} is not a valid u32, ignoring");
                None
            }
        },
        Err(_) => None,
    }
}

fn parse_env_f64(name: &str) -> Option<f64> {
    match std::env::var(name) {
        Ok(value) => match value.parse::<f64>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                log::warn!("{name}={value:?} is not a valid f64, ignoring");
                None
            }
        },
        Err(_) => None,
    }
}

fn parse_env_bool(name: &str) -> bool {
    match std::env::var(name) {
        Ok(value) => value == "1",
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_u32_rejects_garbage() {
        std::env::set_var("VKD3D_CORE_TEST_U32", "not-a-number");
        assert_eq!(parse_env_u32("VKD3D_CORE_TEST_U32"), None);
        std::env::remove_var("VKD3D_CORE_TEST_U32");
    }

    #[test]
    fn parse_env_u32_accepts_valid() {
        std::env::set_var("VKD3D_CORE_TEST_U32_OK", "12");
        assert_eq!(parse_env_u32("VKD3D_CORE_TEST_U32_OK"), Some(12));
        std::env::remove_var("VKD3D_CORE_TEST_U32_OK");
    }

    #[test]
    fn parse_env_bool_only_accepts_one() {
        std::env::set_var("VKD3D_CORE_TEST_BOOL", "true");
        assert!(!parse_env_bool("VKD3D_CORE_TEST_BOOL"));
        std::env::set_var("VKD3D_CORE_TEST_BOOL", "1");
        assert!(parse_env_bool("VKD3D_CORE_TEST_BOOL"));
        std::env::remove_var("VKD3D_CORE_TEST_BOOL");
    }
}
