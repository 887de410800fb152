//! Error types shared across the crate.
//!
//! `ApiError` is the outward-facing result type returned by every public
//! fallible operation; `ValidationError` enumerates the specific rejection
//! reasons that collapse into `ApiError::InvalidArgument` at the boundary,
//! following the `gfx-hal` convention of typed, `thiserror`-derived error
//! enums (see `gfx-hal`'s `external_memory/errors.rs`) rather than
//! stringly-typed failures.

pub type Result<T> = std::result::Result<T, ApiError>;

/// Top-level error returned from this crate's public API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Rejected at entry; never retried. Carries the specific reason.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    /// Host or device allocation failure.
    #[error("out of memory")]
    OutOfMemory,

    /// A Vulkan submission reported the device as lost.
    #[error("device lost")]
    DeviceLost,

    /// A feature this implementation has consciously not ported.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Any other non-success `VkResult`, kept for diagnostics.
    #[error("vulkan error: {0:?}")]
    VulkanError(ash::vk::Result),

    /// The presentation surface is occluded (minimized, or explicitly
    /// observed); `Present` returns this instead of submitting.
    #[error("surface occluded")]
    Occluded,

    /// The presentation surface has been permanently lost; no further
    /// swapchain will be created for it.
    #[error("surface lost")]
    SurfaceLost,
}

impl From<ash::vk::Result> for ApiError {
    fn from(result: ash::vk::Result) -> Self {
        match result {
            ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY => ApiError::OutOfMemory,
            ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => ApiError::OutOfMemory,
            ash::vk::Result::ERROR_DEVICE_LOST => ApiError::DeviceLost,
            other => ApiError::VulkanError(other),
        }
    }
}

/// Specific reasons a resource, view, or heap creation call can be rejected.
/// Distinguished from each other so tests and logs can tell them apart, even
/// though they all surface to the caller as `E_INVALIDARG`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("buffers must have Height=1, DepthOrArraySize=1, MipLevels=1, Format=UNKNOWN, Layout=ROW_MAJOR")]
    BufferDescriptionMustBeTrivial,

    #[error("ALLOW_SIMULTANEOUS_ACCESS cannot be combined with ALLOW_DEPTH_STENCIL or set on buffers")]
    SimultaneousAccessIncompatible,

    #[error("ROW_MAJOR textures require 2D, single mip/layer, ALLOW_CROSS_ADAPTER and must not be CPU-visible on a CUSTOM heap")]
    RowMajorLayoutRestricted,

    #[error("MSAA resources require ALLOW_RENDER_TARGET or ALLOW_DEPTH_STENCIL")]
    MsaaRequiresRenderTargetOrDepthStencil,

    #[error("MSAA UAVs are not supported by this device")]
    MsaaUavUnsupported,

    #[error("alignment must be 0, 4 KiB, 64 KiB, or 4 MiB (MSAA)")]
    AlignmentNotPermitted,

    #[error("requested small alignment does not fit the estimated subresource size")]
    SmallAlignmentTooSmall,

    #[error("castable format is incompatible with the base format's block size or byte width")]
    CastableFormatIncompatible,

    #[error("castable format list overflowed the fixed slot count")]
    CastableFormatListOverflow,

    #[error("sample count is not supported for this resource dimension")]
    SampleCountUnsupported,

    #[error("sampler-feedback mip region must be >= 4x4, a power of two, and at most half the texture size")]
    SamplerFeedbackRegionInvalid,

    #[error("sampler-feedback images do not support RTV/DSV usage")]
    SamplerFeedbackRtvDsvUnsupported,

    #[error("sampler-feedback images must be 2D")]
    SamplerFeedbackDimensionInvalid,

    #[error("initial resource state is inconsistent with the declared resource flags")]
    InitialStateInconsistentWithFlags,

    #[error("UPLOAD heaps only accept states that are a subset of GENERIC_READ or COMMON")]
    UploadHeapStateInvalid,

    #[error("READBACK heaps only accept COPY_DEST or COMMON")]
    ReadbackHeapStateInvalid,

    #[error("heap deny-flags exclude this resource category")]
    HeapDeniesResourceCategory,

    #[error("placed resource offset is not aligned to the Vulkan memory requirement")]
    PlacedOffsetMisaligned,

    #[error("shader-visible descriptor heaps may only be CBV_SRV_UAV or Sampler")]
    ShaderVisibleHeapTypeInvalid,

    #[error("shader-visible heap exceeds device descriptor capacity")]
    ShaderVisibleHeapTooLarge,

    #[error("CBV SizeInBytes must be a multiple of 256")]
    ConstantBufferSizeUnaligned,

    #[error("descriptor index is out of range for this heap")]
    DescriptorIndexOutOfRange,

    #[error("view subresource range is outside the resource's declared extent")]
    SubresourceRangeOutOfBounds,

    #[error("requested color space is not supported by this swapchain's surface")]
    ColorSpaceUnsupported,

    #[error("surface reports a degenerate image extent")]
    SwapchainExtentDegenerate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_host_memory_maps_to_out_of_memory() {
        let err: ApiError = ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY.into();
        assert!(matches!(err, ApiError::OutOfMemory));
    }

    #[test]
    fn device_lost_maps_through() {
        let err: ApiError = ash::vk::Result::ERROR_DEVICE_LOST.into();
        assert!(matches!(err, ApiError::DeviceLost));
    }

    #[test]
    fn validation_error_converts_into_api_error() {
        let err: ApiError = ValidationError::ConstantBufferSizeUnaligned.into();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }
}
