//! DXGI format catalog: maps D3D12's format enum onto the Vulkan format,
//! aspect mask, block geometry and byte count needed by resource and view
//! creation. Grounded on the `map_format` table shape in
//! `gfx-backend-vulkan/src/conv.rs`, generalized from gfx-hal's internal
//! `SurfaceType`/`ChannelType` split to DXGI's single flat format enum.

use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// Per-format capability flags consumed by resource/view validation.
    #[derive(Default)]
    pub struct FormatFeatures: u32 {
        const SAMPLED_IMAGE      = 1 << 0;
        const STORAGE_IMAGE      = 1 << 1;
        const COLOR_ATTACHMENT   = 1 << 2;
        const DEPTH_STENCIL      = 1 << 3;
        const BLEND              = 1 << 4;
        const BLOCK_COMPRESSED   = 1 << 5;
    }
}

/// The subset of DXGI formats this catalog covers. Typeless formats are
/// included because the castable-format-list algorithm (§4.3) needs to
/// recognize and skip them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum DxgiFormat {
    UNKNOWN,
    R32G32B32A32_TYPELESS,
    R32G32B32A32_FLOAT,
    R32G32B32A32_UINT,
    R32G32B32A32_SINT,
    R32_TYPELESS,
    R32_FLOAT,
    R32_UINT,
    R32_SINT,
    R32G32_TYPELESS,
    R32G32_UINT,
    R32G32_SINT,
    R8G8B8A8_TYPELESS,
    R8G8B8A8_UNORM,
    R8G8B8A8_UNORM_SRGB,
    R8G8B8A8_UINT,
    R8G8B8A8_SNORM,
    R8G8B8A8_SINT,
    R16G16B16A16_TYPELESS,
    R16G16B16A16_FLOAT,
    R16G16B16A16_UNORM,
    R16G16B16A16_UINT,
    D32_FLOAT,
    D24_UNORM_S8_UINT,
    D32_FLOAT_S8X24_UINT,
    R16_TYPELESS,
    R16_UINT,
    R16_FLOAT,
    BC1_TYPELESS,
    BC1_UNORM,
    BC1_UNORM_SRGB,
    BC3_TYPELESS,
    BC3_UNORM,
    BC3_UNORM_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_UNORM_SRGB,
    R10G10B10A2_UNORM,
    R10G10B10A2_TYPELESS,
}

impl Default for DxgiFormat {
    fn default() -> Self {
        DxgiFormat::UNKNOWN
    }
}

/// A catalog entry: the fixed set of facts the resource/view layer needs
/// about a format, independent of any particular resource.
#[derive(Clone, Copy, Debug)]
pub struct FormatInfo {
    pub dxgi: DxgiFormat,
    pub vk_format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
    pub block_width: u32,
    pub block_height: u32,
    pub byte_count: u32,
    features_bits: u32,
    /// `true` for `*_TYPELESS` formats; these contribute only to feature
    /// unions in the castable-format-list algorithm and never appear as a
    /// base Vulkan format on their own.
    pub typeless: bool,
}

impl FormatInfo {
    pub fn features(&self) -> FormatFeatures {
        FormatFeatures::from_bits_truncate(self.features_bits)
    }

    pub fn is_block_compressed(&self) -> bool {
        self.features().contains(FormatFeatures::BLOCK_COMPRESSED)
    }

    pub fn is_depth_stencil(&self) -> bool {
        self.features().contains(FormatFeatures::DEPTH_STENCIL)
    }
}

macro_rules! entry {
    ($dxgi:ident, $vk:expr, $aspect:expr, $bw:expr, $bh:expr, $bytes:expr, $features:expr, $typeless:expr) => {
        FormatInfo {
            dxgi: DxgiFormat::$dxgi,
            vk_format: $vk,
            aspect: $aspect,
            block_width: $bw,
            block_height: $bh,
            byte_count: $bytes,
            features_bits: $features,
            typeless: $typeless,
        }
    };
}

const COLOR: vk::ImageAspectFlags = vk::ImageAspectFlags::COLOR;
const DEPTH: vk::ImageAspectFlags = vk::ImageAspectFlags::DEPTH;
const DEPTH_STENCIL: vk::ImageAspectFlags = vk::ImageAspectFlags::from_raw(
    vk::ImageAspectFlags::DEPTH.as_raw() | vk::ImageAspectFlags::STENCIL.as_raw(),
);

static CATALOG: &[FormatInfo] = &[
    entry!(UNKNOWN, vk::Format::UNDEFINED, COLOR, 1, 1, 0, 0u32, false),
    entry!(R32G32B32A32_TYPELESS, vk::Format::R32G32B32A32_SFLOAT, COLOR, 1, 1, 16,
        1 | 2, true),
    entry!(R32G32B32A32_FLOAT, vk::Format::R32G32B32A32_SFLOAT, COLOR, 1, 1, 16,
        1 | 2 | 4, false),
    entry!(R32G32B32A32_UINT, vk::Format::R32G32B32A32_UINT, COLOR, 1, 1, 16,
        1 | 2, false),
    entry!(R32G32B32A32_SINT, vk::Format::R32G32B32A32_SINT, COLOR, 1, 1, 16,
        1 | 2, false),
    entry!(R32_TYPELESS, vk::Format::R32_SFLOAT, COLOR, 1, 1, 4,
        1 | 2, true),
    entry!(R32_FLOAT, vk::Format::R32_SFLOAT, COLOR, 1, 1, 4,
        1 | 2 | 4, false),
    entry!(R32_UINT, vk::Format::R32_UINT, COLOR, 1, 1, 4,
        1 | 2, false),
    entry!(R32_SINT, vk::Format::R32_SINT, COLOR, 1, 1, 4,
        1 | 2, false),
    entry!(R32G32_TYPELESS, vk::Format::R32G32_UINT, COLOR, 1, 1, 8,
        1 | 2, true),
    entry!(R32G32_UINT, vk::Format::R32G32_UINT, COLOR, 1, 1, 8,
        1 | 2, false),
    entry!(R32G32_SINT, vk::Format::R32G32_SINT, COLOR, 1, 1, 8,
        1 | 2, false),
    entry!(R8G8B8A8_TYPELESS, vk::Format::R8G8B8A8_UNORM, COLOR, 1, 1, 4,
        1 | 2, true),
    entry!(R8G8B8A8_UNORM, vk::Format::R8G8B8A8_UNORM, COLOR, 1, 1, 4,
        1 | 2 | 4 | 16, false),
    entry!(R8G8B8A8_UNORM_SRGB, vk::Format::R8G8B8A8_SRGB, COLOR, 1, 1, 4,
        1 | 4, false),
    entry!(R8G8B8A8_UINT, vk::Format::R8G8B8A8_UINT, COLOR, 1, 1, 4,
        1 | 2, false),
    entry!(R8G8B8A8_SNORM, vk::Format::R8G8B8A8_SNORM, COLOR, 1, 1, 4,
        1 | 2, false),
    entry!(R8G8B8A8_SINT, vk::Format::R8G8B8A8_SINT, COLOR, 1, 1, 4,
        1 | 2, false),
    entry!(R16G16B16A16_TYPELESS, vk::Format::R16G16B16A16_SFLOAT, COLOR, 1, 1, 8,
        1 | 2, true),
    entry!(R16G16B16A16_FLOAT, vk::Format::R16G16B16A16_SFLOAT, COLOR, 1, 1, 8,
        1 | 2 | 4 | 16, false),
    entry!(R16G16B16A16_UNORM, vk::Format::R16G16B16A16_UNORM, COLOR, 1, 1, 8,
        1 | 2, false),
    entry!(R16G16B16A16_UINT, vk::Format::R16G16B16A16_UINT, COLOR, 1, 1, 8,
        1 | 2, false),
    entry!(D32_FLOAT, vk::Format::D32_SFLOAT, DEPTH, 1, 1, 4, 8, false),
    entry!(D24_UNORM_S8_UINT, vk::Format::D24_UNORM_S8_UINT, DEPTH_STENCIL, 1, 1, 4, 8, false),
    entry!(D32_FLOAT_S8X24_UINT, vk::Format::D32_SFLOAT_S8_UINT, DEPTH_STENCIL, 1, 1, 8, 8, false),
    entry!(R16_TYPELESS, vk::Format::R16_UINT, COLOR, 1, 1, 2,
        1 | 2, true),
    entry!(R16_UINT, vk::Format::R16_UINT, COLOR, 1, 1, 2,
        1 | 2, false),
    entry!(R16_FLOAT, vk::Format::R16_SFLOAT, COLOR, 1, 1, 2,
        1 | 2 | 4, false),
    entry!(BC1_TYPELESS, vk::Format::BC1_RGBA_UNORM_BLOCK, COLOR, 4, 4, 8,
        1 | 32, true),
    entry!(BC1_UNORM, vk::Format::BC1_RGBA_UNORM_BLOCK, COLOR, 4, 4, 8,
        1 | 32, false),
    entry!(BC1_UNORM_SRGB, vk::Format::BC1_RGBA_SRGB_BLOCK, COLOR, 4, 4, 8,
        1 | 32, false),
    entry!(BC3_TYPELESS, vk::Format::BC3_UNORM_BLOCK, COLOR, 4, 4, 16,
        1 | 32, true),
    entry!(BC3_UNORM, vk::Format::BC3_UNORM_BLOCK, COLOR, 4, 4, 16,
        1 | 32, false),
    entry!(BC3_UNORM_SRGB, vk::Format::BC3_SRGB_BLOCK, COLOR, 4, 4, 16,
        1 | 32, false),
    entry!(B8G8R8A8_UNORM, vk::Format::B8G8R8A8_UNORM, COLOR, 1, 1, 4,
        1 | 4 | 16, false),
    entry!(B8G8R8A8_UNORM_SRGB, vk::Format::B8G8R8A8_SRGB, COLOR, 1, 1, 4,
        1 | 4, false),
    entry!(R10G10B10A2_UNORM, vk::Format::A2B10G10R10_UNORM_PACK32, COLOR, 1, 1, 4,
        1 | 2 | 4, false),
    entry!(R10G10B10A2_TYPELESS, vk::Format::A2B10G10R10_UNORM_PACK32, COLOR, 1, 1, 4,
        1 | 2, true),
];

/// Looks up a format's catalog entry. Panics on an unrecognized format only
/// if it's not in `CATALOG` at all, which would be a programming error (the
/// catalog is meant to be exhaustive over the formats this crate accepts).
pub fn lookup(format: DxgiFormat) -> &'static FormatInfo {
    CATALOG
        .iter()
        .find(|info| info.dxgi == format)
        .expect("DxgiFormat variant missing from CATALOG")
}

/// Two formats are "compatible" for the purposes of the castable-format-list
/// algorithm (§4.3) iff they share block dimensions and byte width.
pub fn is_castable_compatible(base: &FormatInfo, candidate: &FormatInfo) -> bool {
    base.block_width == candidate.block_width
        && base.block_height == candidate.block_height
        && base.byte_count == candidate.byte_count
}
