//! `ViewKey`: the tagged-union hash-map key that identifies everything that
//! varies between two views of the same underlying resource (spec §3, §4.4).
//! Two keys compare equal iff the Vulkan object they'd produce would be
//! byte-identical, so the view map can safely intern on them.

use crate::format::DxgiFormat;
use crate::hash::{hash_combine, hash_u64};
use ash::vk;

/// Component swizzle, kept explicit (rather than reusing `vk::ComponentMapping`
/// directly) so it implements `Hash`/`Eq`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Swizzle {
    pub r: vk::ComponentSwizzle,
    pub g: vk::ComponentSwizzle,
    pub b: vk::ComponentSwizzle,
    pub a: vk::ComponentSwizzle,
}

impl Swizzle {
    pub const IDENTITY: Swizzle = Swizzle {
        r: vk::ComponentSwizzle::IDENTITY,
        g: vk::ComponentSwizzle::IDENTITY,
        b: vk::ComponentSwizzle::IDENTITY,
        a: vk::ComponentSwizzle::IDENTITY,
    };
}

/// Subresource range addressed by an image view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub base_mip_level: u32,
    pub mip_levels: u32,
    pub base_array_layer: u32,
    pub array_layers: u32,
}

/// Sampler address-mode triple, used to decide whether border color is part
/// of the key (it's unreachable, and therefore omitted, unless at least one
/// address mode is `CLAMP_TO_BORDER`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerAddressModes {
    pub u: vk::SamplerAddressMode,
    pub v: vk::SamplerAddressMode,
    pub w: vk::SamplerAddressMode,
}

impl SamplerAddressModes {
    fn border_reachable(&self) -> bool {
        [self.u, self.v, self.w]
            .iter()
            .any(|mode| *mode == vk::SamplerAddressMode::CLAMP_TO_BORDER)
    }
}

/// Tagged union identifying a buffer, image, sampler, or acceleration
/// structure view. Variants carry exactly the fields that distinguish two
/// Vulkan view objects of the same kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewKey {
    Buffer {
        format: Option<DxgiFormat>,
        offset: u64,
        size: u64,
    },
    Image {
        format: DxgiFormat,
        view_type: vk::ImageViewType,
        range: SubresourceRange,
        swizzle: Swizzle,
        /// `MinLOD` clamp, carried as raw bits since views at different
        /// clamps are genuinely distinct Vulkan objects.
        min_lod_clamp_bits: u32,
        /// Offset/size into a sliced 3D view (`w_offset`/`w_size` in spec §3).
        w_offset: u32,
        w_size: u32,
    },
    Sampler {
        mag_filter: vk::Filter,
        min_filter: vk::Filter,
        mipmap_mode: vk::SamplerMipmapMode,
        address_modes: SamplerAddressModes,
        mip_lod_bias_bits: u32,
        max_anisotropy_bits: u32,
        compare_enable: bool,
        compare_op: vk::CompareOp,
        min_lod_bits: u32,
        max_lod_bits: u32,
        /// Only present in the key when at least one address mode makes the
        /// border color reachable.
        border_color: Option<vk::BorderColor>,
    },
    AccelerationStructure {
        gpu_virtual_address: u64,
    },
}

impl ViewKey {
    /// Builds a sampler key, omitting the border color when no address mode
    /// can reach it (§3: "Sampler keys omit border color when the address
    /// modes make it unreachable").
    #[allow(clippy::too_many_arguments)]
    pub fn sampler(
        mag_filter: vk::Filter,
        min_filter: vk::Filter,
        mipmap_mode: vk::SamplerMipmapMode,
        address_modes: SamplerAddressModes,
        mip_lod_bias: f32,
        max_anisotropy: f32,
        compare_enable: bool,
        compare_op: vk::CompareOp,
        min_lod: f32,
        max_lod: f32,
        border_color: vk::BorderColor,
    ) -> ViewKey {
        ViewKey::Sampler {
            mag_filter,
            min_filter,
            mipmap_mode,
            address_modes,
            mip_lod_bias_bits: mip_lod_bias.to_bits(),
            max_anisotropy_bits: max_anisotropy.to_bits(),
            compare_enable,
            compare_op,
            min_lod_bits: min_lod.to_bits(),
            max_lod_bits: max_lod.to_bits(),
            border_color: if address_modes.border_reachable() {
                Some(border_color)
            } else {
                None
            },
        }
    }

    /// 32-bit hash compatible with [`crate::hash_map::HashMap`], derived by
    /// combining a discriminant with every field via [`hash_combine`].
    pub fn hash32(&self) -> u32 {
        match self {
            ViewKey::Buffer {
                format,
                offset,
                size,
            } => {
                let mut h = hash_combine(0, 0);
                h = hash_combine(h, format.map(|f| f as u32).unwrap_or(u32::MAX));
                h = hash_combine(h, hash_u64(*offset));
                h = hash_combine(h, hash_u64(*size));
                h
            }
            ViewKey::Image {
                format,
                view_type,
                range,
                swizzle,
                min_lod_clamp_bits,
                w_offset,
                w_size,
            } => {
                let mut h = hash_combine(0, 1);
                h = hash_combine(h, *format as u32);
                h = hash_combine(h, view_type.as_raw() as u32);
                h = hash_combine(h, range.base_mip_level);
                h = hash_combine(h, range.mip_levels);
                h = hash_combine(h, range.base_array_layer);
                h = hash_combine(h, range.array_layers);
                h = hash_combine(h, swizzle.r.as_raw() as u32);
                h = hash_combine(h, swizzle.g.as_raw() as u32);
                h = hash_combine(h, swizzle.b.as_raw() as u32);
                h = hash_combine(h, swizzle.a.as_raw() as u32);
                h = hash_combine(h, *min_lod_clamp_bits);
                h = hash_combine(h, *w_offset);
                h = hash_combine(h, *w_size);
                h
            }
            ViewKey::Sampler {
                mag_filter,
                min_filter,
                mipmap_mode,
                address_modes,
                mip_lod_bias_bits,
                max_anisotropy_bits,
                compare_enable,
                compare_op,
                min_lod_bits,
                max_lod_bits,
                border_color,
            } => {
                let mut h = hash_combine(0, 2);
                h = hash_combine(h, mag_filter.as_raw() as u32);
                h = hash_combine(h, min_filter.as_raw() as u32);
                h = hash_combine(h, mipmap_mode.as_raw() as u32);
                h = hash_combine(h, address_modes.u.as_raw() as u32);
                h = hash_combine(h, address_modes.v.as_raw() as u32);
                h = hash_combine(h, address_modes.w.as_raw() as u32);
                h = hash_combine(h, *mip_lod_bias_bits);
                h = hash_combine(h, *max_anisotropy_bits);
                h = hash_combine(h, *compare_enable as u32);
                h = hash_combine(h, compare_op.as_raw() as u32);
                h = hash_combine(h, *min_lod_bits);
                h = hash_combine(h, *max_lod_bits);
                h = hash_combine(h, border_color.map(|b| b.as_raw() as u32).unwrap_or(u32::MAX));
                h
            }
            ViewKey::AccelerationStructure { gpu_virtual_address } => {
                hash_combine(hash_combine(0, 3), hash_u64(*gpu_virtual_address))
            }
        }
    }
}
