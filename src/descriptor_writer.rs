//! CBV/SRV/UAV/Sampler/RTV/DSV descriptor writers (spec §4.5). Each writer
//! validates its inputs, builds a [`crate::view::ViewKey`] when the
//! descriptor needs an interned Vulkan view, and writes the resulting
//! metadata into a heap slot.

use ash::vk;

use crate::descriptor_heap::{DescriptorHeap, DescriptorMetadataEntry, DescriptorViewType, PayloadWriteTarget};
use crate::error::{Result, ValidationError};
use crate::view::{View, ViewMap, ViewPayload};
use crate::view_key::{SubresourceRange, Swizzle, ViewKey};
use std::sync::Arc;

/// `CreateCBV` (§4.5). A `gpu_virtual_address` of 0 writes the heap's null
/// `UNIFORM_BUFFER` template instead of building a real descriptor.
/// `write_payload` is handed the slot's resolved Vulkan write target (a
/// `VkDescriptorAddressInfoEXT`-equivalent store into a descriptor buffer, or
/// a `VkWriteDescriptorSet` for a pool-backed heap) and runs before the
/// null-template fallback, so it always reflects the caller's actual
/// address/size even on the null path.
pub fn write_cbv(
    heap: &mut DescriptorHeap,
    slot: u32,
    gpu_virtual_address: u64,
    size_in_bytes: u32,
    write_payload: impl FnOnce(PayloadWriteTarget, u64, u32),
) -> Result<()> {
    if size_in_bytes % 256 != 0 {
        return Err(ValidationError::ConstantBufferSizeUnaligned.into());
    }
    let target = heap.payload_write_target(slot)?;
    write_payload(target, gpu_virtual_address, size_in_bytes);

    if gpu_virtual_address == 0 {
        return heap.write_null_descriptor_template(slot, DescriptorViewType::Cbv);
    }
    let entry = DescriptorMetadataEntry {
        view_type: DescriptorViewType::Cbv,
        cookie: hash_buffer_location(gpu_virtual_address, size_in_bytes as u64),
    };
    heap.write_descriptor(slot, entry, gpu_virtual_address)
}

fn hash_buffer_location(address: u64, size: u64) -> u64 {
    // Cookie 0 is reserved for "null"; buffer-view cookies need not be
    // globally unique the way interned view cookies are, only non-zero and
    // stable across repeated writes of the same location.
    (address ^ size.rotate_left(17)).max(1)
}

/// Applies the fine-grained-rebinding offset quantization described in
/// §4.5: `(first_element, num_elements)` is rounded down to a power-of-two
/// alignment, and the residual offset is returned for storage in the
/// per-descriptor offset buffer, so that interning by `ViewKey` doesn't
/// explode under per-draw rebinding.
pub fn quantize_buffer_range(first_element: u64, num_elements: u64, quantum: u64) -> (u64, u64) {
    if quantum <= 1 {
        return (first_element, 0);
    }
    let quantized_first = (first_element / quantum) * quantum;
    let residual = first_element - quantized_first;
    let _ = num_elements;
    (quantized_first, residual)
}

/// Buffer SRV/UAV writer (raw/structured). Emits both an SSBO-style key
/// (`Buffer` with a format of `None`) and a texel-buffer key when `format`
/// is `Some`, per §4.5 ("emits both an SSBO descriptor ... and a texel-buffer
/// descriptor"). `write_payload` writes the interned view's real Vulkan
/// payload (the buffer view handle for a texel-buffer key, or the raw
/// `(offset, size)` for a plain SSBO key) into the slot's resolved target.
pub fn write_buffer_view(
    heap: &mut DescriptorHeap,
    slot: u32,
    view_map: &ViewMap,
    offset: u64,
    size: u64,
    format: Option<crate::format::DxgiFormat>,
    view_type: DescriptorViewType,
    create: impl FnOnce() -> ViewPayload,
    write_payload: impl FnOnce(PayloadWriteTarget, &ViewPayload, u64, u64),
) -> Result<Arc<View>> {
    let key = ViewKey::Buffer { format, offset, size };
    let view = view_map.get_or_create(key, create);
    let target = heap.payload_write_target(slot)?;
    write_payload(target, &view.payload, offset, size);
    let entry = DescriptorMetadataEntry {
        view_type,
        cookie: view.cookie,
    };
    heap.write_descriptor(slot, entry, 0)?;
    Ok(view)
}

/// Texture SRV/UAV writer (§4.5): interns the subresource/swizzle/MSAA view
/// through the resource's view map, then writes a sampled or storage image
/// descriptor. `write_payload` writes the interned `VkImageView` (plus the
/// layout it's expected to be bound in) into the slot's resolved target.
#[allow(clippy::too_many_arguments)]
pub fn write_texture_view(
    heap: &mut DescriptorHeap,
    slot: u32,
    view_map: &ViewMap,
    format: crate::format::DxgiFormat,
    view_dimension: vk::ImageViewType,
    range: SubresourceRange,
    swizzle: Swizzle,
    min_lod_clamp: f32,
    w_offset: u32,
    w_size: u32,
    view_type: DescriptorViewType,
    create: impl FnOnce() -> ViewPayload,
    write_payload: impl FnOnce(PayloadWriteTarget, &ViewPayload),
) -> Result<Arc<View>> {
    let key = ViewKey::Image {
        format,
        view_type: view_dimension,
        range,
        swizzle,
        min_lod_clamp_bits: min_lod_clamp.to_bits(),
        w_offset,
        w_size,
    };
    let view = view_map.get_or_create(key, create);
    let target = heap.payload_write_target(slot)?;
    write_payload(target, &view.payload);
    let entry = DescriptorMetadataEntry {
        view_type,
        cookie: view.cookie,
    };
    heap.write_descriptor(slot, entry, 0)?;
    Ok(view)
}

/// Acceleration-structure SRV (§4.5). By design this writes no Vulkan
/// descriptor and interns no view: the root-signature compiler lowers
/// acceleration-structure SRVs to a raw GPU virtual address read directly
/// from the raw-VA aux buffer in the shader, not through a bound descriptor,
/// so there is nothing for a `write_payload` closure here to do.
pub fn write_acceleration_structure_srv(heap: &mut DescriptorHeap, slot: u32, gpu_virtual_address: u64) -> Result<()> {
    let entry = DescriptorMetadataEntry {
        view_type: DescriptorViewType::AccelerationStructure,
        cookie: gpu_virtual_address.max(1),
    };
    heap.write_descriptor(slot, entry, gpu_virtual_address)
}

/// RTV/DSV writer (§4.5). By design this emits no Vulkan descriptor: RTV/DSV
/// heaps are never bound through the bindless descriptor-buffer/set path at
/// all, they're consulted directly by `OMSetRenderTargets`/render-pass setup
/// for the interned image view, sample count, format, layer count, and
/// plane-write-enable mask, which is why the heap slot here stays CPU-only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RtvDsvSlotInfo {
    pub sample_count: u32,
    pub format: crate::format::DxgiFormat,
    pub array_layers: u32,
    pub plane_write_mask: u32,
}

pub fn write_rtv_or_dsv(
    heap: &mut DescriptorHeap,
    slot: u32,
    view_map: &ViewMap,
    key: ViewKey,
    view_type: DescriptorViewType,
    create: impl FnOnce() -> ViewPayload,
) -> Result<Arc<View>> {
    let view = view_map.get_or_create(key, create);
    let entry = DescriptorMetadataEntry {
        view_type,
        cookie: view.cookie,
    };
    heap.write_descriptor(slot, entry, 0)?;
    Ok(view)
}

/// Sampler writer (§4.5): interns through the device-global sampler cache
/// (see `sampler_cache.rs`), then writes one descriptor. `write_payload`
/// writes `vk_sampler` into the slot's resolved target.
pub fn write_sampler(
    heap: &mut DescriptorHeap,
    slot: u32,
    interned_sampler_cookie: u64,
    vk_sampler: vk::Sampler,
    write_payload: impl FnOnce(PayloadWriteTarget, vk::Sampler),
) -> Result<()> {
    let target = heap.payload_write_target(slot)?;
    write_payload(target, vk_sampler);
    let entry = DescriptorMetadataEntry {
        view_type: DescriptorViewType::Sampler,
        cookie: interned_sampler_cookie,
    };
    heap.write_descriptor(slot, entry, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor_heap::{DescriptorHeapDesc, HeapKind, HeapLayoutKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn heap() -> DescriptorHeap {
        DescriptorHeap::create(
            DescriptorHeapDesc {
                heap_type: HeapKind::CbvSrvUav,
                num_descriptors: 8,
                shader_visible: false,
            },
            HeapLayoutKind::MutableSingleSet,
            32,
            64,
            |_| panic!("create_descriptor_buffer must not run for a pool-backed layout"),
            |_| Ok(vk::DescriptorPool::null()),
        )
        .unwrap()
    }

    #[test]
    fn cbv_with_unaligned_size_is_rejected() {
        let mut h = heap();
        assert!(write_cbv(&mut h, 0, 0x1000, 255, |_, _, _| {}).is_err());
    }

    #[test]
    fn null_cbv_writes_null_template_and_clears_raw_va() {
        let mut h = heap();
        let payload_calls = AtomicUsize::new(0);
        write_cbv(&mut h, 0, 0, 256, |_, address, size| {
            payload_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(address, 0);
            assert_eq!(size, 256);
        })
        .unwrap();
        let entry = h.metadata_at(0).unwrap();
        assert!(entry.is_null());
        assert_eq!(h.raw_va_at(0).unwrap(), 0);
        assert_eq!(payload_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nonzero_cbv_writes_nonnull_descriptor_and_its_payload() {
        let mut h = heap();
        let payload_calls = AtomicUsize::new(0);
        write_cbv(&mut h, 1, 0x2000, 512, |_, address, size| {
            payload_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(address, 0x2000);
            assert_eq!(size, 512);
        })
        .unwrap();
        let entry = h.metadata_at(1).unwrap();
        assert!(!entry.is_null());
        assert_eq!(h.raw_va_at(1).unwrap(), 0x2000);
        assert_eq!(payload_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn quantize_buffer_range_recovers_exact_offset() {
        let (base, residual) = quantize_buffer_range(37, 10, 16);
        assert_eq!(base + residual, 37);
        assert_eq!(base % 16, 0);
    }

    #[test]
    fn repeated_texture_view_writes_share_the_same_view_cookie() {
        let map = ViewMap::new();
        let mut h = heap();
        let calls = AtomicUsize::new(0);
        let range = SubresourceRange {
            base_mip_level: 0,
            mip_levels: 4,
            base_array_layer: 0,
            array_layers: 1,
        };
        let make = || {
            calls.fetch_add(1, Ordering::SeqCst);
            ViewPayload::Image { vk_image_view: vk::ImageView::null() }
        };

        write_texture_view(
            &mut h, 0, &map,
            crate::format::DxgiFormat::R8G8B8A8_UNORM,
            vk::ImageViewType::TYPE_2D,
            range, Swizzle::IDENTITY, 0.0, 0, 0,
            DescriptorViewType::SampledImage, make, |_, _| {},
        )
        .unwrap();
        write_texture_view(
            &mut h, 1, &map,
            crate::format::DxgiFormat::R8G8B8A8_UNORM,
            vk::ImageViewType::TYPE_2D,
            range, Swizzle::IDENTITY, 0.0, 0, 0,
            DescriptorViewType::SampledImage, make, |_, _| {},
        )
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.metadata_at(0).unwrap().cookie, h.metadata_at(1).unwrap().cookie);
    }

    #[test]
    fn buffer_view_write_payload_receives_the_resolved_offset_and_size() {
        let map = ViewMap::new();
        let mut h = heap();
        let payload_calls = AtomicUsize::new(0);

        let view = write_buffer_view(
            &mut h,
            0,
            &map,
            128,
            256,
            None,
            DescriptorViewType::StorageTexelBuffer,
            || ViewPayload::Buffer { vk_buffer_view: None },
            |_, payload, offset, size| {
                payload_calls.fetch_add(1, Ordering::SeqCst);
                assert!(matches!(payload, ViewPayload::Buffer { .. }));
                assert_eq!(offset, 128);
                assert_eq!(size, 256);
            },
        )
        .unwrap();

        assert_eq!(payload_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.metadata_at(0).unwrap().cookie, view.cookie);
    }

    #[test]
    fn sampler_write_payload_receives_the_vk_sampler_handle() {
        let mut h = heap();
        let payload_calls = AtomicUsize::new(0);
        let vk_sampler = vk::Sampler::null();

        write_sampler(&mut h, 0, 0xfeed_face, vk_sampler, |_, sampler| {
            payload_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(sampler, vk_sampler);
        })
        .unwrap();

        assert_eq!(payload_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.metadata_at(0).unwrap().cookie, 0xfeed_face);
    }

    #[test]
    fn acceleration_structure_srv_stores_only_raw_va() {
        let mut h = heap();
        write_acceleration_structure_srv(&mut h, 2, 0xabcd_1234).unwrap();
        assert_eq!(h.raw_va_at(2).unwrap(), 0xabcd_1234);
        assert_eq!(
            h.metadata_at(2).unwrap().view_type,
            DescriptorViewType::AccelerationStructure
        );
    }
}
