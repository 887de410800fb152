//! Bindless descriptor heap engine (spec §4.5, §6).
//!
//! Internal code addresses descriptors through the typed [`DescriptorSlot`]
//! handle; the 64-bit CPU/GPU handle values defined by the external ABI are
//! produced and consumed only at the encode/decode boundary functions below,
//! per the "CPU-handle arithmetic on pointers -> encode-only helpers"
//! re-architecture.

use ash::vk;

use crate::error::{ApiError, Result, ValidationError};

/// Number of low bits of a non-embedded CPU handle reserved for the POT
/// log2 of the heap's descriptor count (§6).
const LOG2_BITS: u32 = 5;
const LOG2_MASK: u64 = (1 << LOG2_BITS) - 1;
const EMBEDDED_SHADER_VISIBLE_BIT: u64 = 1;

fn log2_ceil(n: u32) -> u32 {
    let n = n.max(1);
    if n == 1 {
        0
    } else {
        (n - 1).ilog2() + 1
    }
}

/// Typed internal handle: which heap, and which slot within it. Never
/// serialized; only `encode_*`/`decode_*` below cross the ABI boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorSlot {
    pub heap_id: u32,
    pub slot_index: u32,
}

/// Packs a non-embedded heap's base pointer and descriptor count into a CPU
/// handle. `heap_base_ptr`'s low [`LOG2_BITS`] bits must be zero (the heap
/// allocation must be aligned at least that wide).
pub fn encode_cpu_handle_non_embedded(heap_base_ptr: u64, num_descriptors: u32) -> u64 {
    debug_assert_eq!(heap_base_ptr & LOG2_MASK, 0, "heap pointer must leave its low bits free");
    heap_base_ptr | (log2_ceil(num_descriptors) as u64 & LOG2_MASK)
}

pub fn decode_heap_pointer(handle: u64) -> u64 {
    handle & !LOG2_MASK
}

pub fn decode_log2_capacity(handle: u64) -> u32 {
    (handle & LOG2_MASK) as u32
}

/// Packs an embedded-mutable CPU handle: the handle *is* the address of the
/// descriptor payload. For non-shader-visible heaps with planar metadata,
/// the low bits additionally carry the log2 offset to the parallel metadata
/// region and a shader-visible flag, per §6.
pub fn encode_cpu_handle_embedded(
    payload_addr: u64,
    metadata_log2_offset: Option<u32>,
    shader_visible: bool,
) -> u64 {
    let mut low = 0u64;
    if shader_visible {
        low |= EMBEDDED_SHADER_VISIBLE_BIT;
    }
    if let Some(log2) = metadata_log2_offset {
        low |= (log2 as u64) << 1;
    }
    payload_addr | low
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapKind {
    CbvSrvUav,
    Sampler,
    Rtv,
    Dsv,
}

pub fn validate_shader_visible_heap_type(kind: HeapKind, shader_visible: bool) -> Result<()> {
    if shader_visible && !matches!(kind, HeapKind::CbvSrvUav | HeapKind::Sampler) {
        return Err(ValidationError::ShaderVisibleHeapTypeInvalid.into());
    }
    Ok(())
}

/// Hard cap for non-shader-visible heaps (§7 "User-visible failure
/// behavior"): above this, creation fails with out-of-memory rather than
/// invalid-argument.
const NON_SHADER_VISIBLE_HARD_CAP_BYTES: u64 = 4 * 1024 * 1024 * 1024;

pub fn validate_heap_size(
    num_descriptors: u32,
    shader_visible: bool,
    device_descriptor_capacity: u32,
    descriptor_stride_bytes: u64,
) -> Result<()> {
    if shader_visible {
        if num_descriptors > device_descriptor_capacity {
            return Err(ValidationError::ShaderVisibleHeapTooLarge.into());
        }
        return Ok(());
    }
    let total = num_descriptors as u64 * descriptor_stride_bytes;
    if total > NON_SHADER_VISIBLE_HARD_CAP_BYTES {
        return Err(ApiError::OutOfMemory);
    }
    Ok(())
}

/// Which of the three internal layouts (§3 "DescriptorHeap") a heap uses.
/// Chosen once at creation from device capabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapLayoutKind {
    NonMutableMultiSet,
    MutableSingleSet,
    EmbeddedMutableDescriptorBuffer,
}

pub fn select_layout(
    device_supports_descriptor_buffer: bool,
    device_supports_mutable_descriptor_type: bool,
) -> HeapLayoutKind {
    if device_supports_descriptor_buffer && device_supports_mutable_descriptor_type {
        HeapLayoutKind::EmbeddedMutableDescriptorBuffer
    } else if device_supports_mutable_descriptor_type {
        HeapLayoutKind::MutableSingleSet
    } else {
        HeapLayoutKind::NonMutableMultiSet
    }
}

/// What a descriptor slot currently holds. `Null` is distinguished from the
/// absence of a write: every slot is either null-initialized or fully
/// written (§3 "Heap invariants").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorViewType {
    Cbv,
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    Sampler,
    Rtv,
    Dsv,
    AccelerationStructure,
}

/// Per-slot metadata, parallel to the raw Vulkan descriptor payload. A
/// `cookie` of 0 is reserved to mean "this slot holds the null payload for
/// `view_type`" (views allocate cookies starting at 1, see `view.rs`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorMetadataEntry {
    pub view_type: DescriptorViewType,
    pub cookie: u64,
}

impl DescriptorMetadataEntry {
    pub fn is_null(&self) -> bool {
        self.cookie == 0
    }

    fn null(view_type: DescriptorViewType) -> Self {
        DescriptorMetadataEntry { view_type, cookie: 0 }
    }
}

pub struct DescriptorHeapDesc {
    pub heap_type: HeapKind,
    pub num_descriptors: u32,
    pub shader_visible: bool,
}

/// Per-descriptor byte stride and total byte size of a descriptor buffer,
/// derived from `VkPhysicalDeviceDescriptorBufferPropertiesEXT`'s
/// `*DescriptorSize` and `descriptorBufferOffsetAlignment` (§4.5).
#[derive(Clone, Copy, Debug)]
pub struct DescriptorBufferLayout {
    pub total_size: u64,
    pub descriptor_stride: u64,
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Computes the per-slot stride (the raw descriptor size rounded up to
/// `descriptorBufferOffsetAlignment`) and the buffer's total byte size for a
/// heap with `num_descriptors` POT-rounded slots.
pub fn compute_descriptor_buffer_layout(
    num_descriptors: u32,
    descriptor_size: u64,
    offset_alignment: u64,
) -> DescriptorBufferLayout {
    let descriptor_stride = align_up(descriptor_size, offset_alignment);
    DescriptorBufferLayout {
        total_size: descriptor_stride * num_descriptors as u64,
        descriptor_stride,
    }
}

/// How many `VkDescriptorSet`s a pool-backed heap needs. Embedded-mutable
/// heaps need none (they write directly into a descriptor buffer); a mutable
/// descriptor type needs exactly one shared set; a non-mutable CBV_SRV_UAV
/// heap needs one set per descriptor category, since a non-mutable binding
/// can only ever hold the one `VkDescriptorType` it was allocated with.
pub fn descriptor_sets_needed(layout: HeapLayoutKind, heap_type: HeapKind) -> u32 {
    match layout {
        HeapLayoutKind::EmbeddedMutableDescriptorBuffer => 0,
        HeapLayoutKind::MutableSingleSet => 1,
        HeapLayoutKind::NonMutableMultiSet => match heap_type {
            HeapKind::CbvSrvUav => 3,
            HeapKind::Sampler | HeapKind::Rtv | HeapKind::Dsv => 1,
        },
    }
}

/// Which binding within a non-embedded heap's descriptor set(s) a given view
/// type is written through, for the `NonMutableMultiSet`/`MutableSingleSet`
/// layouts' `descriptor_sets_needed` scheme above.
pub fn binding_for_view_type(heap_type: HeapKind, view_type: DescriptorViewType) -> u32 {
    if heap_type != HeapKind::CbvSrvUav {
        return 0;
    }
    match view_type {
        DescriptorViewType::Cbv => 0,
        DescriptorViewType::SampledImage | DescriptorViewType::UniformTexelBuffer => 1,
        DescriptorViewType::StorageImage
        | DescriptorViewType::StorageTexelBuffer
        | DescriptorViewType::AccelerationStructure => 2,
        DescriptorViewType::Sampler | DescriptorViewType::Rtv | DescriptorViewType::Dsv => 0,
    }
}

/// The live Vulkan object(s) backing a heap's descriptor payloads, chosen by
/// [`HeapLayoutKind`] at creation.
pub enum DescriptorHeapBacking {
    DescriptorBuffer {
        vk_buffer: vk::Buffer,
        buffer_device_address: u64,
        layout: DescriptorBufferLayout,
    },
    DescriptorPool {
        vk_pool: vk::DescriptorPool,
    },
}

/// Where a single slot's real Vulkan descriptor payload should be written,
/// returned by [`DescriptorHeap::payload_write_target`] and consumed by the
/// `write_*` functions in `descriptor_writer.rs`.
pub enum PayloadWriteTarget {
    DescriptorBuffer {
        vk_buffer: vk::Buffer,
        buffer_device_address: u64,
        byte_offset: u64,
    },
    DescriptorSet {
        vk_pool: vk::DescriptorPool,
        heap_type: HeapKind,
        array_element: u32,
    },
}

/// A descriptor heap: the POT-rounded metadata array, the raw-VA aux buffer
/// (UAV counters / RTAS addresses), the layout chosen at creation, and the
/// real Vulkan object(s) that layout requires.
pub struct DescriptorHeap {
    pub desc: DescriptorHeapDesc,
    pub layout: HeapLayoutKind,
    pub capacity_pot: u32,
    backing: DescriptorHeapBacking,
    metadata: Vec<DescriptorMetadataEntry>,
    raw_va_aux: Vec<u64>,
}

fn default_null_view_type(kind: HeapKind) -> DescriptorViewType {
    match kind {
        // Mutable sets default their null payload to SAMPLED_IMAGE per §4.5.
        HeapKind::CbvSrvUav => DescriptorViewType::SampledImage,
        HeapKind::Sampler => DescriptorViewType::Sampler,
        HeapKind::Rtv => DescriptorViewType::Rtv,
        HeapKind::Dsv => DescriptorViewType::Dsv,
    }
}

impl DescriptorHeap {
    /// Creates the heap's CPU-side bookkeeping and its real Vulkan backing.
    /// `descriptor_size` and `descriptor_buffer_offset_alignment` are the
    /// device's `VkPhysicalDeviceDescriptorBufferPropertiesEXT` values for
    /// `desc.heap_type` (ignored unless `layout` is
    /// `EmbeddedMutableDescriptorBuffer`). `create_descriptor_buffer` runs
    /// only for that layout and returns the buffer plus its device address;
    /// `create_descriptor_pool` runs for the other two layouts and is handed
    /// the set count from [`descriptor_sets_needed`].
    pub fn create(
        desc: DescriptorHeapDesc,
        layout: HeapLayoutKind,
        descriptor_size: u64,
        descriptor_buffer_offset_alignment: u64,
        create_descriptor_buffer: impl FnOnce(u64) -> Result<(vk::Buffer, u64)>,
        create_descriptor_pool: impl FnOnce(u32) -> Result<vk::DescriptorPool>,
    ) -> Result<Self> {
        validate_shader_visible_heap_type(desc.heap_type, desc.shader_visible)?;
        let capacity_pot = desc.num_descriptors.max(1).next_power_of_two();
        let null_entry = DescriptorMetadataEntry::null(default_null_view_type(desc.heap_type));

        let backing = match layout {
            HeapLayoutKind::EmbeddedMutableDescriptorBuffer => {
                let buffer_layout =
                    compute_descriptor_buffer_layout(capacity_pot, descriptor_size, descriptor_buffer_offset_alignment);
                let (vk_buffer, buffer_device_address) = create_descriptor_buffer(buffer_layout.total_size)?;
                DescriptorHeapBacking::DescriptorBuffer { vk_buffer, buffer_device_address, layout: buffer_layout }
            }
            HeapLayoutKind::MutableSingleSet | HeapLayoutKind::NonMutableMultiSet => {
                let sets = descriptor_sets_needed(layout, desc.heap_type);
                let vk_pool = create_descriptor_pool(sets)?;
                DescriptorHeapBacking::DescriptorPool { vk_pool }
            }
        };

        Ok(DescriptorHeap {
            metadata: vec![null_entry; capacity_pot as usize],
            raw_va_aux: vec![0u64; capacity_pot as usize],
            capacity_pot,
            layout,
            desc,
            backing,
        })
    }

    /// Resolves where slot `slot_index`'s real Vulkan descriptor payload
    /// lives, for a `write_*` function in `descriptor_writer.rs` to write
    /// into.
    pub fn payload_write_target(&self, slot_index: u32) -> Result<PayloadWriteTarget> {
        self.check_index(slot_index)?;
        Ok(match &self.backing {
            DescriptorHeapBacking::DescriptorBuffer { vk_buffer, buffer_device_address, layout } => {
                PayloadWriteTarget::DescriptorBuffer {
                    vk_buffer: *vk_buffer,
                    buffer_device_address: *buffer_device_address,
                    byte_offset: slot_index as u64 * layout.descriptor_stride,
                }
            }
            DescriptorHeapBacking::DescriptorPool { vk_pool } => PayloadWriteTarget::DescriptorSet {
                vk_pool: *vk_pool,
                heap_type: self.desc.heap_type,
                array_element: slot_index,
            },
        })
    }

    pub fn num_descriptors(&self) -> u32 {
        self.desc.num_descriptors
    }

    fn check_index(&self, slot_index: u32) -> Result<()> {
        if slot_index >= self.desc.num_descriptors {
            Err(ValidationError::DescriptorIndexOutOfRange.into())
        } else {
            Ok(())
        }
    }

    pub fn metadata_at(&self, slot_index: u32) -> Result<DescriptorMetadataEntry> {
        self.check_index(slot_index)?;
        Ok(self.metadata[slot_index as usize])
    }

    pub fn raw_va_at(&self, slot_index: u32) -> Result<u64> {
        self.check_index(slot_index)?;
        Ok(self.raw_va_aux[slot_index as usize])
    }

    pub fn write_descriptor(&mut self, slot_index: u32, entry: DescriptorMetadataEntry, raw_va: u64) -> Result<()> {
        self.check_index(slot_index)?;
        self.metadata[slot_index as usize] = entry;
        self.raw_va_aux[slot_index as usize] = raw_va;
        Ok(())
    }

    /// `descriptor_heap_write_null_descriptor_template` (§4.5): fast-exits
    /// when the slot already holds the null payload of the same type.
    pub fn write_null_descriptor_template(&mut self, slot_index: u32, view_type: DescriptorViewType) -> Result<()> {
        self.check_index(slot_index)?;
        let idx = slot_index as usize;
        if self.metadata[idx].is_null() && self.metadata[idx].view_type == view_type {
            return Ok(());
        }
        self.metadata[idx] = DescriptorMetadataEntry::null(view_type);
        self.raw_va_aux[idx] = 0;
        Ok(())
    }
}

/// `CopyDescriptorsSimple` (§4.5). The embedded-mutable layout takes the
/// fast path: a single `memcpy`/non-temporal-store range covering `count`
/// contiguous descriptors, via `memcpy_descriptor_buffer_range`. Pool-backed
/// layouts fall back to `copy_descriptor_set_range`, modeling
/// `vkUpdateDescriptorSets` with `VkCopyDescriptorSet` entries. Either
/// closure only runs when both heaps share that backing kind; mismatched
/// backings (which the caller should never construct for a copy pair) still
/// get their CPU-side metadata mirrored below so lookups stay consistent.
pub fn copy_descriptors_simple(
    dst: &mut DescriptorHeap,
    dst_start: u32,
    src: &DescriptorHeap,
    src_start: u32,
    count: u32,
    memcpy_descriptor_buffer_range: impl FnOnce(vk::Buffer, u64, vk::Buffer, u64, u64),
    copy_descriptor_set_range: impl FnOnce(vk::DescriptorPool, u32, u32, vk::DescriptorPool, u32),
) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    let dst_in_range = matches!(dst_start.checked_add(count), Some(end) if end <= dst.desc.num_descriptors);
    let src_in_range = matches!(src_start.checked_add(count), Some(end) if end <= src.desc.num_descriptors);
    if !dst_in_range || !src_in_range {
        return Err(ValidationError::DescriptorIndexOutOfRange.into());
    }

    match (&dst.backing, &src.backing) {
        (
            DescriptorHeapBacking::DescriptorBuffer { vk_buffer: dst_buffer, layout: dst_layout, .. },
            DescriptorHeapBacking::DescriptorBuffer { vk_buffer: src_buffer, layout: src_layout, .. },
        ) => {
            let byte_count = count as u64 * dst_layout.descriptor_stride;
            let dst_offset = dst_start as u64 * dst_layout.descriptor_stride;
            let src_offset = src_start as u64 * src_layout.descriptor_stride;
            memcpy_descriptor_buffer_range(*dst_buffer, dst_offset, *src_buffer, src_offset, byte_count);
        }
        (
            DescriptorHeapBacking::DescriptorPool { vk_pool: dst_pool },
            DescriptorHeapBacking::DescriptorPool { vk_pool: src_pool },
        ) => {
            copy_descriptor_set_range(*dst_pool, dst_start, count, *src_pool, src_start);
        }
        _ => {}
    }

    for i in 0..count {
        let s = (src_start + i) as usize;
        let d = (dst_start + i) as usize;
        dst.metadata[d] = src.metadata[s];
        dst.raw_va_aux[d] = src.raw_va_aux[s];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap(num: u32, shader_visible: bool) -> DescriptorHeap {
        pool_backed_heap(num, shader_visible, HeapLayoutKind::MutableSingleSet)
    }

    fn pool_backed_heap(num: u32, shader_visible: bool, layout: HeapLayoutKind) -> DescriptorHeap {
        DescriptorHeap::create(
            DescriptorHeapDesc { heap_type: HeapKind::CbvSrvUav, num_descriptors: num, shader_visible },
            layout,
            32,
            64,
            |_| panic!("create_descriptor_buffer must not run for a pool-backed layout"),
            |_sets| Ok(vk::DescriptorPool::null()),
        )
        .unwrap()
    }

    fn descriptor_buffer_heap(num: u32, shader_visible: bool) -> DescriptorHeap {
        DescriptorHeap::create(
            DescriptorHeapDesc { heap_type: HeapKind::CbvSrvUav, num_descriptors: num, shader_visible },
            HeapLayoutKind::EmbeddedMutableDescriptorBuffer,
            32,
            64,
            |_total_size| Ok((vk::Buffer::null(), 0x1000_0000)),
            |_| panic!("create_descriptor_pool must not run for a descriptor-buffer layout"),
        )
        .unwrap()
    }

    #[test]
    fn non_embedded_handle_roundtrips_pointer_and_log2() {
        let base = 0x7f0000_1000u64; // 4 KiB aligned, low 5 bits free
        let handle = encode_cpu_handle_non_embedded(base, 1000);
        assert_eq!(decode_heap_pointer(handle), base);
        assert_eq!(decode_log2_capacity(handle), log2_ceil(1000));
    }

    #[test]
    fn log2_ceil_matches_expected_values() {
        assert_eq!(log2_ceil(1), 0);
        assert_eq!(log2_ceil(2), 1);
        assert_eq!(log2_ceil(3), 2);
        assert_eq!(log2_ceil(1024), 10);
        assert_eq!(log2_ceil(1025), 11);
    }

    #[test]
    fn embedded_handle_carries_shader_visible_and_metadata_offset() {
        let addr = 0x1000u64;
        let handle = encode_cpu_handle_embedded(addr, Some(3), true);
        assert_eq!(handle & EMBEDDED_SHADER_VISIBLE_BIT, 1);
        assert_eq!((handle >> 1) & LOG2_MASK, 3);
    }

    #[test]
    fn sampler_heap_cannot_be_shader_visible_if_disallowed_kind() {
        assert!(validate_shader_visible_heap_type(HeapKind::Rtv, true).is_err());
        assert!(validate_shader_visible_heap_type(HeapKind::Rtv, false).is_ok());
        assert!(validate_shader_visible_heap_type(HeapKind::Sampler, true).is_ok());
    }

    #[test]
    fn shader_visible_heap_too_large_is_rejected() {
        assert!(validate_heap_size(2_000_000, true, 1_000_000, 16).is_err());
        assert!(validate_heap_size(500, true, 1_000_000, 16).is_ok());
    }

    #[test]
    fn non_shader_visible_heap_respects_four_gib_cap() {
        let huge = (NON_SHADER_VISIBLE_HARD_CAP_BYTES / 16) as u32 + 1;
        let err = validate_heap_size(huge, false, 0, 16).unwrap_err();
        assert!(matches!(err, ApiError::OutOfMemory));
    }

    #[test]
    fn new_heap_slots_start_null() {
        let h = heap(4, false);
        let entry = h.metadata_at(0).unwrap();
        assert!(entry.is_null());
    }

    #[test]
    fn write_then_read_descriptor_roundtrips() {
        let mut h = heap(4, false);
        h.write_descriptor(
            1,
            DescriptorMetadataEntry { view_type: DescriptorViewType::Cbv, cookie: 42 },
            0xdead_beef,
        )
        .unwrap();
        let entry = h.metadata_at(1).unwrap();
        assert_eq!(entry.cookie, 42);
        assert_eq!(h.raw_va_at(1).unwrap(), 0xdead_beef);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let h = heap(4, false);
        assert!(h.metadata_at(4).is_err());
    }

    #[test]
    fn null_template_write_is_idempotent() {
        let mut h = heap(4, false);
        h.write_descriptor(
            0,
            DescriptorMetadataEntry { view_type: DescriptorViewType::Cbv, cookie: 7 },
            0,
        )
        .unwrap();
        h.write_null_descriptor_template(0, DescriptorViewType::Cbv).unwrap();
        let after_first = h.metadata_at(0).unwrap();
        h.write_null_descriptor_template(0, DescriptorViewType::Cbv).unwrap();
        let after_second = h.metadata_at(0).unwrap();
        assert_eq!(after_first, after_second);
        assert!(after_second.is_null());
    }

    #[test]
    fn copy_descriptors_simple_is_idempotent() {
        let mut src = heap(4, false);
        src.write_descriptor(
            0,
            DescriptorMetadataEntry { view_type: DescriptorViewType::Cbv, cookie: 9 },
            123,
        )
        .unwrap();
        let mut dst = heap(4, false);
        copy_descriptors_simple(&mut dst, 2, &src, 0, 1, |_, _, _, _, _| {}, |_, _, _, _, _| {}).unwrap();
        let first = dst.metadata_at(2).unwrap();
        copy_descriptors_simple(&mut dst, 2, &src, 0, 1, |_, _, _, _, _| {}, |_, _, _, _, _| {}).unwrap();
        let second = dst.metadata_at(2).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.cookie, 9);
        assert_eq!(dst.raw_va_at(2).unwrap(), 123);
    }

    #[test]
    fn copy_descriptors_out_of_range_is_rejected() {
        let src = heap(4, false);
        let mut dst = heap(4, false);
        assert!(copy_descriptors_simple(&mut dst, 3, &src, 0, 4, |_, _, _, _, _| {}, |_, _, _, _, _| {}).is_err());
    }

    #[test]
    fn copy_descriptors_on_pool_backed_heaps_invokes_set_copy_not_memcpy() {
        let mut src = pool_backed_heap(4, false, HeapLayoutKind::MutableSingleSet);
        src.write_descriptor(0, DescriptorMetadataEntry { view_type: DescriptorViewType::Cbv, cookie: 3 }, 0)
            .unwrap();
        let mut dst = pool_backed_heap(4, false, HeapLayoutKind::MutableSingleSet);

        let set_copy_calls = std::cell::Cell::new(0);
        let memcpy_calls = std::cell::Cell::new(0);
        copy_descriptors_simple(
            &mut dst,
            1,
            &src,
            0,
            1,
            |_, _, _, _, _| memcpy_calls.set(memcpy_calls.get() + 1),
            |_, dst_start, count, _, src_start| {
                set_copy_calls.set(set_copy_calls.get() + 1);
                assert_eq!(dst_start, 1);
                assert_eq!(count, 1);
                assert_eq!(src_start, 0);
            },
        )
        .unwrap();

        assert_eq!(set_copy_calls.get(), 1);
        assert_eq!(memcpy_calls.get(), 0);
        assert_eq!(dst.metadata_at(1).unwrap().cookie, 3);
    }

    #[test]
    fn copy_descriptors_on_descriptor_buffer_heaps_invokes_memcpy_not_set_copy() {
        let mut src = descriptor_buffer_heap(4, true);
        src.write_descriptor(0, DescriptorMetadataEntry { view_type: DescriptorViewType::Cbv, cookie: 5 }, 0)
            .unwrap();
        let mut dst = descriptor_buffer_heap(4, true);

        let set_copy_calls = std::cell::Cell::new(0);
        let memcpy_calls = std::cell::Cell::new(0);
        copy_descriptors_simple(
            &mut dst,
            2,
            &src,
            0,
            1,
            |_, dst_offset, _, src_offset, byte_count| {
                memcpy_calls.set(memcpy_calls.get() + 1);
                assert_eq!(dst_offset, 2 * 64);
                assert_eq!(src_offset, 0);
                assert_eq!(byte_count, 64);
            },
            |_, _, _, _, _| set_copy_calls.set(set_copy_calls.get() + 1),
        )
        .unwrap();

        assert_eq!(memcpy_calls.get(), 1);
        assert_eq!(set_copy_calls.get(), 0);
    }

    #[test]
    fn select_layout_prefers_descriptor_buffer_when_supported() {
        assert_eq!(select_layout(true, true), HeapLayoutKind::EmbeddedMutableDescriptorBuffer);
        assert_eq!(select_layout(false, true), HeapLayoutKind::MutableSingleSet);
        assert_eq!(select_layout(false, false), HeapLayoutKind::NonMutableMultiSet);
    }

    #[test]
    fn descriptor_buffer_layout_rounds_stride_up_to_offset_alignment() {
        let layout = compute_descriptor_buffer_layout(4, 32, 64);
        assert_eq!(layout.descriptor_stride, 64);
        assert_eq!(layout.total_size, 256);
    }

    #[test]
    fn descriptor_sets_needed_splits_non_mutable_cbv_srv_uav_into_three() {
        assert_eq!(descriptor_sets_needed(HeapLayoutKind::NonMutableMultiSet, HeapKind::CbvSrvUav), 3);
        assert_eq!(descriptor_sets_needed(HeapLayoutKind::MutableSingleSet, HeapKind::CbvSrvUav), 1);
        assert_eq!(descriptor_sets_needed(HeapLayoutKind::EmbeddedMutableDescriptorBuffer, HeapKind::CbvSrvUav), 0);
    }

    #[test]
    fn embedded_mutable_heap_creates_a_descriptor_buffer_not_a_pool() {
        let pool_created = std::cell::Cell::new(false);
        let buffer_created = std::cell::Cell::new(false);
        let h = DescriptorHeap::create(
            DescriptorHeapDesc { heap_type: HeapKind::CbvSrvUav, num_descriptors: 16, shader_visible: true },
            HeapLayoutKind::EmbeddedMutableDescriptorBuffer,
            32,
            64,
            |total_size| {
                buffer_created.set(true);
                assert_eq!(total_size, 64 * 16);
                Ok((vk::Buffer::null(), 0xABCD))
            },
            |_| {
                pool_created.set(true);
                Ok(vk::DescriptorPool::null())
            },
        )
        .unwrap();

        assert!(buffer_created.get());
        assert!(!pool_created.get());
        match h.payload_write_target(3).unwrap() {
            PayloadWriteTarget::DescriptorBuffer { byte_offset, buffer_device_address, .. } => {
                assert_eq!(byte_offset, 3 * 64);
                assert_eq!(buffer_device_address, 0xABCD);
            }
            _ => panic!("expected a descriptor-buffer write target"),
        }
    }

    #[test]
    fn pool_backed_heap_payload_target_carries_array_element() {
        let h = pool_backed_heap(8, false, HeapLayoutKind::MutableSingleSet);
        match h.payload_write_target(5).unwrap() {
            PayloadWriteTarget::DescriptorSet { array_element, heap_type, .. } => {
                assert_eq!(array_element, 5);
                assert_eq!(heap_type, HeapKind::CbvSrvUav);
            }
            _ => panic!("expected a descriptor-set write target"),
        }
    }
}
