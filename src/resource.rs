//! Resource creation and validation (spec §3, §4.3): the committed/placed/
//! reserved entry points, the shared validation rules every path runs
//! through, format-compatibility-list construction, common-layout selection
//! and the sparse tile-layout table.

use ash::vk;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::{ApiError, Result, ValidationError};
use crate::format::{self, DxgiFormat, FormatInfo};
use crate::view::ViewMap;

bitflags::bitflags! {
    #[derive(Default)]
    pub struct ResourceFlags: u32 {
        const ALLOW_RENDER_TARGET      = 1 << 0;
        const ALLOW_DEPTH_STENCIL      = 1 << 1;
        const ALLOW_UNORDERED_ACCESS   = 1 << 2;
        const DENY_SHADER_RESOURCE     = 1 << 3;
        const ALLOW_CROSS_ADAPTER      = 1 << 4;
        const ALLOW_SIMULTANEOUS_ACCESS = 1 << 5;
        const VIDEO_DECODE_REFERENCE_ONLY = 1 << 6;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dimension {
    Buffer,
    Texture1D,
    Texture2D,
    Texture3D,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureLayout {
    RowMajor,
    Tiled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapType {
    Default,
    Upload,
    Readback,
    Custom,
}

/// State bits relevant to the validation rules this module enforces. This is
/// not the full D3D12 resource-state enum, only the handful of states the
/// creation path needs to reason about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitialState {
    Common,
    GenericRead,
    CopyDest,
    RenderTarget,
    DepthWrite,
    UnorderedAccess,
}

#[derive(Clone, Debug)]
pub struct ResourceDesc {
    pub dimension: Dimension,
    pub width: u64,
    pub height: u32,
    pub depth_or_array_size: u16,
    pub mip_levels: u16,
    pub format: DxgiFormat,
    pub sample_count: u32,
    pub layout: TextureLayout,
    pub flags: ResourceFlags,
    pub heap_type: HeapType,
    pub alignment: u64,
    pub castable_formats: Vec<DxgiFormat>,
    pub sampler_feedback_mip_region: Option<(u32, u32)>,
}

impl ResourceDesc {
    fn is_buffer(&self) -> bool {
        self.dimension == Dimension::Buffer
    }
}

/// Runs the validation rules common to every creation path (§4.3 "Shared
/// validation"). Returns the resolved [`FormatInfo`] for the base format on
/// success, since most callers need it immediately afterward.
pub fn validate_shared(desc: &ResourceDesc, device_supports_msaa: bool) -> Result<&'static FormatInfo> {
    validate_buffer_is_trivial(desc)?;
    validate_simultaneous_access(desc)?;
    validate_row_major_layout(desc)?;
    validate_msaa(desc, device_supports_msaa)?;
    validate_alignment(desc)?;
    if let Some(region) = desc.sampler_feedback_mip_region {
        validate_sampler_feedback(desc, region)?;
    }

    let base = format::lookup(desc.format);
    validate_castable_formats(base, &desc.castable_formats)?;
    Ok(base)
}

fn validate_buffer_is_trivial(desc: &ResourceDesc) -> Result<()> {
    if !desc.is_buffer() {
        return Ok(());
    }
    if desc.height != 1
        || desc.depth_or_array_size != 1
        || desc.mip_levels != 1
        || desc.format != DxgiFormat::UNKNOWN
        || desc.layout != TextureLayout::RowMajor
    {
        return Err(ValidationError::BufferDescriptionMustBeTrivial.into());
    }
    Ok(())
}

fn validate_simultaneous_access(desc: &ResourceDesc) -> Result<()> {
    let simultaneous = desc.flags.contains(ResourceFlags::ALLOW_SIMULTANEOUS_ACCESS);
    if !simultaneous {
        return Ok(());
    }
    if desc.is_buffer() || desc.flags.contains(ResourceFlags::ALLOW_DEPTH_STENCIL) {
        return Err(ValidationError::SimultaneousAccessIncompatible.into());
    }
    Ok(())
}

fn validate_row_major_layout(desc: &ResourceDesc) -> Result<()> {
    if desc.is_buffer() || desc.layout != TextureLayout::RowMajor {
        return Ok(());
    }
    let single_subresource = desc.mip_levels == 1 && desc.depth_or_array_size == 1;
    let cpu_visible_custom_heap = desc.heap_type == HeapType::Custom;
    if desc.dimension != Dimension::Texture2D
        || !desc.flags.contains(ResourceFlags::ALLOW_CROSS_ADAPTER)
        || !single_subresource
        || cpu_visible_custom_heap
    {
        return Err(ValidationError::RowMajorLayoutRestricted.into());
    }
    Ok(())
}

fn validate_msaa(desc: &ResourceDesc, device_supports_msaa_uav: bool) -> Result<()> {
    if desc.sample_count <= 1 {
        return Ok(());
    }
    let rt_or_ds = desc
        .flags
        .intersects(ResourceFlags::ALLOW_RENDER_TARGET | ResourceFlags::ALLOW_DEPTH_STENCIL);
    if !rt_or_ds {
        return Err(ValidationError::MsaaRequiresRenderTargetOrDepthStencil.into());
    }
    if desc.flags.contains(ResourceFlags::ALLOW_UNORDERED_ACCESS) && !device_supports_msaa_uav {
        return Err(ValidationError::MsaaUavUnsupported.into());
    }
    Ok(())
}

const KIB_4: u64 = 4 * 1024;
const KIB_64: u64 = 64 * 1024;
const MIB_4: u64 = 4 * 1024 * 1024;

fn validate_alignment(desc: &ResourceDesc) -> Result<()> {
    if desc.alignment == 0 || desc.alignment == KIB_64 || desc.alignment == MIB_4 {
        return Ok(());
    }
    if desc.alignment != KIB_4 {
        return Err(ValidationError::AlignmentNotPermitted.into());
    }
    let estimated_slice_size = estimate_subresource_size(desc);
    if estimated_slice_size > KIB_4 {
        return Err(ValidationError::SmallAlignmentTooSmall.into());
    }
    Ok(())
}

fn estimate_subresource_size(desc: &ResourceDesc) -> u64 {
    if desc.is_buffer() {
        return desc.width;
    }
    let info = format::lookup(desc.format);
    let blocks_wide = (desc.width as u32).div_ceil(info.block_width) as u64;
    let blocks_high = desc.height.div_ceil(info.block_height) as u64;
    blocks_wide * blocks_high * info.byte_count as u64
}

fn is_power_of_two(v: u32) -> bool {
    v != 0 && (v & (v - 1)) == 0
}

fn validate_sampler_feedback(desc: &ResourceDesc, (region_w, region_h): (u32, u32)) -> Result<()> {
    if desc.dimension != Dimension::Texture2D {
        return Err(ValidationError::SamplerFeedbackDimensionInvalid.into());
    }
    if desc
        .flags
        .intersects(ResourceFlags::ALLOW_RENDER_TARGET | ResourceFlags::ALLOW_DEPTH_STENCIL)
    {
        return Err(ValidationError::SamplerFeedbackRtvDsvUnsupported.into());
    }
    let half_w = (desc.width as u32) / 2;
    let half_h = desc.height / 2;
    if region_w < 4
        || region_h < 4
        || !is_power_of_two(region_w)
        || !is_power_of_two(region_h)
        || region_w > half_w.max(4)
        || region_h > half_h.max(4)
    {
        return Err(ValidationError::SamplerFeedbackRegionInvalid.into());
    }
    Ok(())
}

fn validate_castable_formats(base: &FormatInfo, castable: &[DxgiFormat]) -> Result<()> {
    for &candidate in castable {
        let info = format::lookup(candidate);
        if !format::is_castable_compatible(base, info) {
            return Err(ValidationError::CastableFormatIncompatible.into());
        }
    }
    Ok(())
}

/// Validates that `state` is consistent with the declared flags and heap
/// type (§4.3 rule 3).
pub fn validate_initial_state(desc: &ResourceDesc, state: InitialState) -> Result<()> {
    match desc.heap_type {
        HeapType::Upload => {
            if !matches!(state, InitialState::GenericRead | InitialState::Common) {
                return Err(ValidationError::UploadHeapStateInvalid.into());
            }
        }
        HeapType::Readback => {
            if !matches!(state, InitialState::CopyDest | InitialState::Common) {
                return Err(ValidationError::ReadbackHeapStateInvalid.into());
            }
        }
        HeapType::Default | HeapType::Custom => {}
    }

    let flag_requires = match state {
        InitialState::RenderTarget => Some(ResourceFlags::ALLOW_RENDER_TARGET),
        InitialState::DepthWrite => Some(ResourceFlags::ALLOW_DEPTH_STENCIL),
        InitialState::UnorderedAccess => Some(ResourceFlags::ALLOW_UNORDERED_ACCESS),
        _ => None,
    };
    if let Some(required) = flag_requires {
        if !desc.flags.contains(required) {
            return Err(ValidationError::InitialStateInconsistentWithFlags.into());
        }
    }
    Ok(())
}

/// Which heap deny-flags exclude which resource category (§4.3 "Placed"
/// validation).
bitflags::bitflags! {
    #[derive(Default)]
    pub struct HeapDenyFlags: u32 {
        const DENY_BUFFERS        = 1 << 0;
        const DENY_NON_RT_DS_TEXTURES = 1 << 1;
        const DENY_RT_DS_TEXTURES = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceCategory {
    Buffer,
    NonRtDsTexture,
    RtDsTexture,
}

pub fn resource_category(desc: &ResourceDesc) -> ResourceCategory {
    if desc.is_buffer() {
        return ResourceCategory::Buffer;
    }
    if desc
        .flags
        .intersects(ResourceFlags::ALLOW_RENDER_TARGET | ResourceFlags::ALLOW_DEPTH_STENCIL)
    {
        ResourceCategory::RtDsTexture
    } else {
        ResourceCategory::NonRtDsTexture
    }
}

pub fn validate_heap_allows_category(deny: HeapDenyFlags, category: ResourceCategory) -> Result<()> {
    let denied = match category {
        ResourceCategory::Buffer => deny.contains(HeapDenyFlags::DENY_BUFFERS),
        ResourceCategory::NonRtDsTexture => deny.contains(HeapDenyFlags::DENY_NON_RT_DS_TEXTURES),
        ResourceCategory::RtDsTexture => deny.contains(HeapDenyFlags::DENY_RT_DS_TEXTURES),
    };
    if denied {
        Err(ValidationError::HeapDeniesResourceCategory.into())
    } else {
        Ok(())
    }
}

pub fn validate_placed_offset(heap_offset: u64, vulkan_alignment: u64) -> Result<()> {
    if heap_offset % vulkan_alignment != 0 {
        Err(ValidationError::PlacedOffsetMisaligned.into())
    } else {
        Ok(())
    }
}

/// Format-compatibility-list construction (§4.3). `device_supports_64bit_atomics`
/// models the device-capability check for the `R64_UINT` addition.
pub fn build_format_compatibility_list(
    base: &FormatInfo,
    castable: &[DxgiFormat],
    uav_requested: bool,
    device_supports_64bit_atomics: bool,
) -> FormatCompatibilityList {
    const MAX_FORMATS: usize = 8;
    let mut formats: smallvec::SmallVec<[vk::Format; 8]> = smallvec::smallvec![base.vk_format];

    for &candidate in castable {
        let info = format::lookup(candidate);
        if info.typeless {
            continue;
        }
        formats.push(info.vk_format);
    }

    let is_32bit_typeless = base.typeless && base.byte_count == 4;
    if uav_requested && is_32bit_typeless {
        formats.push(vk::Format::R32_UINT);
        formats.push(vk::Format::R32_SINT);
        formats.push(vk::Format::R32_SFLOAT);
    }

    if device_supports_64bit_atomics && formats.contains(&vk::Format::R32G32_UINT) {
        formats.push(vk::Format::R64_UINT);
    }

    if formats.len() > MAX_FORMATS {
        return FormatCompatibilityList {
            formats: vec![base.vk_format],
            mutable: true,
            block_texel_view_compatible: false,
        };
    }

    let mutable = formats.len() > 1;
    let block_texel_view_compatible = mutable
        && base.is_block_compressed()
        && castable
            .iter()
            .any(|&c| !format::lookup(c).is_block_compressed());

    FormatCompatibilityList {
        formats: formats.into_vec(),
        mutable,
        block_texel_view_compatible,
    }
}

#[derive(Clone, Debug)]
pub struct FormatCompatibilityList {
    pub formats: Vec<vk::Format>,
    pub mutable: bool,
    pub block_texel_view_compatible: bool,
}

/// The policy governing which image layout a resource sits in outside of
/// explicit render-pass/decompress events (§4.3 "Common image layout
/// selection"). `prefer_general_for_depth_stencil` models the vendor-policy
/// knob called out in the Non-goals (driver workarounds are tunable, not
/// hardcoded).
pub fn select_common_layout(
    desc: &ResourceDesc,
    prefer_general_for_depth_stencil: bool,
) -> vk::ImageLayout {
    let is_dsv = desc.flags.contains(ResourceFlags::ALLOW_DEPTH_STENCIL);
    if desc.flags.contains(ResourceFlags::ALLOW_SIMULTANEOUS_ACCESS)
        || desc.layout == TextureLayout::RowMajor
        || (is_dsv && prefer_general_for_depth_stencil)
    {
        return vk::ImageLayout::GENERAL;
    }
    if is_dsv && desc.flags.contains(ResourceFlags::DENY_SHADER_RESOURCE) {
        return vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
    }
    if is_dsv {
        return vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL;
    }
    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
}

/// Allocation padding policy (§4.3): when the Vulkan-required alignment
/// exceeds what the application requested, pad the reported size and lower
/// the reported alignment to match D3D12 expectations.
pub struct AllocationSizing {
    pub reported_size: u64,
    pub reported_alignment: u64,
}

pub fn apply_allocation_padding(
    requested_size: u64,
    requested_alignment: u64,
    vulkan_required_alignment: u64,
    reject_on_mismatch: bool,
) -> Result<AllocationSizing> {
    if vulkan_required_alignment <= requested_alignment {
        return Ok(AllocationSizing {
            reported_size: requested_size,
            reported_alignment: requested_alignment,
        });
    }
    if reject_on_mismatch {
        return Err(ValidationError::AlignmentNotPermitted.into());
    }
    let pad = vulkan_required_alignment - requested_alignment;
    Ok(AllocationSizing {
        reported_size: requested_size + pad,
        reported_alignment: requested_alignment,
    })
}

/// 25-row tile-extent table keyed by `(sample_count_log2, byte_count_log2)`,
/// giving `(tile_width, tile_height, tile_depth)` in texels for a standard
/// (non-packed) mip tile. Values mirror the D3D12/Vulkan sparse-residency
/// tile-shape table for color formats.
const TILE_SHAPE_TABLE: [[(u32, u32, u32); 5]; 5] = [
    // byte_count_log2 = 0 (1 byte)
    [(256, 256, 1), (256, 128, 1), (128, 128, 1), (128, 64, 1), (64, 64, 1)],
    // byte_count_log2 = 1 (2 bytes)
    [(256, 128, 1), (128, 128, 1), (128, 64, 1), (64, 64, 1), (64, 32, 1)],
    // byte_count_log2 = 2 (4 bytes)
    [(128, 128, 1), (128, 64, 1), (64, 64, 1), (64, 32, 1), (32, 32, 1)],
    // byte_count_log2 = 3 (8 bytes)
    [(128, 64, 1), (64, 64, 1), (64, 32, 1), (32, 32, 1), (32, 16, 1)],
    // byte_count_log2 = 4 (16 bytes)
    [(64, 64, 1), (64, 32, 1), (32, 32, 1), (32, 16, 1), (16, 16, 1)],
];

/// Tile shape for a buffer: always one tile per 64 KiB (§4.3 "Sparse tile
/// layout").
pub const BUFFER_TILE_BYTES: u64 = KIB_64;

/// Computes the standard-mip tile extent for an image from its sample count
/// and format byte size. Per an open design decision recorded alongside this
/// function, the returned shape is never all-zero even when the resource has
/// no standard mips, matching observed driver behavior rather than the
/// on-paper spec.
pub fn compute_tile_shape(sample_count: u32, byte_count: u32) -> (u32, u32, u32) {
    let sample_log2 = sample_count.max(1).trailing_zeros().min(4) as usize;
    let byte_log2 = byte_count.max(1).next_power_of_two().trailing_zeros().min(4) as usize;
    TILE_SHAPE_TABLE[byte_log2][sample_log2]
}

/// Resource reference counting (§3 "Lifecycle"): public refcount gates
/// view-map/user-visible teardown, internal refcount gates the underlying
/// Vulkan objects and allocation.
#[derive(Debug, Default)]
pub struct RefCounts {
    public: AtomicU32,
    internal: AtomicU32,
}

impl RefCounts {
    pub fn new() -> Self {
        RefCounts {
            public: AtomicU32::new(1),
            internal: AtomicU32::new(1),
        }
    }

    pub fn add_public_ref(&self) -> u32 {
        self.public.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn release_public_ref(&self) -> u32 {
        self.public.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn add_internal_ref(&self) -> u32 {
        self.internal.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn release_internal_ref(&self) -> u32 {
        self.internal.fetch_sub(1, Ordering::AcqRel) - 1
    }
}

/// Either the buffer or image backing a [`Resource`].
pub enum Backing {
    Buffer { vk_buffer: vk::Buffer, gpu_virtual_address: u64 },
    Image { vk_image: vk::Image, common_layout: vk::ImageLayout, format_list: FormatCompatibilityList },
}

/// Sparse (reserved) resource tiling metadata (§3).
#[derive(Debug, Default, Clone)]
pub struct SparseInfo {
    pub tile_shape: (u32, u32, u32),
    pub per_subresource_tile_counts: Vec<u32>,
    pub packed_mip_tile_count: u32,
    pub initial_bind_timeline_value: u64,
}

/// A created resource: owns its Vulkan backing, refcounts, and view map.
pub struct Resource {
    pub desc: ResourceDesc,
    pub backing: Backing,
    pub refcounts: RefCounts,
    pub view_map: ViewMap,
    pub sparse: Option<SparseInfo>,
    /// Cleared once the first layout transition has been emitted. Some
    /// placed RT/DSV resources intentionally never clear this (see
    /// `skip_initial_layout_transition`).
    pub initial_layout_transition_pending: std::sync::atomic::AtomicBool,
    pub private_store: Mutex<std::collections::HashMap<u128, Vec<u8>>>,
}

impl Resource {
    /// Placed RT/DSV resources skip the initial layout transition unless a
    /// diagnostic flag forces it, because clearing the compressed metadata
    /// of one aliased resource could clobber another (§4.3 "Placed").
    pub fn skip_initial_layout_transition(desc: &ResourceDesc, is_placed: bool, force_transition: bool) -> bool {
        is_placed
            && !force_transition
            && desc
                .flags
                .intersects(ResourceFlags::ALLOW_RENDER_TARGET | ResourceFlags::ALLOW_DEPTH_STENCIL)
    }

    fn new(desc: ResourceDesc, backing: Backing, sparse: Option<SparseInfo>) -> Resource {
        Resource {
            desc,
            backing,
            refcounts: RefCounts::new(),
            view_map: ViewMap::new(),
            sparse,
            initial_layout_transition_pending: std::sync::atomic::AtomicBool::new(true),
            private_store: Mutex::new(std::collections::HashMap::new()),
        }
    }
}

/// The live Vulkan object underlying a resource, before it's wrapped in a
/// [`Backing`] with its resolved common layout and format-compatibility
/// list. Produced by the caller's `create_backing` closure so this module
/// never touches `ash::Device` directly.
pub enum RawBacking {
    Buffer(vk::Buffer),
    Image(vk::Image),
}

/// Mirrors the fields of `VkMemoryRequirements` this module's allocation
/// math actually needs.
#[derive(Clone, Copy, Debug)]
pub struct MemoryRequirements {
    pub size: u64,
    pub alignment: u64,
    pub memory_type_bits: u32,
}

impl MemoryRequirements {
    /// Implements the VRS double-query-and-max rule (§4.3 "Committed"):
    /// textures that qualify for implicit variable-rate-shading usage must
    /// have their memory requirements queried both with and without that
    /// usage bit, keeping the larger size and alignment of the two so the
    /// allocation is valid either way the driver interprets it.
    fn max(self, other: MemoryRequirements) -> MemoryRequirements {
        MemoryRequirements {
            size: self.size.max(other.size),
            alignment: self.alignment.max(other.alignment),
            memory_type_bits: self.memory_type_bits & other.memory_type_bits,
        }
    }
}

/// Mirrors `VkSparseImageMemoryRequirements`/`VkMemoryRequirements` for the
/// optional metadata-aspect allocation a sparse resource may need.
#[derive(Clone, Copy, Debug, Default)]
pub struct SparseMemoryRequirements {
    pub metadata_size: u64,
    pub metadata_alignment: u64,
    pub packed_mip_tile_count: u32,
}

fn finish_backing(
    desc: &ResourceDesc,
    base: &'static FormatInfo,
    raw: RawBacking,
    gpu_virtual_address: u64,
    device_supports_64bit_atomics: bool,
    prefer_general_for_depth_stencil: bool,
) -> Backing {
    match raw {
        RawBacking::Buffer(vk_buffer) => Backing::Buffer { vk_buffer, gpu_virtual_address },
        RawBacking::Image(vk_image) => {
            let uav_requested = desc.flags.contains(ResourceFlags::ALLOW_UNORDERED_ACCESS);
            let format_list = build_format_compatibility_list(
                base,
                &desc.castable_formats,
                uav_requested,
                device_supports_64bit_atomics,
            );
            let common_layout = select_common_layout(desc, prefer_general_for_depth_stencil);
            Backing::Image { vk_image, common_layout, format_list }
        }
    }
}

fn sparse_tile_shape(desc: &ResourceDesc, base: &FormatInfo) -> (u32, u32, u32) {
    if desc.is_buffer() {
        // Buffers tile uniformly at 64 KiB; model that as a 1-D tile extent
        // in bytes so `per_subresource_tile_counts` stays a simple division.
        (BUFFER_TILE_BYTES as u32, 1, 1)
    } else {
        compute_tile_shape(desc.sample_count, base.byte_count)
    }
}

fn compute_subresource_tile_counts(desc: &ResourceDesc, tile_shape: (u32, u32, u32)) -> Vec<u32> {
    if desc.is_buffer() {
        let tile_count = desc.width.div_ceil(BUFFER_TILE_BYTES).max(1) as u32;
        return vec![tile_count];
    }

    let (tile_w, tile_h, tile_d) = tile_shape;
    let mut counts = Vec::with_capacity(desc.mip_levels as usize * desc.depth_or_array_size as usize);
    for _layer in 0..desc.depth_or_array_size {
        for mip in 0..desc.mip_levels {
            let mip_width = (desc.width >> (mip as u32)).max(1) as u32;
            let mip_height = (desc.height >> (mip as u32)).max(1);
            let mip_depth = if desc.dimension == Dimension::Texture3D {
                (desc.depth_or_array_size as u32 >> (mip as u32)).max(1)
            } else {
                1
            };
            let tiles = mip_width.div_ceil(tile_w) * mip_height.div_ceil(tile_h) * mip_depth.div_ceil(tile_d);
            counts.push(tiles);
        }
    }
    counts
}

/// Creates a committed resource: a dedicated allocation sized and bound to
/// exactly this one resource (§4.3 "Committed"). `create_backing` constructs
/// the raw `VkBuffer`/`VkImage`; `query_memory_requirements` reports the
/// driver's memory requirements, invoked a second time with `true` only when
/// `qualifies_for_implicit_vrs` holds, per the VRS double-query-and-max rule;
/// `allocate_and_bind_memory` performs the actual `vkAllocateMemory` and
/// `vkBind*Memory` and returns the resource's GPU virtual address (0 for
/// images, which carry no linear address).
#[allow(clippy::too_many_arguments)]
pub fn create_committed(
    desc: ResourceDesc,
    initial_state: InitialState,
    device_supports_msaa_uav: bool,
    device_supports_64bit_atomics: bool,
    prefer_general_for_depth_stencil: bool,
    qualifies_for_implicit_vrs: bool,
    create_backing: impl FnOnce() -> Result<RawBacking>,
    query_memory_requirements: impl Fn(bool) -> Result<MemoryRequirements>,
    allocate_and_bind_memory: impl FnOnce(MemoryRequirements) -> Result<u64>,
) -> Result<Resource> {
    let base = validate_shared(&desc, device_supports_msaa_uav)?;
    validate_initial_state(&desc, initial_state)?;

    let raw = create_backing()?;

    let wants_vrs_requery = qualifies_for_implicit_vrs && matches!(raw, RawBacking::Image(_));
    let requirements = if wants_vrs_requery {
        let with_vrs = query_memory_requirements(true)?;
        let without_vrs = query_memory_requirements(false)?;
        with_vrs.max(without_vrs)
    } else {
        query_memory_requirements(false)?
    };

    let gpu_virtual_address = allocate_and_bind_memory(requirements)?;
    let backing = finish_backing(
        &desc,
        base,
        raw,
        gpu_virtual_address,
        device_supports_64bit_atomics,
        prefer_general_for_depth_stencil,
    );
    Ok(Resource::new(desc, backing, None))
}

/// Creates a placed resource: bound at `heap_offset` into a caller-supplied
/// heap, sharing that heap's backing memory with other resources (§4.3
/// "Placed"). `bind_at_offset` performs the actual `vkBind*Memory` call and
/// returns the resource's GPU virtual address (0 for images).
#[allow(clippy::too_many_arguments)]
pub fn create_placed(
    desc: ResourceDesc,
    initial_state: InitialState,
    device_supports_msaa_uav: bool,
    device_supports_64bit_atomics: bool,
    prefer_general_for_depth_stencil: bool,
    heap_deny_flags: HeapDenyFlags,
    heap_offset: u64,
    force_initial_transition: bool,
    create_backing: impl FnOnce() -> Result<RawBacking>,
    query_memory_requirements: impl FnOnce(&RawBacking) -> Result<MemoryRequirements>,
    bind_at_offset: impl FnOnce(&RawBacking, u64) -> Result<u64>,
) -> Result<Resource> {
    let base = validate_shared(&desc, device_supports_msaa_uav)?;
    validate_initial_state(&desc, initial_state)?;
    validate_heap_allows_category(heap_deny_flags, resource_category(&desc))?;

    let raw = create_backing()?;
    let requirements = query_memory_requirements(&raw)?;
    validate_placed_offset(heap_offset, requirements.alignment)?;

    let gpu_virtual_address = bind_at_offset(&raw, heap_offset)?;
    let skip_transition = Resource::skip_initial_layout_transition(&desc, true, force_initial_transition);
    let backing = finish_backing(
        &desc,
        base,
        raw,
        gpu_virtual_address,
        device_supports_64bit_atomics,
        prefer_general_for_depth_stencil,
    );
    let resource = Resource::new(desc, backing, None);
    if skip_transition {
        resource.initial_layout_transition_pending.store(false, Ordering::Relaxed);
    }
    Ok(resource)
}

/// Creates a reserved (sparse) resource: a sparse-binding buffer or image
/// with no memory bound at creation time, tiles mapped in later through
/// `UpdateTileMappings` (§4.3 "Reserved"). `submit_initial_unbind` records
/// the "unbind everything" sparse bind required before the application can
/// read tile-mapping state; per the failure semantics in §4.3, a failure
/// here does not fail creation, it only leaves the resource's tiles in an
/// undefined mapping state and is logged.
pub fn create_reserved(
    desc: ResourceDesc,
    initial_state: InitialState,
    device_supports_msaa_uav: bool,
    device_supports_64bit_atomics: bool,
    prefer_general_for_depth_stencil: bool,
    create_sparse_backing: impl FnOnce() -> Result<RawBacking>,
    query_sparse_memory_requirements: impl FnOnce(&RawBacking) -> Result<SparseMemoryRequirements>,
    allocate_metadata_memory: impl FnOnce(SparseMemoryRequirements) -> Result<()>,
    submit_initial_unbind: impl FnOnce(&RawBacking) -> std::result::Result<u64, ApiError>,
) -> Result<Resource> {
    let base = validate_shared(&desc, device_supports_msaa_uav)?;
    validate_initial_state(&desc, initial_state)?;

    let raw = create_sparse_backing()?;
    let sparse_reqs = query_sparse_memory_requirements(&raw)?;
    if sparse_reqs.metadata_size > 0 {
        allocate_metadata_memory(sparse_reqs)?;
    }

    let tile_shape = sparse_tile_shape(&desc, base);
    let per_subresource_tile_counts = compute_subresource_tile_counts(&desc, tile_shape);

    let initial_bind_timeline_value = match submit_initial_unbind(&raw) {
        Ok(value) => value,
        Err(err) => {
            log::warn!(
                "initial sparse unbind failed ({err}); resource tiles start in an undefined mapping \
                 state until the application maps them explicitly"
            );
            0
        }
    };

    let sparse = SparseInfo {
        tile_shape,
        per_subresource_tile_counts,
        packed_mip_tile_count: sparse_reqs.packed_mip_tile_count,
        initial_bind_timeline_value,
    };
    let backing = finish_backing(
        &desc,
        base,
        raw,
        0,
        device_supports_64bit_atomics,
        prefer_general_for_depth_stencil,
    );
    Ok(Resource::new(desc, backing, Some(sparse)))
}
