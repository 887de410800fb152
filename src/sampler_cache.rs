//! Device-global sampler state cache (spec §2 item 8, §5). Samplers are
//! deduplicated into a single hash map guarded by one mutex; the same mutex
//! additionally lazily allocates pools of pre-allocated sampler descriptor
//! sets.

use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use parking_lot::Mutex;

use crate::hash_map::HashMap;
use crate::view_key::{SamplerAddressModes, ViewKey};

/// Size of each lazily-created sampler descriptor-set pool (§5).
pub const DESCRIPTORS_PER_POOL: u32 = 16384;
pub const SETS_PER_POOL: u32 = 4096;

static NEXT_SAMPLER_COOKIE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct CachedSampler {
    pub vk_sampler: vk::Sampler,
    pub cookie: u64,
}

/// One pre-allocated pool of sampler descriptor sets. New pools are created
/// lazily, on demand, as existing ones fill up.
#[derive(Debug, Default)]
pub struct SamplerDescriptorPool {
    pub vk_pool: vk::DescriptorPool,
    pub sets_allocated: u32,
}

impl SamplerDescriptorPool {
    fn has_capacity(&self) -> bool {
        self.sets_allocated < SETS_PER_POOL
    }
}

struct Inner {
    samplers: HashMap<ViewKey, CachedSampler>,
    pools: Vec<SamplerDescriptorPool>,
}

/// The device-global sampler cache, guarded by a single mutex per §5
/// ("Sampler state cache is guarded by a single mutex").
pub struct SamplerCache {
    inner: Mutex<Inner>,
}

impl Default for SamplerCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplerCache {
    pub fn new() -> Self {
        SamplerCache {
            inner: Mutex::new(Inner {
                samplers: HashMap::new(),
                pools: Vec::new(),
            }),
        }
    }

    /// Looks up or creates the sampler for `key`, calling `create` only on a
    /// miss. Unlike `ViewMap::get_or_create`, the whole operation runs under
    /// the single cache mutex (§5), since sampler objects are cheap and the
    /// cache is not expected to be a read-dominant hot path the way per-
    /// resource view maps are.
    pub fn get_or_create(
        &self,
        key: ViewKey,
        create: impl FnOnce() -> vk::Sampler,
    ) -> u64 {
        let mut inner = self.inner.lock();
        let hash = key.hash32();
        if let Some(existing) = inner.samplers.find(hash, |k| *k == key) {
            return existing.cookie;
        }
        let vk_sampler = create();
        let cookie = NEXT_SAMPLER_COOKIE.fetch_add(1, Ordering::Relaxed);
        let entry = CachedSampler { vk_sampler, cookie };
        let inserted = inner
            .samplers
            .insert(hash, key, entry, |k| *k == key);
        inserted.cookie
    }

    pub fn len(&self) -> u32 {
        self.inner.lock().samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocates a descriptor set from an existing pool with spare capacity,
    /// or creates a fresh pool (§5: "allocation of sampler descriptor sets
    /// lazily creates pools of 16384 descriptors / 4096 sets each"). Returns
    /// the index of the pool the set was allocated from.
    pub fn allocate_set_pool_index(&self, create_pool: impl FnOnce() -> vk::DescriptorPool) -> usize {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.pools.iter().position(SamplerDescriptorPool::has_capacity) {
            inner.pools[idx].sets_allocated += 1;
            return idx;
        }
        let vk_pool = create_pool();
        inner.pools.push(SamplerDescriptorPool { vk_pool, sets_allocated: 1 });
        inner.pools.len() - 1
    }

    pub fn pool_count(&self) -> usize {
        self.inner.lock().pools.len()
    }
}

pub fn sampler_key(
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
    ViewKey::sampler(
        mag_filter,
        min_filter,
        mipmap_mode,
        address_modes,
        mip_lod_bias,
        max_anisotropy,
        compare_enable,
        compare_op,
        min_lod,
        max_lod,
        border_color,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn modes() -> SamplerAddressModes {
        SamplerAddressModes {
            u: vk::SamplerAddressMode::REPEAT,
            v: vk::SamplerAddressMode::REPEAT,
            w: vk::SamplerAddressMode::REPEAT,
        }
    }

    #[test]
    fn identical_sampler_descriptions_dedup_to_the_same_cookie() {
        let cache = SamplerCache::new();
        let calls = AtomicUsize::new(0);
        let key = sampler_key(
            vk::Filter::LINEAR, vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR,
            modes(), 0.0, 1.0, false, vk::CompareOp::ALWAYS, 0.0, 1.0,
            vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        );
        let make = || {
            calls.fetch_add(1, Ordering::SeqCst);
            vk::Sampler::null()
        };

        let a = cache.get_or_create(key, make);
        let b = cache.get_or_create(key, make);
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn differing_filters_produce_distinct_samplers() {
        let cache = SamplerCache::new();
        let key_a = sampler_key(
            vk::Filter::LINEAR, vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR,
            modes(), 0.0, 1.0, false, vk::CompareOp::ALWAYS, 0.0, 1.0,
            vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        );
        let key_b = sampler_key(
            vk::Filter::NEAREST, vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST,
            modes(), 0.0, 1.0, false, vk::CompareOp::ALWAYS, 0.0, 1.0,
            vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        );
        let a = cache.get_or_create(key_a, vk::Sampler::null);
        let b = cache.get_or_create(key_b, vk::Sampler::null);
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn set_allocation_reuses_pools_until_full_then_creates_new() {
        let cache = SamplerCache::new();
        let created = AtomicUsize::new(0);
        for _ in 0..SETS_PER_POOL {
            cache.allocate_set_pool_index(|| {
                created.fetch_add(1, Ordering::SeqCst);
                vk::DescriptorPool::null()
            });
        }
        assert_eq!(cache.pool_count(), 1);
        cache.allocate_set_pool_index(|| {
            created.fetch_add(1, Ordering::SeqCst);
            vk::DescriptorPool::null()
        });
        assert_eq!(cache.pool_count(), 2);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }
}
