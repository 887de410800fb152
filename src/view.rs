//! Reference-counted view handles and the per-resource view map that interns
//! them (spec §4.4). A view can outlive its creating descriptor through
//! sharing: `Arc<View>` clones are held by both the view map and any
//! descriptor heap slot currently pointing at it.

use ash::vk;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::hash_map::HashMap;
use crate::rw_spinlock::RwSpinlock;
use crate::view_key::ViewKey;

static NEXT_COOKIE: AtomicU64 = AtomicU64::new(1);

fn allocate_cookie() -> u64 {
    NEXT_COOKIE.fetch_add(1, Ordering::Relaxed)
}

/// Per-type payload for a `View`. Buffer views carry `(offset, size)`; image
/// views carry the full subresource range already baked into their
/// `ViewKey`, plus the live Vulkan object; samplers carry only the sampler
/// handle.
#[derive(Debug)]
pub enum ViewPayload {
    Buffer { vk_buffer_view: Option<vk::BufferView> },
    Image { vk_image_view: vk::ImageView },
    Sampler { vk_sampler: vk::Sampler },
    AccelerationStructure { vk_acceleration_structure: vk::AccelerationStructureKHR },
}

/// A single interned view. Shared ownership: the view map holds one `Arc`,
/// every descriptor slot that currently references it holds another.
#[derive(Debug)]
pub struct View {
    pub key: ViewKey,
    pub payload: ViewPayload,
    pub cookie: u64,
    pub debug_name: std::sync::Mutex<Option<String>>,
}

impl View {
    fn new(key: ViewKey, payload: ViewPayload) -> Arc<View> {
        Arc::new(View {
            key,
            payload,
            cookie: allocate_cookie(),
            debug_name: std::sync::Mutex::new(None),
        })
    }

    pub fn set_debug_name(&self, name: impl Into<String>) {
        *self.debug_name.lock().unwrap() = Some(name.into());
    }
}

/// Every `used_count` this many insertions, log a warning: buffer-view
/// objects are relatively expensive to create on some drivers, and a view
/// map growing past this without converging suggests a hot loop is creating
/// fresh view descriptors every frame instead of reusing cached ones.
const VIEW_MAP_WARN_INTERVAL: u32 = 1024;

/// A resource's interned `(ViewKey -> View)` map, guarded by a read/write
/// spinlock biased toward the read-dominant steady state described in §4.4.
///
/// The map itself lives behind an `UnsafeCell` rather than a `Mutex`: the
/// spinlock's read/write guards are the only thing gating access to it, so a
/// hit on the read path spins (if at all) only against a concurrent writer,
/// never against other concurrent readers. Stacking a `Mutex` on top would
/// have serialized every lookup on that mutex regardless of the spinlock's
/// state, defeating the read-dominant contract this type exists for.
pub struct ViewMap {
    lock: RwSpinlock,
    map: UnsafeCell<HashMap<ViewKey, Arc<View>>>,
    last_warned_at: std::sync::atomic::AtomicU32,
}

// SAFETY: every access to `map` holds either `lock.read()` or `lock.write()`
// for its entire duration, giving the same mutual-exclusion and
// happens-before guarantees a `Mutex<HashMap<..>>` would.
unsafe impl Sync for ViewMap {}

impl Default for ViewMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewMap {
    pub fn new() -> Self {
        ViewMap {
            lock: RwSpinlock::new(),
            map: UnsafeCell::new(HashMap::new()),
            last_warned_at: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Interns a view for `key`, calling `create` to build the underlying
    /// Vulkan object only on a cache miss. `create` always runs outside the
    /// lock, as required by §4.4 step 2 (long-running Vulkan calls must not
    /// stall concurrent readers).
    pub fn get_or_create(
        &self,
        key: ViewKey,
        create: impl FnOnce() -> ViewPayload,
    ) -> Arc<View> {
        // Step 1: read-path lookup. Concurrent readers never contend with
        // each other here, only with a writer holding the write guard.
        {
            let _read = self.lock.read();
            let map = unsafe { &*self.map.get() };
            if let Some(existing) = map.find(key.hash32(), |k| *k == key) {
                return existing.clone();
            }
        }

        // Step 2: create the Vulkan object outside any lock.
        let payload = create();
        let candidate = View::new(key, payload);

        // Step 3: insert under the write lock; a racing thread may have
        // already inserted an equivalent entry, in which case we drop our
        // candidate (its `Drop` impl, supplied by the caller's Vulkan
        // wrapper types, tears down the losing Vulkan object) and return the
        // winner instead.
        let (winner, used) = {
            let _write = self.lock.write();
            let map = unsafe { &mut *self.map.get() };
            let hash = key.hash32();
            let inserted = map.insert(
                hash,
                key,
                candidate.clone(),
                |k| *k == key,
            );
            (inserted.clone(), map.len())
        };

        if used > 0 && used % VIEW_MAP_WARN_INTERVAL == 0 {
            let last = self.last_warned_at.swap(used, Ordering::Relaxed);
            if last != used {
                log::warn!(
                    "view map has grown to {used} entries; repeated view creation on the hot \
                     path is expensive on some drivers, consider caching descriptors instead"
                );
            }
        }

        winner
    }

    pub fn len(&self) -> u32 {
        let _read = self.lock.read();
        unsafe { &*self.map.get() }.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
