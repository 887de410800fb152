//! Physical-device memory topology introspection (spec §2 item 10, §5).
//! Classifies heaps as UMA vs discrete and tracks a shared ReBAR budget
//! across the memory types that alias the host-visible device-local heap.

use std::sync::Mutex;

use ash::vk;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryTopology {
    /// No heap is both `DEVICE_LOCAL` and `HOST_VISIBLE`: a conventional
    /// discrete GPU, or an integrated GPU the driver doesn't report as UMA.
    Discrete,
    /// At least one heap is both `DEVICE_LOCAL` and `HOST_VISIBLE` across
    /// its entire size: integrated/unified memory.
    UnifiedMemory,
    /// Discrete topology with a resizable BAR: a bounded `DEVICE_LOCAL |
    /// HOST_VISIBLE` heap coexists with a larger device-local-only heap.
    ResizableBar,
}

#[derive(Clone, Copy, Debug)]
pub struct MemoryTypeInfo {
    pub index: u32,
    pub heap_index: u32,
    pub property_flags: vk::MemoryPropertyFlags,
}

#[derive(Clone, Copy, Debug)]
pub struct MemoryHeapInfo {
    pub index: u32,
    pub size: u64,
    pub device_local: bool,
}

/// Classifies the device's memory topology from its raw
/// `VkPhysicalDeviceMemoryProperties`-equivalent type/heap lists.
pub fn classify_topology(types: &[MemoryTypeInfo], heaps: &[MemoryHeapInfo]) -> MemoryTopology {
    let rebar_heap = heaps.iter().find(|heap| {
        heap.device_local
            && types.iter().any(|ty| {
                ty.heap_index == heap.index
                    && ty
                        .property_flags
                        .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
            })
    });

    match rebar_heap {
        None => MemoryTopology::Discrete,
        Some(heap) => {
            let largest_device_local = heaps
                .iter()
                .filter(|h| h.device_local)
                .map(|h| h.size)
                .max()
                .unwrap_or(0);
            if heap.size >= largest_device_local {
                MemoryTopology::UnifiedMemory
            } else {
                MemoryTopology::ResizableBar
            }
        }
    }
}

/// Chooses the property-mask preference order for a given usage (§2 item 10
/// "chooses property masks for UPLOAD/READBACK/DESCRIPTOR allocations").
/// Returns candidates in priority order; the caller tries each against the
/// device's actual memory-type list and takes the first that exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationUsage {
    Upload,
    Readback,
    DescriptorBuffer,
    DeviceLocal,
}

pub fn property_mask_preference(
    usage: AllocationUsage,
    topology: MemoryTopology,
) -> arrayvec::ArrayVec<[vk::MemoryPropertyFlags; 2]> {
    use vk::MemoryPropertyFlags as F;
    let mut prefs = arrayvec::ArrayVec::new();
    match usage {
        AllocationUsage::Upload | AllocationUsage::DescriptorBuffer => {
            if topology != MemoryTopology::Discrete {
                prefs.push(F::DEVICE_LOCAL | F::HOST_VISIBLE | F::HOST_COHERENT);
            }
            prefs.push(F::HOST_VISIBLE | F::HOST_COHERENT);
        }
        AllocationUsage::Readback => {
            prefs.push(F::HOST_VISIBLE | F::HOST_COHERENT | F::HOST_CACHED);
            prefs.push(F::HOST_VISIBLE | F::HOST_COHERENT);
        }
        AllocationUsage::DeviceLocal => prefs.push(F::DEVICE_LOCAL),
    }
    prefs
}

/// Tracks the shared ReBAR budget (§5: "ReBAR budget is shared across all
/// memory types that map to the host-visible device-local heap").
#[derive(Debug, Default)]
pub struct RebarBudget {
    state: Mutex<RebarBudgetState>,
}

#[derive(Debug, Default)]
struct RebarBudgetState {
    capacity: u64,
    in_use: u64,
}

impl RebarBudget {
    pub fn new(capacity: u64) -> Self {
        RebarBudget {
            state: Mutex::new(RebarBudgetState { capacity, in_use: 0 }),
        }
    }

    /// Attempts to reserve `size` bytes of the shared budget. Returns
    /// `false` (caller should fall back to a non-ReBAR heap) if it would
    /// overflow the tracked capacity.
    pub fn try_reserve(&self, size: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.in_use + size > state.capacity {
            return false;
        }
        state.in_use += size;
        true
    }

    pub fn release(&self, size: u64) {
        let mut state = self.state.lock().unwrap();
        state.in_use = state.in_use.saturating_sub(size);
    }

    pub fn in_use(&self) -> u64 {
        self.state.lock().unwrap().in_use
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discrete_topology_inputs() -> (Vec<MemoryTypeInfo>, Vec<MemoryHeapInfo>) {
        let heaps = vec![
            MemoryHeapInfo { index: 0, size: 8 << 30, device_local: true },
            MemoryHeapInfo { index: 1, size: 16 << 30, device_local: false },
        ];
        let types = vec![
            MemoryTypeInfo { index: 0, heap_index: 0, property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL },
            MemoryTypeInfo {
                index: 1,
                heap_index: 1,
                property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            },
        ];
        (types, heaps)
    }

    #[test]
    fn pure_discrete_topology_has_no_host_visible_device_local_heap() {
        let (types, heaps) = discrete_topology_inputs();
        assert_eq!(classify_topology(&types, &heaps), MemoryTopology::Discrete);
    }

    #[test]
    fn uma_topology_when_device_local_heap_is_fully_host_visible() {
        let heaps = vec![MemoryHeapInfo { index: 0, size: 16 << 30, device_local: true }];
        let types = vec![MemoryTypeInfo {
            index: 0,
            heap_index: 0,
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        }];
        assert_eq!(classify_topology(&types, &heaps), MemoryTopology::UnifiedMemory);
    }

    #[test]
    fn rebar_topology_when_small_host_visible_heap_coexists_with_larger_device_local() {
        let heaps = vec![
            MemoryHeapInfo { index: 0, size: 8 << 30, device_local: true },
            MemoryHeapInfo { index: 1, size: 256 << 20, device_local: true },
        ];
        let types = vec![
            MemoryTypeInfo { index: 0, heap_index: 0, property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL },
            MemoryTypeInfo {
                index: 1,
                heap_index: 1,
                property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
            },
        ];
        assert_eq!(classify_topology(&types, &heaps), MemoryTopology::ResizableBar);
    }

    #[test]
    fn rebar_budget_rejects_reservations_past_capacity() {
        let budget = RebarBudget::new(1024);
        assert!(budget.try_reserve(1000));
        assert!(!budget.try_reserve(100));
        budget.release(1000);
        assert!(budget.try_reserve(100));
        assert_eq!(budget.in_use(), 100);
    }

    #[test]
    fn upload_prefers_device_local_host_visible_on_non_discrete_topology() {
        let prefs = property_mask_preference(AllocationUsage::Upload, MemoryTopology::ResizableBar);
        assert!(prefs[0].contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
        let discrete_prefs = property_mask_preference(AllocationUsage::Upload, MemoryTopology::Discrete);
        assert!(!discrete_prefs[0].contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
    }
}
