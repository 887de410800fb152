//! Open-addressing hash map with linear probing, generalized from
//! vkd3d-proton's `hash_map.h` C implementation into a typed Rust container.
//!
//! The original is generic over a `void *` entry whose first bytes are a
//! `hash_map_entry` header; here that's replaced by a `Slot<K, V>` enum and
//! caller-supplied hash/eq closures, matching the "C void-pointer generics"
//! -> "strongly-typed generic containers" re-architecture.

enum Slot<K, V> {
    Empty,
    Occupied { hash: u32, key: K, value: V },
}

/// Generic open-addressing hash map. Callers supply the hash and equality
/// closures on every call, so lookups never require constructing a full `K`.
pub struct HashMap<K, V> {
    slots: Vec<Slot<K, V>>,
    used: u32,
}

impl<K, V> Default for HashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> HashMap<K, V> {
    pub fn new() -> Self {
        HashMap {
            slots: Vec::new(),
            used: 0,
        }
    }

    pub fn len(&self) -> u32 {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    fn entry_count(&self) -> u32 {
        self.slots.len() as u32
    }

    fn next_size(old_size: u32) -> u32 {
        if old_size == 0 {
            37
        } else {
            old_size * 2 + 5
        }
    }

    fn should_grow_before_insert(&self) -> bool {
        // Load factor <= 0.7
        10 * self.used >= 7 * self.entry_count()
    }

    fn grow(&mut self) {
        let new_count = Self::next_size(self.entry_count());
        let mut new_slots: Vec<Slot<K, V>> = Vec::with_capacity(new_count as usize);
        new_slots.resize_with(new_count as usize, || Slot::Empty);

        let old_slots = std::mem::replace(&mut self.slots, Vec::new());
        for slot in old_slots {
            if let Slot::Occupied { hash, key, value } = slot {
                let mut idx = hash % new_count;
                loop {
                    match &new_slots[idx as usize] {
                        Slot::Empty => break,
                        Slot::Occupied { .. } => {
                            idx = if idx + 1 < new_count { idx + 1 } else { 0 };
                        }
                    }
                }
                new_slots[idx as usize] = Slot::Occupied { hash, key, value };
            }
        }
        self.slots = new_slots;
    }

    /// Finds the entry whose key compares equal under `eq`, where `hash` is
    /// the sought key's precomputed hash.
    pub fn find(&self, hash: u32, mut eq: impl FnMut(&K) -> bool) -> Option<&V> {
        if self.slots.is_empty() {
            return None;
        }
        let count = self.entry_count();
        let mut idx = hash % count;
        loop {
            match &self.slots[idx as usize] {
                Slot::Empty => return None,
                Slot::Occupied {
                    hash: slot_hash,
                    key,
                    value,
                } => {
                    if *slot_hash == hash && eq(key) {
                        return Some(value);
                    }
                    idx = if idx + 1 < count { idx + 1 } else { 0 };
                }
            }
        }
    }

    /// Mutable counterpart to [`HashMap::find`].
    pub fn find_mut(&mut self, hash: u32, mut eq: impl FnMut(&K) -> bool) -> Option<&mut V> {
        if self.slots.is_empty() {
            return None;
        }
        let count = self.entry_count();
        let mut idx = hash % count;
        loop {
            match &self.slots[idx as usize] {
                Slot::Empty => return None,
                Slot::Occupied { hash: slot_hash, key, .. } => {
                    if *slot_hash == hash && eq(key) {
                        break;
                    }
                    idx = if idx + 1 < count { idx + 1 } else { 0 };
                }
            }
        }
        match &mut self.slots[idx as usize] {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Empty => unreachable!("just matched occupied"),
        }
    }

    /// Inserts `(key, value)` keyed by precomputed `hash`, growing first if
    /// the load factor would exceed 0.7. Growth rehashes existing entries
    /// from their stored hash, not by recomputing it, since keys never
    /// mutate in place. If an entry whose key already compares equal (via
    /// `eq`) exists, the existing value is returned and the new
    /// `key`/`value` are dropped without being inserted (mirrors the C
    /// version returning the pre-existing entry and leaving cleanup of the
    /// rejected copy to the caller -- here that's just normal `Drop`).
    pub fn insert(
        &mut self,
        hash: u32,
        key: K,
        value: V,
        mut eq: impl FnMut(&K) -> bool,
    ) -> &V {
        if self.should_grow_before_insert() {
            self.grow();
        }

        let count = self.entry_count();
        let mut idx = hash % count;
        loop {
            let is_match = match &self.slots[idx as usize] {
                Slot::Empty => true,
                Slot::Occupied {
                    hash: slot_hash,
                    key: slot_key,
                    ..
                } => *slot_hash == hash && eq(slot_key),
            };
            if is_match {
                break;
            }
            idx = if idx + 1 < count { idx + 1 } else { 0 };
        }

        let slot = &mut self.slots[idx as usize];
        if matches!(slot, Slot::Empty) {
            self.used += 1;
            *slot = Slot::Occupied { hash, key, value };
        }

        match &self.slots[idx as usize] {
            Slot::Occupied { value, .. } => value,
            Slot::Empty => unreachable!("just inserted"),
        }
    }

    /// Visits every occupied entry in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied { key, value, .. } => Some((key, value)),
            Slot::Empty => None,
        })
    }

    /// Clears all entries, keeping the allocated capacity.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = Slot::Empty;
        }
        self.used = 0;
    }
}
