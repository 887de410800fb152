//! Hash-combine and FNV-1a helpers shared by the hash map, view keys and the
//! sampler cache.

/// Combines two 32-bit hashes. Same formula used throughout vkd3d-proton:
/// `h' = h_old XOR (h_new + 0x9e3779b9 + (h_old << 6) + (h_old >> 2))`.
pub fn hash_combine(old_hash: u32, new_hash: u32) -> u32 {
    old_hash ^ (new_hash
        .wrapping_add(0x9e3779b9)
        .wrapping_add(old_hash << 6)
        .wrapping_add(old_hash >> 2))
}

/// Hashes a `u64` by combining its two halves.
pub fn hash_u64(value: u64) -> u32 {
    hash_combine(value as u32, (value >> 32) as u32)
}

/// Hashes a byte slice as a stream of little-endian `u32` words, combining
/// each with [`hash_combine`]. Any trailing bytes that don't fill a whole
/// word are ignored, matching the original `hash_data`.
pub fn hash_data(data: &[u8]) -> u32 {
    let mut hash = 0u32;
    for word in data.chunks_exact(4) {
        let word = u32::from_ne_bytes([word[0], word[1], word[2], word[3]]);
        hash = hash_combine(hash, word);
    }
    hash
}

/// FNV-1a state, used where a stronger, stored hash is wanted (pipeline
/// caches, shader hashes) rather than the cheap table hash above.
pub fn fnv1_init() -> u64 {
    0xcbf2_9ce4_8422_2325
}

pub fn fnv1_iterate_u8(h: u64, value: u8) -> u64 {
    h.wrapping_mul(0x0000_0100_0000_01b3) ^ (value as u64)
}

pub fn fnv1_iterate_u32(h: u64, value: u32) -> u64 {
    let mut h = h;
    for byte in value.to_le_bytes() {
        h = fnv1_iterate_u8(h, byte);
    }
    h
}

pub fn fnv1_iterate_u64(h: u64, value: u64) -> u64 {
    let lo = fnv1_iterate_u32(h, value as u32);
    fnv1_iterate_u32(lo, (value >> 32) as u32)
}

pub fn fnv1_iterate_str(h: u64, s: &str) -> u64 {
    let mut h = h;
    for byte in s.bytes() {
        h = fnv1_iterate_u8(h, byte);
    }
    // original terminates every string with an explicit NUL iteration
    fnv1_iterate_u8(h, 0)
}
