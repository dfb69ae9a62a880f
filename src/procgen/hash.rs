/// Integer hashing used to derive reproducible sub-seeds
///
/// SplitMix64 finalizer: a bijective avalanche over u64.
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Seed for a tile from its coordinate and a salt
pub fn hash_tile(x: i32, z: i32, salt: u64) -> u64 {
    let packed = ((x as u32 as u64) << 32) | (z as u32 as u64);
    splitmix64(packed ^ splitmix64(salt))
}

/// Seed for a sub-item (e.g. a patch) within a tile
pub fn hash_tile_item(x: i32, z: i32, salt: u64, index: u32) -> u64 {
    splitmix64(hash_tile(x, z, salt) ^ (index as u64).wrapping_mul(0xD6E8_FEB8_6659_FD93))
}

/// Map a hash to [0, 1)
pub fn unit_f64(hash: u64) -> f64 {
    (hash >> 11) as f64 / (1u64 << 53) as f64
}
