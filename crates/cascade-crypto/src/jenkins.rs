//! Jenkins lookup3 hashing for root table name lookups
//!
//! Root tables identify files by a 64-bit hash of their normalized path:
//! `hashlittle2` over the uppercased path with `/` replaced by `\`, with the
//! primary result in the high 32 bits and the secondary in the low 32 bits.

/// Compute the root table name hash for a file path
///
/// ```
/// use cascade_crypto::jenkins::name_hash;
///
/// assert_eq!(
///     name_hash("world/maps/azeroth/azeroth.wdt"),
///     name_hash("WORLD\\MAPS\\AZEROTH\\AZEROTH.WDT"),
/// );
/// ```
pub fn name_hash(path: &str) -> u64 {
    let normalized: Vec<u8> = path
        .bytes()
        .map(|b| if b == b'/' { b'\\' } else { b.to_ascii_uppercase() })
        .collect();

    let (pc, pb) = hashlittle2(&normalized, 0, 0);
    (u64::from(pc) << 32) | u64::from(pb)
}

/// Bob Jenkins' `hashlittle2`, returning `(pc, pb)`
pub fn hashlittle2(key: &[u8], pc: u32, pb: u32) -> (u32, u32) {
    let mut a = 0xdead_beef_u32
        .wrapping_add(u32::try_from(key.len()).unwrap_or(u32::MAX))
        .wrapping_add(pc);
    let mut b = a;
    let mut c = a.wrapping_add(pb);

    if key.is_empty() {
        return (c, b);
    }

    let mut k = key;
    while k.len() > 12 {
        a = a.wrapping_add(read_u32(&k[0..4]));
        b = b.wrapping_add(read_u32(&k[4..8]));
        c = c.wrapping_add(read_u32(&k[8..12]));
        mix(&mut a, &mut b, &mut c);
        k = &k[12..];
    }

    // Tail of 1..=12 bytes, little-endian into a, b, c
    let mut words = [0u32; 3];
    for (i, &byte) in k.iter().enumerate() {
        words[i / 4] = words[i / 4].wrapping_add(u32::from(byte) << ((i % 4) * 8));
    }
    a = a.wrapping_add(words[0]);
    b = b.wrapping_add(words[1]);
    c = c.wrapping_add(words[2]);

    final_mix(&mut a, &mut b, &mut c);
    (c, b)
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);

    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);

    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);

    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);

    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);

    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));

    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));

    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));

    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));

    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));

    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));

    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}
