//! Index validation and UTF-8 helpers shared by the core library, the
//! compiler's string escapes and the slot API.

/// Resolve a possibly negative index against a container of `count` elements.
///
/// Non-negative values must be below `count`. Negative values count back from
/// the end, so `-1` is the last element. Anything else is `None`.
pub fn validate_index(count: usize, value: i64) -> Option<usize> {
    let count = i64::try_from(count).ok()?;
    let index = if value < 0 { count + value } else { value };
    if (0..count).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

/// Number of bytes needed to encode `value` as UTF-8, or 0 if it is not a
/// valid code point.
pub fn utf8_encode_num_bytes(value: u32) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x7ff => 2,
        0x800..=0xffff => 3,
        0x1_0000..=0x10_ffff => 4,
        _ => 0,
    }
}

/// Append the UTF-8 encoding of `value` to `out`. Returns the number of bytes
/// written, 0 when `value` is outside the Unicode range.
///
/// Surrogate halves are encoded as-is rather than rejected, matching how the
/// language's `\u` escapes behave.
pub fn utf8_encode(value: u32, out: &mut Vec<u8>) -> usize {
    match utf8_encode_num_bytes(value) {
        1 => out.push(value as u8),
        2 => {
            out.push(0xc0 | ((value >> 6) & 0x1f) as u8);
            out.push(0x80 | (value & 0x3f) as u8);
        }
        3 => {
            out.push(0xe0 | ((value >> 12) & 0x0f) as u8);
            out.push(0x80 | ((value >> 6) & 0x3f) as u8);
            out.push(0x80 | (value & 0x3f) as u8);
        }
        4 => {
            out.push(0xf0 | ((value >> 18) & 0x07) as u8);
            out.push(0x80 | ((value >> 12) & 0x3f) as u8);
            out.push(0x80 | ((value >> 6) & 0x3f) as u8);
            out.push(0x80 | (value & 0x3f) as u8);
        }
        _ => return 0,
    }
    utf8_encode_num_bytes(value)
}

/// Length of the UTF-8 sequence introduced by `lead`, or 0 for a
/// continuation byte.
pub fn utf8_decode_num_bytes(lead: u8) -> usize {
    if lead & 0xc0 == 0x80 {
        0
    } else if lead & 0xf8 == 0xf0 {
        4
    } else if lead & 0xf0 == 0xe0 {
        3
    } else if lead & 0xe0 == 0xc0 {
        2
    } else {
        1
    }
}

/// Decode the code point starting at `bytes[0]`.
pub fn utf8_decode(bytes: &[u8]) -> Option<u32> {
    let (&lead, rest) = bytes.split_first()?;
    if lead <= 0x7f {
        return Some(u32::from(lead));
    }

    let (mut value, trailing) = match utf8_decode_num_bytes(lead) {
        2 => (u32::from(lead & 0x1f), 1),
        3 => (u32::from(lead & 0x0f), 2),
        4 => (u32::from(lead & 0x07), 3),
        _ => return None,
    };
    if rest.len() < trailing {
        return None;
    }
    for &byte in &rest[..trailing] {
        if byte & 0xc0 != 0x80 {
            return None;
        }
        value = (value << 6) | u32::from(byte & 0x3f);
    }
    Some(value)
}

/// 32-bit FNV-1a, used for string hashes.
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

/// Fold the bits of a double into a 32-bit hash.
pub fn hash_number(value: f64) -> u32 {
    let mut bits = value.to_bits();
    bits = (!bits).wrapping_add(bits << 18);
    bits ^= bits >> 31;
    bits = bits.wrapping_mul(21);
    bits ^= bits >> 11;
    bits = bits.wrapping_add(bits << 6);
    bits ^= bits >> 22;
    (bits & 0x3fff_ffff) as u32
}
