//! Route keys sampled from a request's canonical start line
//!
//! A start line like `GET /hello HTTP/1.1` is treated as a fixed 64-byte
//! canonical form (zero-padded, truncated). A [`RouteKey`] is built by reading
//! a small set of byte *positions* out of that form. The positions are picked
//! once per route set by [`select_positions`] so that the sampled bytes tell
//! the registered routes apart.

use std::fmt;

/// Width of the canonical start-line form, in bytes.
pub const MAX_KEY_OFFSET: usize = 64;

/// Number of bytes sampled into a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyWidth {
    B2,
    B4,
    B8,
    B16,
    B32,
    B64,
}

impl KeyWidth {
    /// All widths, narrowest first
    pub const ALL: [KeyWidth; 6] = [
        KeyWidth::B2,
        KeyWidth::B4,
        KeyWidth::B8,
        KeyWidth::B16,
        KeyWidth::B32,
        KeyWidth::B64,
    ];

    /// Sampled byte count
    pub const fn bytes(self) -> usize {
        match self {
            KeyWidth::B2 => 2,
            KeyWidth::B4 => 4,
            KeyWidth::B8 => 8,
            KeyWidth::B16 => 16,
            KeyWidth::B32 => 32,
            KeyWidth::B64 => 64,
        }
    }

    /// Key width in bits (16..=512)
    pub const fn bits(self) -> u32 {
        (self.bytes() * 8) as u32
    }

    /// Width of the integer the key folds into before hashing
    pub const fn folded_bits(self) -> u32 {
        if self.bits() > 128 {
            128
        } else {
            self.bits()
        }
    }

    /// Next wider width, if any
    pub fn wider(self) -> Option<KeyWidth> {
        match self {
            KeyWidth::B2 => Some(KeyWidth::B4),
            KeyWidth::B4 => Some(KeyWidth::B8),
            KeyWidth::B8 => Some(KeyWidth::B16),
            KeyWidth::B16 => Some(KeyWidth::B32),
            KeyWidth::B32 => Some(KeyWidth::B64),
            KeyWidth::B64 => None,
        }
    }

    /// Width for an exact byte count
    pub fn from_bytes(bytes: usize) -> Option<KeyWidth> {
        KeyWidth::ALL.into_iter().find(|w| w.bytes() == bytes)
    }
}

/// Fixed-width key built from sampled start-line bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteKey {
    bytes: [u8; MAX_KEY_OFFSET],
    len: u8,
}

impl RouteKey {
    /// Sample `source` at `positions`.
    ///
    /// Positions past the end of `source` read as zero, which is the same as
    /// sampling the zero-padded canonical form.
    pub fn extract(source: &[u8], positions: &[usize]) -> Self {
        let mut bytes = [0u8; MAX_KEY_OFFSET];
        let len = positions.len().min(MAX_KEY_OFFSET);
        for (slot, &position) in bytes.iter_mut().zip(positions) {
            *slot = source.get(position).copied().unwrap_or(0);
        }
        Self {
            bytes,
            len: len as u8,
        }
    }

    /// The sampled bytes, in position order
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fold into a 128-bit integer.
    ///
    /// Keys of up to 16 bytes map to their exact big-endian value. Wider keys
    /// XOR their 16-byte lanes together, each lane rotated by a distinct amount.
    pub fn fold(&self) -> u128 {
        let mut folded = 0u128;
        for (lane, chunk) in self.as_bytes().chunks(16).enumerate() {
            let mut buf = [0u8; 16];
            buf[..chunk.len()].copy_from_slice(chunk);
            let value = u128::from_be_bytes(buf) >> ((16 - chunk.len()) * 8);
            folded ^= value.rotate_left(lane as u32 * 29);
        }
        folded
    }
}

impl fmt::Debug for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouteKey(0x")?;
        for byte in self.as_bytes() {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

/// Pick the most discriminating byte offsets for a route set.
///
/// For every offset of the canonical form, count the distinct byte values the
/// routes carry there. Then greedily take the offset with the highest count
/// (lowest offset on ties), clear its count and repeat until `width` offsets
/// are chosen.
pub fn select_positions<B: AsRef<[u8]>>(routes: &[B], width: KeyWidth) -> Vec<usize> {
    let mut seen = [[false; 256]; MAX_KEY_OFFSET];
    for route in routes {
        let bytes = route.as_ref();
        for (offset, values) in seen.iter_mut().enumerate() {
            let value = bytes.get(offset).copied().unwrap_or(0);
            values[value as usize] = true;
        }
    }

    let mut distinct = [0usize; MAX_KEY_OFFSET];
    for (count, values) in distinct.iter_mut().zip(seen.iter()) {
        *count = values.iter().filter(|v| **v).count();
    }

    let mut positions = Vec::with_capacity(width.bytes());
    let mut taken = [false; MAX_KEY_OFFSET];
    for _ in 0..width.bytes() {
        let mut best: Option<(usize, usize)> = None;
        for (offset, &count) in distinct.iter().enumerate() {
            if taken[offset] {
                continue;
            }
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((offset, count)),
            }
        }
        match best {
            Some((offset, _)) => {
                positions.push(offset);
                taken[offset] = true;
                distinct[offset] = 0;
            }
            None => break,
        }
    }
    positions
}
