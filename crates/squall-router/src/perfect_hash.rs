//! Perfect-hash generation over route keys
//!
//! Bounded brute-force search for a multiplicative hash
//! `h(key) = ((key * multiplier) >> shift) & mask` that maps every
//! registered key to its own slot.
//!
//! ## Search order
//! 1. Table size: powers of two from `next_power_of_two(N)` up to
//!    `2^MAX_TABLE_BITS`, so the smallest workable table wins.
//! 2. Shift: a window of `SHIFT_WINDOW` values below the top bit of the product.
//! 3. Multiplier: the fixed odd palette in [`MULTIPLIERS`].
//!
//! The first collision-free candidate is accepted. Running out of candidates
//! is not an error: the caller gets `None` and falls back to a hash map.

use crate::key::{select_positions, KeyWidth, RouteKey};
use std::collections::HashSet;
use std::fmt;

/// Largest table is `2^MAX_TABLE_BITS` slots.
pub const MAX_TABLE_BITS: u32 = 9;

/// Number of shift values tried below the product's top bit.
pub const SHIFT_WINDOW: u32 = 64;

/// Slot value marking an empty slot.
pub const EMPTY_SLOT: u8 = u8::MAX;

/// Entry indices are stored as `u8` with `EMPTY_SLOT` reserved.
pub const MAX_ENTRIES: usize = EMPTY_SLOT as usize;

/// Odd 64-bit multipliers (golden ratio, splitmix, murmur finalizers).
pub const MULTIPLIERS: [u64; 8] = [
    0x9E37_79B9_7F4A_7C15,
    0xBF58_476D_1CE4_E5B9,
    0x94D0_49BB_1331_11EB,
    0xFF51_AFD7_ED55_8CCD,
    0xC4CE_B9FE_1A85_EC53,
    0x2545_F491_4F6C_DD1D,
    0xD6E8_FEB8_6659_FD93,
    0x87C3_7B91_1142_53D5,
];

const MAX_TABLE_SIZE: usize = 1 << MAX_TABLE_BITS;

/// Error building a generator from its entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// Two entries share the same byte form
    DuplicateEntry { name: String },
    /// More entries than a `u8` slot index can address
    TooManyEntries { count: usize },
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerateError::DuplicateEntry { name } => {
                write!(f, "duplicate perfect-hash entry: {}", name)
            }
            GenerateError::TooManyEntries { count } => write!(
                f,
                "too many perfect-hash entries: {} exceeds {}",
                count, MAX_ENTRIES
            ),
        }
    }
}

impl std::error::Error for GenerateError {}

/// One trial hash function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCandidate {
    pub multiplier: u64,
    pub shift: u32,
    pub mask: u64,
    pub table_size: usize,
    /// Slot is `h % table_size` instead of `h & mask`
    pub minimal: bool,
}

impl HashCandidate {
    /// Raw hash value before slot reduction
    #[inline]
    pub fn hash(&self, key: &RouteKey) -> u64 {
        let product = key.fold().wrapping_mul(self.multiplier as u128);
        (product >> self.shift) as u64
    }

    /// Slot index in `0..table_size`
    #[inline]
    pub fn slot(&self, key: &RouteKey) -> usize {
        let hash = self.hash(key);
        if self.minimal {
            (hash % self.table_size as u64) as usize
        } else {
            (hash & self.mask) as usize
        }
    }
}

/// Compiled, immutable perfect-hash table
#[derive(Debug, Clone)]
pub struct PerfectHashTable {
    candidate: HashCandidate,
    width: KeyWidth,
    positions: Box<[usize]>,
    slots: Box<[u8]>,
    keys: Box<[RouteKey]>,
}

impl PerfectHashTable {
    /// Build a table for `entries`, widening the key until a candidate exists.
    ///
    /// Starts at `min_width`. With `minimal`, each width first tries a table of
    /// exactly N slots before the power-of-two search.
    pub fn build<'a, I>(
        entries: I,
        min_width: KeyWidth,
        minimal: bool,
    ) -> Result<Option<Self>, GenerateError>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let entries: Vec<(&str, &[u8])> = entries.into_iter().collect();
        let mut width = Some(min_width);
        while let Some(current) = width {
            let generator = PerfectHashGenerator::new(entries.iter().copied(), current)?;
            let table = if minimal {
                generator.generate_minimal().or_else(|| generator.generate())
            } else {
                generator.generate()
            };
            if table.is_some() {
                return Ok(table);
            }
            width = current.wider();
        }
        Ok(None)
    }

    pub fn candidate(&self) -> &HashCandidate {
        &self.candidate
    }

    pub fn width(&self) -> KeyWidth {
        self.width
    }

    /// Byte offsets sampled into keys for this table
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn table_size(&self) -> usize {
        self.slots.len()
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Raw slot array (`EMPTY_SLOT` marks empty slots)
    pub fn slots(&self) -> &[u8] {
        &self.slots
    }

    /// Verification key of an entry
    pub fn key(&self, index: usize) -> Option<&RouteKey> {
        self.keys.get(index)
    }

    /// Sample the key for `bytes` with this table's positions
    #[inline]
    pub fn key_for(&self, bytes: &[u8]) -> RouteKey {
        RouteKey::extract(bytes, &self.positions)
    }

    /// Entry index for `key`, verified against the stored key
    #[inline]
    pub fn lookup(&self, key: &RouteKey) -> Option<usize> {
        let index = *self.slots.get(self.candidate.slot(key))?;
        if index == EMPTY_SLOT {
            return None;
        }
        let index = index as usize;
        (self.keys.get(index)? == key).then_some(index)
    }

    /// Entry index for a raw start line
    #[inline]
    pub fn lookup_bytes(&self, bytes: &[u8]) -> Option<usize> {
        self.lookup(&self.key_for(bytes))
    }

    /// Used slots as a percentage of the table size
    pub fn load_factor(&self) -> f64 {
        let used = self.slots.iter().filter(|s| **s != EMPTY_SLOT).count();
        used as f64 / self.slots.len() as f64 * 100.0
    }
}

/// Searches for a collision-free [`HashCandidate`] over a fixed entry set
#[derive(Debug, Clone)]
pub struct PerfectHashGenerator {
    names: Vec<String>,
    keys: Vec<RouteKey>,
    positions: Vec<usize>,
    width: KeyWidth,
    keys_distinct: bool,
}

impl PerfectHashGenerator {
    /// Prepare a generator.
    ///
    /// Selects the sampled positions for `width` over all entries and extracts
    /// every entry's key. Entries with identical byte forms are rejected.
    pub fn new<'a, I>(entries: I, width: KeyWidth) -> Result<Self, GenerateError>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let entries: Vec<(&str, &[u8])> = entries.into_iter().collect();
        if entries.len() > MAX_ENTRIES {
            return Err(GenerateError::TooManyEntries {
                count: entries.len(),
            });
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for (name, bytes) in &entries {
            if !seen.insert(*bytes) {
                return Err(GenerateError::DuplicateEntry {
                    name: name.to_string(),
                });
            }
        }

        let forms: Vec<&[u8]> = entries.iter().map(|(_, bytes)| *bytes).collect();
        let positions = select_positions(&forms, width);
        let keys: Vec<RouteKey> = forms
            .iter()
            .map(|bytes| RouteKey::extract(bytes, &positions))
            .collect();
        let keys_distinct = keys.iter().collect::<HashSet<_>>().len() == keys.len();

        Ok(Self {
            names: entries.iter().map(|(name, _)| name.to_string()).collect(),
            keys,
            positions,
            width,
            keys_distinct,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn keys(&self) -> &[RouteKey] {
        &self.keys
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Whether the sampled positions tell every entry apart.
    ///
    /// When two distinct entries sample to the same key no hash function can
    /// separate them, and every search returns `None`.
    pub fn keys_distinct(&self) -> bool {
        self.keys_distinct
    }

    /// Smallest power-of-two candidate, if any
    pub fn find_candidate(&self) -> Option<HashCandidate> {
        if self.keys.is_empty() || !self.keys_distinct {
            return None;
        }
        let min_bits = self.keys.len().next_power_of_two().trailing_zeros();
        let top = self.product_bits();

        for table_bits in min_bits..=MAX_TABLE_BITS {
            let table_size = 1usize << table_bits;
            let mask = (table_size - 1) as u64;
            let base = (top - table_bits).min(u128::BITS - 1);
            for shift in (base.saturating_sub(SHIFT_WINDOW)..=base).rev() {
                for &multiplier in MULTIPLIERS.iter() {
                    let candidate = HashCandidate {
                        multiplier,
                        shift,
                        mask,
                        table_size,
                        minimal: false,
                    };
                    if self.is_collision_free(&candidate) {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    /// Candidate with exactly N slots, if any
    pub fn find_minimal_candidate(&self) -> Option<HashCandidate> {
        if self.keys.is_empty() || !self.keys_distinct {
            return None;
        }
        let table_size = self.keys.len();
        let slot_bits = usize::BITS - (table_size - 1).leading_zeros();
        let base = self.product_bits() - slot_bits.max(1);

        for shift in (base.saturating_sub(SHIFT_WINDOW)..=base).rev() {
            for &multiplier in MULTIPLIERS.iter() {
                let candidate = HashCandidate {
                    multiplier,
                    shift,
                    mask: u64::MAX,
                    table_size,
                    minimal: true,
                };
                if self.is_collision_free(&candidate) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Build the smallest power-of-two table
    pub fn generate(&self) -> Option<PerfectHashTable> {
        self.find_candidate().and_then(|c| self.compile(c))
    }

    /// Build a minimal table (`table_size == N`)
    pub fn generate_minimal(&self) -> Option<PerfectHashTable> {
        self.find_minimal_candidate().and_then(|c| self.compile(c))
    }

    fn compile(&self, candidate: HashCandidate) -> Option<PerfectHashTable> {
        let mut slots = vec![EMPTY_SLOT; candidate.table_size].into_boxed_slice();
        for (index, key) in self.keys.iter().enumerate() {
            slots[candidate.slot(key)] = index as u8;
        }
        let table = PerfectHashTable {
            candidate,
            width: self.width,
            positions: self.positions.clone().into_boxed_slice(),
            slots,
            keys: self.keys.clone().into_boxed_slice(),
        };

        // Re-verify: every entry must land on its own slot with its own key.
        let verified = self
            .keys
            .iter()
            .enumerate()
            .all(|(index, key)| table.lookup(key) == Some(index));
        verified.then_some(table)
    }

    fn is_collision_free(&self, candidate: &HashCandidate) -> bool {
        let mut used = [false; MAX_TABLE_SIZE];
        for key in &self.keys {
            let slot = candidate.slot(key);
            if slot >= candidate.table_size || used[slot] {
                return false;
            }
            used[slot] = true;
        }
        true
    }

    /// Highest meaningful bit of `fold(key) * multiplier`
    fn product_bits(&self) -> u32 {
        (self.width.folded_bits() + u64::BITS).min(u128::BITS)
    }
}
