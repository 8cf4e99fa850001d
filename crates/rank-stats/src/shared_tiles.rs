//! Detection of tiles whose compressed bytes are shared by several positions.
//!
//! The producing pipeline stores identical tiles (open ocean, desert) once and
//! points every position with that content at the same offset. Each such group
//! is decoded once and weighted by its use count. A bounded reservoir of member
//! positions gives the statistics pass a geographic footprint for the group.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Maximum number of sample positions kept per group.
pub const RESERVOIR_SIZE: usize = 2000;

/// Once a reservoir is full, a later member replaces its slot with
/// probability `1 / REPLACE_ONE_IN`.
pub const REPLACE_ONE_IN: u32 = 50;

/// A group of tile positions sharing one compressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedTile {
    /// Number of positions pointing at this payload. Always > 1.
    pub use_count: u32,

    /// Member positions, `min(use_count, RESERVOIR_SIZE)` of them.
    pub sample_tiles: Vec<usize>,
}

impl SharedTile {
    /// Position to decode on behalf of the whole group.
    pub fn first_sample(&self) -> usize {
        self.sample_tiles[0]
    }
}

/// All shared groups of a raster, keyed by data offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedTiles {
    groups: BTreeMap<u32, SharedTile>,
}

impl SharedTiles {
    /// Find the groups in a tile offset table and sample their members.
    ///
    /// Positions are visited in row-block-randomized order: the table is laid
    /// out as a grid `ceil(sqrt(n))` positions wide and its rows are visited
    /// in a random permutation.
    pub fn detect(offsets: &[u32], rng: &mut impl Rng) -> Self {
        let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
        for &offset in offsets {
            *counts.entry(offset).or_insert(0) += 1;
        }

        let mut reservoirs: BTreeMap<u32, Reservoir> = counts
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(&offset, &count)| (offset, Reservoir::new(count)))
            .collect();

        if !reservoirs.is_empty() {
            let stride = ceil_sqrt(offsets.len());
            let rows = offsets.len().div_ceil(stride);
            let mut row_order: Vec<usize> = (0..rows).collect();
            row_order.shuffle(rng);

            for row in row_order {
                for col in 0..stride {
                    let position = row * stride + col;
                    if position >= offsets.len() {
                        break;
                    }
                    if let Some(reservoir) = reservoirs.get_mut(&offsets[position]) {
                        reservoir.offer(position, rng);
                    }
                }
            }
        }

        let groups: BTreeMap<u32, SharedTile> = reservoirs
            .into_iter()
            .map(|(offset, reservoir)| (offset, reservoir.into_shared_tile()))
            .collect();

        let shared = Self { groups };
        debug!(
            positions = offsets.len(),
            groups = shared.len(),
            covered = shared.coverage(),
            "Detected shared tiles"
        );
        shared
    }

    pub fn get(&self, offset: u32) -> Option<&SharedTile> {
        self.groups.get(&offset)
    }

    pub fn is_shared(&self, offset: u32) -> bool {
        self.groups.contains_key(&offset)
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups in ascending offset order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &SharedTile)> {
        self.groups.iter().map(|(offset, tile)| (*offset, tile))
    }

    /// Number of positions that belong to some group.
    pub fn coverage(&self) -> u64 {
        self.groups.values().map(|t| t.use_count as u64).sum()
    }

    /// Positions whose payload is used exactly once, in ascending order.
    pub fn unique_positions<'a>(&'a self, offsets: &'a [u32]) -> impl Iterator<Item = usize> + 'a {
        offsets
            .iter()
            .enumerate()
            .filter(|(_, offset)| !self.is_shared(**offset))
            .map(|(position, _)| position)
    }
}

struct Reservoir {
    slots: Vec<Option<usize>>,
    filled: usize,
    use_count: u32,
}

impl Reservoir {
    fn new(use_count: u32) -> Self {
        let size = (use_count as usize).min(RESERVOIR_SIZE);
        Self {
            slots: vec![None; size],
            filled: 0,
            use_count,
        }
    }

    fn offer(&mut self, position: usize, rng: &mut impl Rng) {
        let size = self.slots.len();
        let preferred = position % size;

        if self.filled < size {
            // Probe forward from the preferred slot until a free one turns up.
            for step in 0..size {
                let slot = (preferred + step) % size;
                if self.slots[slot].is_none() {
                    self.slots[slot] = Some(position);
                    self.filled += 1;
                    return;
                }
            }
        } else if rng.random_range(0..REPLACE_ONE_IN) == 0 {
            self.slots[preferred] = Some(position);
        }
    }

    fn into_shared_tile(self) -> SharedTile {
        SharedTile {
            use_count: self.use_count,
            sample_tiles: self.slots.into_iter().flatten().collect(),
        }
    }
}

/// Smallest `s` with `s * s >= n`, at least 1.
fn ceil_sqrt(n: usize) -> usize {
    let mut s = (n as f64).sqrt() as usize;
    while s * s < n {
        s += 1;
    }
    while s > 1 && (s - 1) * (s - 1) >= n {
        s -= 1;
    }
    s.max(1)
}
