use bytemuck::{Pod, Zeroable};

use crate::space::{SimVector, Space};

/// One row of the spatial hash table: a particle index together with the
/// full cell hash and the bucket key (`hash % table_size`).
///
/// Sorting these rows by key groups every particle of a bucket together;
/// the full hash is kept so a neighbour walk can skip foreign cells that
/// landed in the same bucket.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SpatialEntry {
    pub index: u32,
    pub hash: u32,
    pub key: u32,
}

impl SpatialEntry {
    /// Sorts after every real entry; used to pad the table to a power of two.
    pub const PADDING: Self = Self {
        index: u32::MAX,
        hash: u32::MAX,
        key: u32::MAX,
    };

    #[inline]
    pub fn new(index: u32, hash: u32, table_size: u32) -> Self {
        Self {
            index,
            hash,
            key: hash % table_size.max(1),
        }
    }

    #[inline]
    pub fn sort_key(&self) -> (u32, u32) {
        (self.key, self.index)
    }
}

/// Cell hash of a position, with the kernel radius as cell size.
#[inline]
pub fn hash_position<S: Space>(position: S::Vector, cell_size: f32) -> u32 {
    S::hash_cell(S::cell_of(position, cell_size))
}

/// Read-only view over a sorted spatial hash table and its bucket offsets.
#[derive(Clone, Copy)]
pub struct NeighborTable<'a> {
    entries: &'a [SpatialEntry],
    offsets: &'a [u32],
}

impl<'a> NeighborTable<'a> {
    /// `entries` must already be sorted by key and `offsets` computed from them.
    pub fn new(entries: &'a [SpatialEntry], offsets: &'a [u32]) -> Self {
        Self { entries, offsets }
    }

    pub fn table_size(&self) -> u32 {
        self.offsets.len() as u32
    }

    /// All entries of bucket `key` (empty when the bucket is unused).
    pub fn bucket(&self, key: u32) -> &'a [SpatialEntry] {
        let Some(&start) = self.offsets.get(key as usize) else {
            return &[];
        };
        let start = start as usize;
        if start >= self.entries.len() {
            return &[];
        }
        let len = self.entries[start..]
            .iter()
            .take_while(|e| e.key == key)
            .count();
        &self.entries[start..start + len]
    }

    /// Visit every particle within `radius` of `origin`, walking only the
    /// cell neighbourhood of `origin`. The callback receives the neighbour
    /// index, the offset from `origin` to the neighbour and its distance.
    /// `origin`'s own particle is included when it is in the table.
    pub fn for_each_neighbor<S, F>(
        &self,
        origin: S::Vector,
        radius: f32,
        positions: &[S::Vector],
        mut f: F,
    ) where
        S: Space,
        F: FnMut(usize, S::Vector, f32),
    {
        if self.offsets.is_empty() {
            return;
        }
        let table_size = self.table_size();
        let radius_sq = radius * radius;
        let cell = S::cell_of(origin, radius);

        for n in 0..S::NEIGHBOR_CELLS {
            let hash = S::hash_cell(S::neighbor_cell(cell, n));
            let key = hash % table_size;
            for entry in self.bucket(key) {
                if entry.hash != hash {
                    continue;
                }
                let j = entry.index as usize;
                let offset = positions[j] - origin;
                let dst_sq = offset.length_squared();
                if dst_sq > radius_sq {
                    continue;
                }
                f(j, offset, dst_sq.sqrt());
            }
        }
    }
}
