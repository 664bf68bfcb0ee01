//! Spatial hash sorter.
//!
//! Sorts the spatial hash table by bucket key with a bitonic network and
//! builds the bucket offset table. Simulation-agnostic: it only ever sees
//! [`SpatialEntry`] rows.
//!
//! 1. Copy the entries into a power-of-two scratch buffer, padding with
//!    [`SpatialEntry::PADDING`].
//! 2. One dispatch per `(k, j)` stage of the network, ping-ponging between
//!    two scratch buffers. Every lane computes its own output slot from the
//!    previous stage, so no lane ever writes another lane's slot.
//! 3. Copy the first N rows back.
//! 4. One dispatch over buckets: bucket `h` binary-searches the sorted key
//!    column for its first row, or gets the sentinel N when it is empty.

use std::mem;

use crate::device::{Device, DeviceBuffer, DeviceError, Idle};
use crate::grid::SpatialEntry;

pub struct SpatialHashSorter {
    front: DeviceBuffer<SpatialEntry>,
    back: DeviceBuffer<SpatialEntry>,
    capacity: usize,
}

/// Length of the padded bitonic scratch for `n` entries.
#[inline]
pub fn padded_len(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        n.next_power_of_two()
    }
}

impl SpatialHashSorter {
    pub fn new(device: &mut Device, capacity: usize) -> Self {
        let padded = padded_len(capacity);
        Self {
            front: device.create_buffer("sort scratch a", padded),
            back: device.create_buffer("sort scratch b", padded),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sort `entries` in place by key and fill `offsets` (one slot per bucket).
    ///
    /// Entries with equal keys stay ordered by particle index.
    pub fn sort_and_compute_offsets(
        &mut self,
        device: &mut Device,
        entries: &mut DeviceBuffer<SpatialEntry>,
        offsets: &mut DeviceBuffer<u32>,
    ) -> Result<(), DeviceError> {
        let n = entries.len();
        if n != self.capacity {
            return Err(DeviceError::SizeMismatch {
                label: entries.label(),
                expected: self.capacity,
                actual: n,
            });
        }
        if n == 0 {
            return Ok(());
        }
        let padded = self.front.len();

        {
            let src = entries.as_slice();
            device.dispatch("sort: load", padded, &mut self.front, |i, out| {
                *out = src.get(i).copied().unwrap_or(SpatialEntry::PADDING);
            })?;
        }

        let mut k = 2;
        while k <= padded {
            let mut j = k / 2;
            while j > 0 {
                let src = self.front.as_slice();
                device.dispatch("sort: bitonic stage", padded, &mut self.back, |i, out| {
                    let partner = i ^ j;
                    let a = src[i];
                    let b = src[partner];
                    let ascending = i & k == 0;
                    let keep_min = (i < partner) == ascending;
                    let a_first = a.sort_key() <= b.sort_key();
                    *out = if keep_min == a_first { a } else { b };
                })?;
                mem::swap(&mut self.front, &mut self.back);
                j /= 2;
            }
            k *= 2;
        }

        {
            let sorted = self.front.as_slice();
            device.dispatch("sort: store", n, entries, |i, out| *out = sorted[i])?;
        }

        compute_offsets(device, entries.as_slice(), offsets)
    }

    pub fn release(self, idle: &mut Idle<'_>) {
        idle.release(self.front);
        idle.release(self.back);
    }
}

/// Fill `offsets[h]` with the index of the first entry whose key is `h`,
/// or `entries.len()` when no entry has that key. `entries` must be sorted.
pub fn compute_offsets(
    device: &mut Device,
    entries: &[SpatialEntry],
    offsets: &mut DeviceBuffer<u32>,
) -> Result<(), DeviceError> {
    let n = entries.len();
    let buckets = offsets.len();
    device.dispatch("sort: offsets", buckets, offsets, |h, out| {
        let key = h as u32;
        let start = entries.partition_point(|e| e.key < key);
        *out = if start < n && entries[start].key == key {
            start as u32
        } else {
            n as u32
        };
    })
}

/// Sort arbitrary bucket keys: returns the permutation of `0..keys.len()`
/// ordered by key, and the offset of each of `bucket_count` buckets into it.
/// Keys are reduced modulo `bucket_count`.
pub fn sort_and_compute_offsets(
    device: &mut Device,
    keys: &[u32],
    bucket_count: usize,
) -> Result<(Vec<u32>, Vec<u32>), DeviceError> {
    let n = keys.len();
    let table_size = bucket_count.max(1) as u32;
    let rows: Vec<SpatialEntry> = keys
        .iter()
        .enumerate()
        .map(|(i, &key)| SpatialEntry::new(i as u32, key, table_size))
        .collect();

    let mut sorter = SpatialHashSorter::new(device, n);
    let mut entries = device.create_buffer_init("sort keys", &rows);
    let mut offsets = device.create_buffer("sort offsets", table_size as usize);
    offsets.fill(n as u32);

    let result = sorter.sort_and_compute_offsets(device, &mut entries, &mut offsets);
    let permutation = entries.as_slice().iter().map(|e| e.index).collect();
    let table = offsets.as_slice().to_vec();

    let mut idle = device.drain();
    sorter.release(&mut idle);
    idle.release(entries);
    idle.release(offsets);

    result.map(|()| (permutation, table))
}
