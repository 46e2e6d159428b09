//! In-memory model of a B-tree leaf level
//!
//! Leaf pages hold sorted keys up to a fixed capacity and carry the physical
//! block number they were allocated at. Appending past the rightmost key
//! starts a fresh page and leaves the old one full; any other insert into a
//! full page splits it in half. Fragmentation counts leaf pages whose logical
//! successor lives at a lower block number.

use serde::{Deserialize, Serialize};

/// Bytes per simulated leaf page
pub const PAGE_SIZE: u64 = 8192;

#[derive(Debug, Clone)]
struct LeafPage {
    block: u64,
    keys: Vec<u128>,
}

/// Structural metrics of the leaf level
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMetrics {
    pub rows: u64,
    pub leaf_pages: u64,
    pub page_splits: u64,
    pub avg_density_percent: f64,
    pub fragmentation_percent: f64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct LeafIndex {
    pages: Vec<LeafPage>,
    capacity: usize,
    next_block: u64,
    page_splits: u64,
    rows: u64,
    updates: u64,
}

impl LeafIndex {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            pages: vec![LeafPage {
                block: 0,
                keys: Vec::with_capacity(capacity),
            }],
            capacity,
            next_block: 1,
            page_splits: 0,
            rows: 0,
            updates: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> u64 {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn page_splits(&self) -> u64 {
        self.page_splits
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Page whose key range should hold `key`
    fn page_for(&self, key: u128) -> usize {
        // first page whose first key is greater than `key`, minus one
        let after = self
            .pages
            .partition_point(|page| page.keys.first().map_or(true, |&first| first <= key));
        after.saturating_sub(1)
    }

    pub fn contains(&self, key: u128) -> bool {
        self.pages[self.page_for(key)].keys.binary_search(&key).is_ok()
    }

    /// Insert `key`; returns false when it is already present
    pub fn insert(&mut self, key: u128) -> bool {
        let page_idx = self.page_for(key);
        let pos = match self.pages[page_idx].keys.binary_search(&key) {
            Ok(_) => return false,
            Err(pos) => pos,
        };

        if self.pages[page_idx].keys.len() < self.capacity {
            self.pages[page_idx].keys.insert(pos, key);
        } else if page_idx == self.pages.len() - 1 && pos == self.capacity {
            let block = self.allocate_block();
            self.pages.push(LeafPage {
                block,
                keys: vec![key],
            });
            self.page_splits += 1;
        } else {
            let block = self.allocate_block();
            let upper = self.pages[page_idx].keys.split_off(self.capacity / 2);
            let split_at = self.capacity / 2;
            self.pages.insert(page_idx + 1, LeafPage { block, keys: upper });
            if pos < split_at {
                self.pages[page_idx].keys.insert(pos, key);
            } else {
                self.pages[page_idx + 1].keys.insert(pos - split_at, key);
            }
            self.page_splits += 1;
        }

        self.rows += 1;
        true
    }

    /// Rewrite the row stored under `key` in place
    pub fn update(&mut self, key: u128) -> bool {
        let found = self.contains(key);
        if found {
            self.updates += 1;
        }
        found
    }

    fn allocate_block(&mut self) -> u64 {
        let block = self.next_block;
        self.next_block += 1;
        block
    }

    pub fn metrics(&self) -> IndexMetrics {
        let leaf_pages = self.pages.len() as u64;
        let out_of_order = self
            .pages
            .windows(2)
            .filter(|pair| pair[1].block < pair[0].block)
            .count();
        let fragmentation_percent = if self.pages.len() > 1 {
            out_of_order as f64 / (self.pages.len() - 1) as f64 * 100.0
        } else {
            0.0
        };

        IndexMetrics {
            rows: self.rows,
            leaf_pages,
            page_splits: self.page_splits,
            avg_density_percent: self.rows as f64 / (leaf_pages * self.capacity as u64) as f64
                * 100.0,
            fragmentation_percent,
            size_bytes: leaf_pages * PAGE_SIZE,
        }
    }

    /// Keys in index order
    pub fn keys(&self) -> impl Iterator<Item = u128> + '_ {
        self.pages.iter().flat_map(|page| page.keys.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_sequential_inserts_fill_pages() {
        let mut index = LeafIndex::new(4);
        for key in 1..=12u128 {
            assert!(index.insert(key));
        }
        let metrics = index.metrics();
        assert_eq!(metrics.rows, 12);
        assert_eq!(metrics.leaf_pages, 3);
        assert_eq!(metrics.page_splits, 2);
        assert_eq!(metrics.avg_density_percent, 100.0);
        assert_eq!(metrics.fragmentation_percent, 0.0);
    }

    #[test]
    fn test_interior_insert_splits_in_half() {
        let mut index = LeafIndex::new(4);
        for key in [10u128, 20, 30, 40] {
            index.insert(key);
        }
        index.insert(15);
        assert_eq!(index.page_splits(), 1);
        assert_eq!(index.keys().collect::<Vec<_>>(), vec![10, 15, 20, 30, 40]);
        let metrics = index.metrics();
        assert_eq!(metrics.leaf_pages, 2);
        assert!(metrics.avg_density_percent < 100.0);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut index = LeafIndex::new(8);
        assert!(index.insert(5));
        assert!(!index.insert(5));
        assert_eq!(index.len(), 1);
        assert!(index.contains(5));
        assert!(!index.contains(6));
    }

    #[test]
    fn test_update_existing_only() {
        let mut index = LeafIndex::new(8);
        index.insert(1);
        assert!(index.update(1));
        assert!(!index.update(2));
        assert_eq!(index.updates(), 1);
    }

    #[test]
    fn test_random_inserts_fragment() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut random = LeafIndex::new(16);
        let mut sequential = LeafIndex::new(16);
        for i in 0..5_000u128 {
            random.insert(rng.gen());
            sequential.insert(i);
        }

        let random = random.metrics();
        let sequential = sequential.metrics();
        assert!(random.page_splits > sequential.page_splits);
        assert!(random.fragmentation_percent > 10.0);
        assert!(random.avg_density_percent < sequential.avg_density_percent);
        assert_eq!(sequential.fragmentation_percent, 0.0);
    }

    #[test]
    fn test_keys_stay_sorted() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut index = LeafIndex::new(5);
        for _ in 0..1_000 {
            index.insert(rng.gen_range(0..10_000u128));
        }
        let keys: Vec<u128> = index.keys().collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(keys.len() as u64, index.len());
    }
}
