//! Uniform grid spatial index.
//!
//! Buckets entity bounding boxes into square cells so the collision resolver
//! only runs exact tests against nearby candidates. Query results are always
//! sorted by id with no duplicates, so callers iterate them deterministically.
//!
//! Entries that would cover more than [`MAX_CELLS`] cells are kept in a
//! separate oversized set and checked on every query, so a tiny cell size or
//! a huge obstacle cannot blow up the cost of a rebuild.

use std::collections::{BTreeMap, BTreeSet};

use crate::components::EntityId;
use crate::geometry::Aabb;
use crate::math::Fixed;

/// At or below this many indexed entities, queries scan every entry instead
/// of walking cells.
pub const LINEAR_SCAN_THRESHOLD: usize = 16;

/// Upper bound on cells walked per query or covered per insert. Larger
/// query areas scan linearly; larger entries go to the oversized set.
pub const MAX_CELLS: i64 = 4096;

type CellKey = (i32, i32);

/// Uniform grid keyed by entity bounding box.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: Fixed,
    cells: BTreeMap<CellKey, Vec<EntityId>>,
    bounds: BTreeMap<EntityId, Aabb>,
    oversized: BTreeSet<EntityId>,
}

impl SpatialGrid {
    /// Create an empty grid. `cell_size` must be positive (checked by config
    /// validation).
    #[must_use]
    pub fn new(cell_size: Fixed) -> Self {
        Self {
            cell_size,
            cells: BTreeMap::new(),
            bounds: BTreeMap::new(),
            oversized: BTreeSet::new(),
        }
    }

    /// Cell size in world units.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    /// Number of indexed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    /// Whether nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Bounds currently stored for an entity.
    #[must_use]
    pub fn bounds(&self, id: EntityId) -> Option<&Aabb> {
        self.bounds.get(&id)
    }

    /// Replace the whole index with the given entries.
    pub fn rebuild<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (EntityId, Aabb)>,
    {
        self.cells.clear();
        self.bounds.clear();
        self.oversized.clear();
        for (id, aabb) in entries {
            self.insert_cells(id, &aabb);
            self.bounds.insert(id, aabb);
        }
    }

    /// Insert or move a single entity.
    pub fn update(&mut self, id: EntityId, aabb: Aabb) {
        self.remove(id);
        self.insert_cells(id, &aabb);
        self.bounds.insert(id, aabb);
    }

    /// Drop an entity from the index. Unknown ids are ignored.
    pub fn remove(&mut self, id: EntityId) {
        let Some(old) = self.bounds.remove(&id) else {
            return;
        };
        if self.oversized.remove(&id) {
            return;
        }
        let (min, max) = self.cell_range(&old);
        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                if let Some(bucket) = self.cells.get_mut(&(cx, cy)) {
                    bucket.retain(|&other| other != id);
                    if bucket.is_empty() {
                        self.cells.remove(&(cx, cy));
                    }
                }
            }
        }
    }

    /// Ids whose bounds intersect `area`, sorted ascending, no duplicates.
    #[must_use]
    pub fn query_region(&self, area: &Aabb) -> Vec<EntityId> {
        let (min, max) = self.cell_range(area);
        if self.bounds.len() <= LINEAR_SCAN_THRESHOLD || cell_count(min, max) > MAX_CELLS {
            return self.query_linear(area);
        }

        let mut found: Vec<EntityId> = self.oversized.iter().copied().collect();
        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                if let Some(bucket) = self.cells.get(&(cx, cy)) {
                    found.extend(bucket.iter().copied());
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        found.retain(|id| {
            self.bounds
                .get(id)
                .is_some_and(|aabb| aabb.intersects(area))
        });
        found
    }

    /// Brute-force query over every entry. Same results as [`query_region`](Self::query_region).
    #[must_use]
    pub fn query_linear(&self, area: &Aabb) -> Vec<EntityId> {
        self.bounds
            .iter()
            .filter(|(_, aabb)| aabb.intersects(area))
            .map(|(&id, _)| id)
            .collect()
    }

    fn insert_cells(&mut self, id: EntityId, aabb: &Aabb) {
        let (min, max) = self.cell_range(aabb);
        if cell_count(min, max) > MAX_CELLS {
            self.oversized.insert(id);
            return;
        }
        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                self.cells.entry((cx, cy)).or_default().push(id);
            }
        }
    }

    fn cell_of(&self, x: Fixed, y: Fixed) -> CellKey {
        let cell = |v: Fixed| v.saturating_div(self.cell_size).floor().saturating_to_num::<i32>();
        (cell(x), cell(y))
    }

    fn cell_range(&self, aabb: &Aabb) -> (CellKey, CellKey) {
        (
            self.cell_of(aabb.min.x, aabb.min.y),
            self.cell_of(aabb.max.x, aabb.max.y),
        )
    }
}

fn cell_count(min: CellKey, max: CellKey) -> i64 {
    (i64::from(max.0) - i64::from(min.0) + 1).saturating_mul(i64::from(max.1) - i64::from(min.1) + 1)
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(Fixed::from_num(64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2Fixed;

    fn square(x: i32, y: i32, half: i32) -> Aabb {
        Aabb::around_circle(Vec2Fixed::from_ints(x, y), Fixed::from_num(half))
    }

    fn crowded() -> Vec<(EntityId, Aabb)> {
        (0..40u64)
            .map(|i| {
                let x = ((i * 37) % 500) as i32;
                let y = ((i * 53) % 400) as i32;
                (i + 1, square(x, y, 5 + (i % 7) as i32))
            })
            .collect()
    }

    #[test]
    fn test_query_finds_overlapping_only() {
        let mut grid = SpatialGrid::new(Fixed::from_num(10));
        grid.rebuild(vec![(1, square(5, 5, 2)), (2, square(50, 50, 2))]);
        assert_eq!(grid.query_region(&square(6, 6, 1)), vec![1]);
        assert!(grid.query_region(&square(30, 30, 1)).is_empty());
    }

    #[test]
    fn test_spanning_entity_reported_once() {
        let mut grid = SpatialGrid::new(Fixed::from_num(4));
        let mut entries = crowded();
        // A large box covering many cells.
        entries.push((100, square(100, 100, 30)));
        grid.rebuild(entries);
        let hits = grid.query_region(&square(100, 100, 20));
        assert_eq!(hits.iter().filter(|&&id| id == 100).count(), 1);
        let mut sorted = hits.clone();
        sorted.sort_unstable();
        assert_eq!(hits, sorted);
    }

    #[test]
    fn test_grid_matches_linear_scan() {
        let mut grid = SpatialGrid::new(Fixed::from_num(32));
        grid.rebuild(crowded());
        assert!(grid.len() > LINEAR_SCAN_THRESHOLD);
        for (x, y, half) in [(0, 0, 50), (250, 200, 80), (480, 10, 15), (-20, -20, 5)] {
            let area = square(x, y, half);
            assert_eq!(grid.query_region(&area), grid.query_linear(&area));
        }
    }

    #[test]
    fn test_incremental_update_matches_rebuild() {
        let mut incremental = SpatialGrid::new(Fixed::from_num(25));
        incremental.rebuild(crowded());
        incremental.update(3, square(10, 10, 4));
        incremental.remove(7);
        incremental.update(200, square(300, 300, 9));

        let mut entries: Vec<_> = crowded()
            .into_iter()
            .filter(|(id, _)| *id != 7)
            .map(|(id, aabb)| if id == 3 { (id, square(10, 10, 4)) } else { (id, aabb) })
            .collect();
        entries.push((200, square(300, 300, 9)));
        let mut rebuilt = SpatialGrid::new(Fixed::from_num(25));
        rebuilt.rebuild(entries);

        for area in [square(10, 10, 20), square(300, 300, 40), square(200, 150, 300)] {
            assert_eq!(incremental.query_region(&area), rebuilt.query_region(&area));
        }
        assert_eq!(incremental.len(), rebuilt.len());
    }

    #[test]
    fn test_tiny_cells_keep_large_entries_out_of_the_grid() {
        let mut grid = SpatialGrid::new(Fixed::from_num(0.05));
        let mut entries = crowded();
        entries.push((100, square(300, 300, 100)));
        grid.rebuild(entries);

        assert!(grid.oversized.contains(&100));
        assert!(grid.cells.len() <= 40 * MAX_CELLS as usize);
        let area = square(300, 300, 1);
        assert!(grid.query_region(&area).contains(&100));
        assert_eq!(grid.query_region(&area), grid.query_linear(&area));

        grid.update(100, square(5, 5, 1));
        assert!(!grid.oversized.contains(&100));
        assert_eq!(grid.query_region(&square(5, 5, 1)), grid.query_linear(&square(5, 5, 1)));
        grid.remove(100);
        assert!(!grid.query_region(&area).contains(&100));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut grid = SpatialGrid::default();
        grid.remove(42);
        assert!(grid.is_empty());
    }
}
