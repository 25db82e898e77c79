//! Time-range search over block pointers

use crate::core::point::PointId;
use crate::core::temporal::TimeTag;
use crate::storage::block_pointer::{BlockPointer, DataBlock};

/// First pointer owned by `point_id` (pass `PointId::UNALLOCATED` for the first free block)
pub fn find_first(pointers: &[BlockPointer], point_id: PointId) -> Option<&BlockPointer> {
    pointers.iter().find(|p| p.point_id() == point_id)
}

/// Last pointer owned by `point_id`
pub fn find_last(pointers: &[BlockPointer], point_id: PointId) -> Option<&BlockPointer> {
    pointers.iter().rev().find(|p| p.point_id() == point_id)
}

/// Blocks of `point_id` that may hold samples in `[start, end]`, in index order.
///
/// A pointer only records when its block starts, so besides the blocks starting
/// inside the window this also returns the nearest earlier block of the same
/// point, whose samples may run into the window. That block is the last one of
/// the point before the first direct match (or anywhere in the table when
/// nothing matches) with a start time not after `end`. It is not looked for when
/// the window is open on either side. An inverted window (`start > end`)
/// finds nothing.
///
/// The boundary search assumes a point's blocks are laid out in ascending start
/// time. Blocks allocated out of order (backfill) can be missed or misattributed.
pub fn find_range(
    pointers: &[BlockPointer],
    point_id: PointId,
    start: TimeTag,
    end: TimeTag,
) -> Vec<DataBlock> {
    if start > end {
        return Vec::new();
    }

    let mut found: Vec<DataBlock> = Vec::new();
    let mut first_match = None;

    for (position, pointer) in pointers.iter().enumerate() {
        if pointer.matches(point_id, start, end) {
            first_match.get_or_insert(position);
            found.push(pointer.handle());
        }
    }

    if start.is_min() || end.is_max() {
        return found;
    }

    let search_end = first_match.unwrap_or(pointers.len());
    if let Some(boundary) = pointers[..search_end]
        .iter()
        .rev()
        .find(|p| p.matches(point_id, TimeTag::MIN, end))
    {
        found.insert(0, boundary.handle());
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(secs: f64) -> TimeTag {
        TimeTag::new(secs).unwrap()
    }

    fn pid(id: i32) -> PointId {
        PointId::new(id).unwrap()
    }

    fn table(entries: &[(i32, f64)]) -> Vec<BlockPointer> {
        entries
            .iter()
            .enumerate()
            .map(|(index, &(id, start))| {
                let mut pointer = BlockPointer::unallocated(index);
                if id >= 0 {
                    pointer.stamp(pid(id), tag(start));
                }
                pointer
            })
            .collect()
    }

    fn indices(blocks: &[DataBlock]) -> Vec<usize> {
        blocks.iter().map(|b| b.index).collect()
    }

    #[test]
    fn test_boundary_block_precedes_window() {
        let pointers = table(&[(5, 100.0), (5, 200.0), (7, 150.0)]);
        let found = find_range(&pointers, pid(5), tag(150.0), tag(250.0));
        assert_eq!(indices(&found), vec![0, 1]);
    }

    #[test]
    fn test_window_at_start_of_history_is_empty() {
        let pointers = table(&[(5, 100.0), (5, 200.0), (7, 150.0)]);
        let found = find_range(&pointers, pid(5), TimeTag::MIN, tag(90.0));
        assert!(found.is_empty());
    }

    #[test]
    fn test_window_before_any_block_is_empty() {
        let pointers = table(&[(5, 100.0), (5, 200.0)]);
        let found = find_range(&pointers, pid(5), tag(10.0), tag(90.0));
        assert!(found.is_empty());
    }

    #[test]
    fn test_window_inside_single_block_uses_boundary() {
        let pointers = table(&[(5, 100.0), (7, 120.0), (5, 200.0)]);
        let found = find_range(&pointers, pid(5), tag(130.0), tag(180.0));
        assert_eq!(indices(&found), vec![0]);
    }

    #[test]
    fn test_inverted_window_is_empty() {
        let pointers = table(&[(5, 100.0), (5, 200.0)]);
        let found = find_range(&pointers, pid(5), tag(250.0), tag(150.0));
        assert!(found.is_empty());
    }

    #[test]
    fn test_open_window_skips_boundary() {
        let pointers = table(&[(5, 100.0), (5, 200.0)]);
        let found = find_range(&pointers, pid(5), tag(150.0), TimeTag::MAX);
        assert_eq!(indices(&found), vec![1]);

        let found = find_range(&pointers, pid(5), TimeTag::MIN, TimeTag::MAX);
        assert_eq!(indices(&found), vec![0, 1]);
    }

    #[test]
    fn test_backfilled_block_is_not_treated_as_boundary() {
        // Block 1 was allocated after block 0 but starts earlier; the boundary
        // search only looks before the first match and so never sees it.
        let pointers = table(&[(5, 300.0), (5, 100.0)]);
        let found = find_range(&pointers, pid(5), tag(250.0), tag(400.0));
        assert_eq!(indices(&found), vec![0]);
    }

    #[test]
    fn test_find_first_and_last() {
        let pointers = table(&[(5, 100.0), (-1, 0.0), (5, 200.0), (-1, 0.0)]);
        assert_eq!(find_first(&pointers, pid(5)).map(|p| p.index()), Some(0));
        assert_eq!(find_last(&pointers, pid(5)).map(|p| p.index()), Some(2));
        assert_eq!(
            find_first(&pointers, PointId::UNALLOCATED).map(|p| p.index()),
            Some(1)
        );
        assert!(find_last(&pointers, pid(9)).is_none());
    }
}
