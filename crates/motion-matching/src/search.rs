//! Nearest-neighbour search over the normalized feature matrix.
//!
//! The pruned search walks every range in blocks. A coarse (64 frame) box
//! whose clamped distance to the query already reaches the best cost is
//! skipped whole, then the same test is repeated for fine (16 frame) boxes,
//! and only surviving frames are compared feature by feature. Every cost sum
//! stops as soon as it reaches the best cost. Because each skipped block or
//! aborted sum could never have produced a strictly lower cost, the result
//! is identical to [`search_brute_force`].

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

use crate::database::{BOUND_LARGE_SIZE, BOUND_SMALL_SIZE, Database};

/// Tunables of a single search
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde-support", serde(default))]
pub struct SearchParams {
    /// Added to the cost of every candidate other than the incumbent
    pub transition_cost: f32,
    /// Frames at the end of each range that are never returned
    pub ignore_range_end: usize,
    /// Candidates closer than this to the incumbent are skipped
    pub ignore_surrounding: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            transition_cost: 0.0,
            ignore_range_end: 20,
            ignore_surrounding: 20,
        }
    }
}

/// Best frame found by a search and its cost
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub index: usize,
    pub cost: f32,
}

#[inline]
fn squared_distance(query: &[f32], row: &[f32]) -> f32 {
    let mut cost = 0.0;
    for (q, f) in query.iter().zip(row) {
        let d = q - f;
        cost += d * d;
    }
    cost
}

/// Lower bound of the cost of any frame inside a box, summed from
/// `transition_cost` and abandoned once it reaches `best_cost`
#[inline]
fn box_cost(query: &[f32], min: &[f32], max: &[f32], transition_cost: f32, best_cost: f32) -> f32 {
    let mut cost = transition_cost;
    for ((&q, &lo), &hi) in query.iter().zip(min).zip(max) {
        let d = q - q.clamp(lo, hi);
        cost += d * d;
        if cost >= best_cost {
            break;
        }
    }
    cost
}

#[inline]
fn frame_cost(query: &[f32], row: &[f32], transition_cost: f32, best_cost: f32) -> f32 {
    let mut cost = transition_cost;
    for (q, f) in query.iter().zip(row) {
        let d = q - f;
        cost += d * d;
        if cost >= best_cost {
            break;
        }
    }
    cost
}

#[inline]
fn is_surrounding(frame: usize, current: Option<usize>, ignore_surrounding: usize) -> bool {
    current.is_some_and(|c| frame.abs_diff(c) < ignore_surrounding)
}

fn incumbent(
    db: &Database,
    query: &[f32],
    current: Option<usize>,
) -> (Option<usize>, f32) {
    match current {
        Some(index) => (Some(index), squared_distance(query, db.features().row(index))),
        None => (None, f32::INFINITY),
    }
}

/// Pruned search for the frame closest to a normalized query.
///
/// With an incumbent `current` frame, its exact cost (without transition
/// cost) is the bar to beat and it is returned when nothing is strictly
/// better. Without one, `None` means every range was too short to search.
pub fn search(
    db: &Database,
    query: &[f32],
    current: Option<usize>,
    params: &SearchParams,
) -> Option<SearchResult> {
    let features = db.features();
    let bounds = db.bounds();
    let (mut best_index, mut best_cost) = incumbent(db, query, current);

    for range in db.ranges() {
        let mut i = range.start;
        let range_end = range.end.saturating_sub(params.ignore_range_end);

        while i < range_end {
            let i_lr = i / BOUND_LARGE_SIZE;
            let i_lr_next = (i_lr + 1) * BOUND_LARGE_SIZE;

            let cost = box_cost(
                query,
                bounds.large_min.row(i_lr),
                bounds.large_max.row(i_lr),
                params.transition_cost,
                best_cost,
            );
            if cost >= best_cost {
                i = i_lr_next;
                continue;
            }

            while i < i_lr_next && i < range_end {
                let i_sm = i / BOUND_SMALL_SIZE;
                let i_sm_next = (i_sm + 1) * BOUND_SMALL_SIZE;

                let cost = box_cost(
                    query,
                    bounds.small_min.row(i_sm),
                    bounds.small_max.row(i_sm),
                    params.transition_cost,
                    best_cost,
                );
                if cost >= best_cost {
                    i = i_sm_next;
                    continue;
                }

                while i < i_sm_next && i < range_end {
                    if !is_surrounding(i, current, params.ignore_surrounding) {
                        let cost = frame_cost(query, features.row(i), params.transition_cost, best_cost);
                        if cost < best_cost {
                            best_index = Some(i);
                            best_cost = cost;
                        }
                    }
                    i += 1;
                }
            }
        }
    }

    best_index.map(|index| SearchResult {
        index,
        cost: best_cost,
    })
}

/// Reference scan of every candidate frame with the same semantics as
/// [`search`]
pub fn search_brute_force(
    db: &Database,
    query: &[f32],
    current: Option<usize>,
    params: &SearchParams,
) -> Option<SearchResult> {
    let features = db.features();
    let (mut best_index, mut best_cost) = incumbent(db, query, current);

    for range in db.ranges() {
        let range_end = range.end.saturating_sub(params.ignore_range_end);
        for i in range.start..range_end {
            if is_surrounding(i, current, params.ignore_surrounding) {
                continue;
            }
            let mut cost = params.transition_cost;
            for (q, f) in query.iter().zip(features.row(i)) {
                let d = q - f;
                cost += d * d;
            }
            if cost < best_cost {
                best_index = Some(i);
                best_cost = cost;
            }
        }
    }

    best_index.map(|index| SearchResult {
        index,
        cost: best_cost,
    })
}

impl Database {
    /// Normalize a raw query and run the pruned search
    pub fn search(
        &self,
        query: &[f32],
        current: Option<usize>,
        params: &SearchParams,
    ) -> Option<SearchResult> {
        let mut normalized = vec![0.0; self.feature_count()];
        self.normalize_query(query, &mut normalized);
        search(self, &normalized, current, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{Array1D, Array2D};
    use crate::features::{FeatureGroup, FeatureLayout};
    use glam::{Quat, Vec3};

    fn database_with_features(ranges: &[(usize, usize)], rows: &[[f32; 3]]) -> Database {
        let frames = rows.len();
        let mut db = Database::from_parts(
            Array2D::new(frames, 1),
            Array2D::new(frames, 1),
            Array2D::from_vec(frames, 1, vec![Quat::IDENTITY; frames]),
            Array2D::<Vec3>::new(frames, 1),
            Array1D::from_vec(vec![-1]),
            Array1D::from_vec(ranges.iter().map(|r| r.0).collect()),
            Array1D::from_vec(ranges.iter().map(|r| r.1).collect()),
            Array2D::new(frames, 0),
        )
        .unwrap();
        db.set_features(
            FeatureLayout::new(&[(FeatureGroup::BonePosition(0), 1.0)]),
            Array2D::from_vec(frames, 3, rows.iter().flatten().copied().collect()),
            Array1D::from_vec(vec![0.0; 3]),
            Array1D::from_vec(vec![1.0; 3]),
        )
        .unwrap();
        db
    }

    #[test]
    fn test_ties_keep_earliest_frame() {
        let rows = vec![[1.0, 1.0, 1.0]; 40];
        let db = database_with_features(&[(0, 40)], &rows);
        let params = SearchParams {
            ignore_range_end: 0,
            ..SearchParams::default()
        };
        let result = search(&db, &[0.0; 3], None, &params).unwrap();
        assert_eq!(result.index, 0);
        assert_eq!(result.cost, 3.0);
    }

    #[test]
    fn test_range_end_is_excluded() {
        let mut rows = vec![[5.0, 5.0, 5.0]; 40];
        rows[35] = [0.0, 0.0, 0.0];
        let db = database_with_features(&[(0, 40)], &rows);
        let result = search(&db, &[0.0; 3], None, &SearchParams::default()).unwrap();
        assert_ne!(result.index, 35);
        assert!(result.index < 20);
    }

    #[test]
    fn test_incumbent_kept_when_nothing_better() {
        let mut rows = vec![[2.0, 0.0, 0.0]; 64];
        rows[3] = [0.5, 0.0, 0.0];
        let db = database_with_features(&[(0, 64)], &rows);
        let result = search(&db, &[0.0; 3], Some(3), &SearchParams::default()).unwrap();
        assert_eq!(result.index, 3);
        assert_eq!(result.cost, 0.25);
    }

    #[test]
    fn test_surrounding_frames_skipped() {
        let mut rows = vec![[3.0, 0.0, 0.0]; 64];
        rows[10] = [1.0, 0.0, 0.0];
        rows[12] = [0.0, 0.0, 0.0];
        let db = database_with_features(&[(0, 64)], &rows);
        let params = SearchParams {
            ignore_surrounding: 5,
            ..SearchParams::default()
        };
        // frame 12 is within 5 of the incumbent and may not be chosen
        let result = search(&db, &[0.0; 3], Some(10), &params).unwrap();
        assert_eq!(result.index, 10);
    }

    #[test]
    fn test_transition_cost_applies_to_candidates_only() {
        let mut rows = vec![[1.0, 0.0, 0.0]; 64];
        rows[40] = [0.0, 0.0, 0.0];
        let db = database_with_features(&[(0, 64)], &rows);
        let params = SearchParams {
            transition_cost: 2.0,
            ignore_range_end: 0,
            ignore_surrounding: 0,
        };
        let result = search(&db, &[0.0; 3], Some(0), &params).unwrap();
        assert_eq!(result.index, 0);
        assert_eq!(result.cost, 1.0);
    }

    #[test]
    fn test_short_ranges_yield_nothing() {
        let rows = vec![[0.0, 0.0, 0.0]; 30];
        let db = database_with_features(&[(0, 15), (15, 30)], &rows);
        assert_eq!(search(&db, &[0.0; 3], None, &SearchParams::default()), None);
        assert_eq!(
            search_brute_force(&db, &[0.0; 3], None, &SearchParams::default()),
            None
        );
    }
}
