//! Parallel point location.
//!
//! `locate_points` runs five steps:
//!
//! 1. every query point is tagged with each rank whose source box contains it;
//! 2. the candidate rows are routed to those ranks;
//! 3. each rank tests its candidates against the elements of one KD-tree leaf
//!    (box pre-filter, inverse map, parametric inside test) and records hits
//!    in its mapped-point table;
//! 4. one result row per candidate (mapped index or `-1`) is routed back;
//! 5. the asking rank keeps the first claim per point, except that a claim by
//!    itself replaces an earlier claim by another rank.
//!
//! Points no rank claims are counted in the returned [`LocateReport`] and
//! left unset in the [`LocatedPointTable`]; this is never an error.

use super::bbox_exchange::box_tolerance;
use super::{Coupler, phase};
use crate::algs::communicator::Communicator;
use crate::algs::crystal::CrystalRouter;
use crate::algs::tuple_list::TupleList;
use crate::data::mesh::MeshStore;
use crate::geometry::element_map::Vec3;
use crate::mesh_error::CouplerError;
use crate::topology::entity::EntityHandle;
use log::{debug, warn};

/// Sentinel mapped index of a failed local test.
const NOT_FOUND: i32 = -1;

/// A point mapped into one of this rank's source elements.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MappedPoint {
    /// Index into the source index's elements.
    pub element: usize,
    /// Handle of that element.
    pub handle: EntityHandle,
    /// Natural coordinates inside the element.
    pub natural: Vec3,
}

/// Where a query point was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PointLocation {
    /// Rank owning the containing element.
    pub rank: usize,
    /// Index into that rank's mapped-point table.
    pub mapped_index: usize,
}

/// One entry per query point, in query order; `None` means "not found".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocatedPointTable {
    entries: Vec<Option<PointLocation>>,
}

impl LocatedPointTable {
    fn unset(n: usize) -> Self {
        Self {
            entries: vec![None; n],
        }
    }

    /// Number of query points.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<PointLocation> {
        self.entries.get(i).copied().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<PointLocation>> + '_ {
        self.entries.iter().copied()
    }

    pub fn located_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn unlocated_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.is_none().then_some(i))
            .collect()
    }

    /// Records a claim for point `i`; keeps an earlier claim unless the new
    /// one is by `me` and the earlier one is not.
    fn claim(&mut self, i: usize, loc: PointLocation, me: usize) {
        let slot = &mut self.entries[i];
        match slot {
            None => *slot = Some(loc),
            Some(prev) if prev.rank != me && loc.rank == me => *slot = Some(loc),
            Some(_) => {}
        }
    }
}

/// Outcome counts of one `locate_*` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocateReport {
    pub located: usize,
    pub unlocated: usize,
    pub unlocated_indices: Vec<usize>,
}

impl LocateReport {
    pub fn all_located(&self) -> bool {
        self.unlocated == 0
    }

    /// Turns unlocated points into an error for callers that need them all.
    pub fn require_all(&self) -> Result<(), CouplerError> {
        if self.all_located() {
            Ok(())
        } else {
            Err(CouplerError::NotLocated {
                count: self.unlocated,
            })
        }
    }
}

impl<C: Communicator> Coupler<'_, C> {
    /// Locates `points` in the distributed source elements. Collective.
    ///
    /// Box tests use tolerance `abs_eps` if positive, else `rel_eps` times
    /// the box diagonal. A positive tolerance also switches the local search
    /// to the nearest KD-tree leaf within that distance.
    pub fn locate_points(
        &mut self,
        points: &[Vec3],
        rel_eps: f64,
        abs_eps: f64,
    ) -> Result<LocateReport, CouplerError> {
        self.mapped.clear();
        let me = self.comm.rank();

        let mut candidates = TupleList::new(2, 0, 0, 3, points.len());
        for (i, p) in points.iter().enumerate() {
            for rank in self.source.candidate_ranks(p, rel_eps, abs_eps) {
                candidates.push(&[rank as i32, i as i32], &[], &[], p)?;
            }
        }
        let sent = candidates.len();
        CrystalRouter::new(self.comm, self.tag(phase::CANDIDATES)).transfer(&mut candidates, 0)?;

        let tol = box_tolerance(self.source.local_box(), rel_eps, abs_eps);
        let mut results = TupleList::new(3, 0, 0, 0, candidates.len());
        for row in 0..candidates.len() {
            let (origin, idx) = (candidates.ints(row)[0], candidates.ints(row)[1]);
            let r = candidates.reals(row);
            let mapped = match self.find_local(&[r[0], r[1], r[2]], tol) {
                Some(point) => {
                    self.mapped.push(point);
                    (self.mapped.len() - 1) as i32
                }
                None => NOT_FOUND,
            };
            results.push(&[origin, idx, mapped], &[], &[], &[])?;
        }
        debug!(
            "rank {me}: sent {sent} candidates, mapped {} of {} received",
            self.mapped.len(),
            candidates.len()
        );
        CrystalRouter::new(self.comm, self.tag(phase::RESULTS)).transfer(&mut results, 0)?;

        let mut table = LocatedPointTable::unset(points.len());
        for row in 0..results.len() {
            let [claimer, idx, mapped] = [0, 1, 2].map(|c| results.ints(row)[c]);
            if mapped == NOT_FOUND {
                continue;
            }
            let i = usize::try_from(idx)
                .ok()
                .filter(|&i| i < points.len())
                .ok_or_else(|| CouplerError::Wire(format!("result for unknown point {idx}")))?;
            let loc = PointLocation {
                rank: claimer as usize,
                mapped_index: mapped as usize,
            };
            table.claim(i, loc, me);
        }

        let unlocated_indices = table.unlocated_indices();
        let report = LocateReport {
            located: points.len() - unlocated_indices.len(),
            unlocated: unlocated_indices.len(),
            unlocated_indices,
        };
        if report.unlocated > 0 {
            warn!(
                "rank {me}: {} of {} points not located in any source element",
                report.unlocated,
                points.len()
            );
        }
        self.located = table;
        Ok(report)
    }

    /// Locates the centroid of each entity (vertex position, or the mean of
    /// an element's vertices). Collective.
    ///
    /// If a centroid cannot be computed, this rank still takes part in the
    /// search with no points of its own and then returns the error.
    pub fn locate_entities<M: MeshStore>(
        &mut self,
        mesh: &M,
        entities: &[EntityHandle],
        rel_eps: f64,
        abs_eps: f64,
    ) -> Result<LocateReport, CouplerError> {
        match entities
            .iter()
            .map(|&e| mesh.centroid(e))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(points) => self.locate_points(&points, rel_eps, abs_eps),
            Err(err) => {
                self.locate_points(&[], rel_eps, abs_eps)?;
                Err(err)
            }
        }
    }

    /// Tests `p` against the local elements of one KD-tree leaf.
    ///
    /// Evaluation failures only disqualify the element at hand.
    fn find_local(&self, p: &Vec3, tol: f64) -> Option<MappedPoint> {
        let tree = self.source.tree();
        let leaf = if tol > 0.0 {
            tree.distance_search(p, tol)
        } else {
            tree.point_search(p)
        };
        let cfg = &self.config;
        for &i in leaf {
            let map = &self.source.maps()[i];
            if !map.inside_box(p, tol) {
                continue;
            }
            let Ok(xi) = map.ievaluate_with(p, cfg.newton_tolerance, cfg.max_newton_iterations)
            else {
                continue;
            };
            if map.inside_nat_space(&xi, cfg.inside_tolerance) {
                return Some(MappedPoint {
                    element: i,
                    handle: self.source.elements()[i],
                    natural: xi,
                });
            }
        }
        None
    }
}
