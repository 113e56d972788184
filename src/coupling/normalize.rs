//! Field normalization over entity-set groups.
//!
//! Entity sets below a root are grouped by the values of selector integer
//! tags. The group list is consolidated across ranks so every rank sees the
//! same groups in the same order, even for groups it holds no sets of. Each
//! group's field integral is summed over ranks on rank 0, inverted (a zero
//! integral gives factor 0), broadcast, and written to tag `"<tag>_normf"` on
//! the group's sets.

use super::bbox_exchange::element_map;
use super::interpolate::element_value;
use super::{Coupler, Method, norm_factor_tag, phase};
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::{all_to_all_bytes, broadcast_bytes, reduce_sum_f64};
use crate::algs::tuple_list::TupleList;
use crate::algs::wire::{bytes_to_words, words_to_bytes};
use crate::data::mesh::MeshStore;
use crate::mesh_error::CouplerError;
use crate::topology::cell_type::CellType;
use crate::topology::entity::EntityHandle;
use log::{debug, warn};

const ELEMENT_TYPES: [CellType; 4] = [
    CellType::Edge,
    CellType::Quadrilateral,
    CellType::Tetrahedron,
    CellType::Hexahedron,
];

/// Globally consistent groups and this rank's sets in each.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchingGroups {
    /// Selector values of each group, identical on every rank.
    pub keys: Vec<Vec<i32>>,
    /// Local entity sets of each group (possibly empty).
    pub sets: Vec<Vec<EntityHandle>>,
}

impl MatchingGroups {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Gathers every rank's rows on rank 0, sorts and de-duplicates them, and
/// broadcasts the result. Collective.
///
/// Uses `tag` and `tag.offset(1)` for the gather and `tag.offset(2)`,
/// `tag.offset(3)` for the broadcast. If rank 0 cannot merge the gathered
/// rows it broadcasts an empty payload, and every other rank reports
/// [`CouplerError::PeerFailure`].
pub fn consolidate_tuples<C: Communicator>(
    comm: &C,
    local: &TupleList,
    tag: CommTag,
) -> Result<TupleList, CouplerError> {
    let mut outgoing = vec![Vec::new(); comm.size()];
    outgoing[0] = words_to_bytes(&local.pack());
    let incoming = all_to_all_bytes(comm, tag, outgoing)?;
    if comm.rank() == 0 {
        let merged = merge_packed(local, &incoming);
        let packed = match &merged {
            Ok(merged) => words_to_bytes(&merged.pack()),
            Err(_) => Vec::new(),
        };
        broadcast_bytes(comm, tag.offset(2), 0, &packed)?;
        return merged;
    }
    let bytes = broadcast_bytes(comm, tag.offset(2), 0, &[])?;
    if bytes.is_empty() {
        return Err(CouplerError::PeerFailure { ranks: vec![0] });
    }
    TupleList::unpack(&bytes_to_words(&bytes)?)
}

fn merge_packed(local: &TupleList, incoming: &[Vec<u8>]) -> Result<TupleList, CouplerError> {
    let mut merged = local.empty_like();
    for bytes in incoming.iter().filter(|b| !b.is_empty()) {
        merged.append(&TupleList::unpack(&bytes_to_words(bytes)?)?)?;
    }
    merged.sort_dedup();
    Ok(merged)
}

/// Groups the entity sets below `root` by their `selector_tags` values.
/// Collective.
///
/// A set qualifies when it carries every selector tag and each value equals
/// the matching entry of `selector_values` (`None` matches anything). With
/// no selectors, `root` forms the only group.
pub fn get_matching_entities<C: Communicator, M: MeshStore>(
    comm: &C,
    mesh: &M,
    root: EntityHandle,
    selector_tags: &[&str],
    selector_values: &[Option<i32>],
    tag: CommTag,
) -> Result<MatchingGroups, CouplerError> {
    let (groups, local_err) =
        matching_groups(comm, mesh, root, selector_tags, selector_values, tag)?;
    match local_err {
        Some(err) => Err(err),
        None => Ok(groups),
    }
}

/// [`get_matching_entities`] that still completes the consolidation when
/// the local set scan fails, handing that error back separately.
fn matching_groups<C: Communicator, M: MeshStore>(
    comm: &C,
    mesh: &M,
    root: EntityHandle,
    selector_tags: &[&str],
    selector_values: &[Option<i32>],
    tag: CommTag,
) -> Result<(MatchingGroups, Option<CouplerError>), CouplerError> {
    if selector_tags.len() != selector_values.len() {
        return Err(CouplerError::LengthMismatch {
            what: "selector values",
            expected: selector_tags.len(),
            found: selector_values.len(),
        });
    }
    if selector_tags.is_empty() {
        let groups = MatchingGroups {
            keys: vec![Vec::new()],
            sets: vec![vec![root]],
        };
        return Ok((groups, None));
    }

    let mut local = TupleList::new(selector_tags.len(), 0, 0, 0, 0);
    let mut matched: Vec<(Vec<i32>, EntityHandle)> = Vec::new();
    let (candidates, local_err) = match mesh.sets_under(root) {
        Ok(sets) => (sets, None),
        Err(err) => (Vec::new(), Some(err)),
    };
    for set in candidates {
        let Some(values) = selector_tags
            .iter()
            .map(|t| mesh.int_tag(t, set))
            .collect::<Option<Vec<i32>>>()
        else {
            continue;
        };
        let selected = values
            .iter()
            .zip(selector_values)
            .all(|(v, want)| want.is_none_or(|w| w == *v));
        if selected {
            local.push(&values, &[], &[], &[])?;
            matched.push((values, set));
        }
    }
    local.sort_dedup();

    let global = consolidate_tuples(comm, &local, tag)?;
    let keys: Vec<Vec<i32>> = (0..global.len()).map(|r| global.ints(r).to_vec()).collect();
    let sets = keys
        .iter()
        .map(|key| {
            matched
                .iter()
                .filter(|(values, _)| values == key)
                .map(|&(_, set)| set)
                .collect()
        })
        .collect();
    debug!(
        "rank {}: {} local sets in {} global groups",
        comm.rank(),
        matched.len(),
        keys.len()
    );
    Ok((MatchingGroups { keys, sets }, local_err))
}

/// Writes `factors[g]` to `"<tag>_normf"` on every set of group `g`.
pub fn apply_group_norm_factor<M: MeshStore>(
    mesh: &mut M,
    groups: &[Vec<EntityHandle>],
    factors: &[f64],
    tag: &str,
) -> Result<(), CouplerError> {
    if groups.len() != factors.len() {
        return Err(CouplerError::LengthMismatch {
            what: "normalization factors",
            expected: groups.len(),
            found: factors.len(),
        });
    }
    let name = norm_factor_tag(tag);
    for (sets, &factor) in groups.iter().zip(factors) {
        for &set in sets {
            mesh.tag_set(&name, set, &[factor])?;
        }
    }
    Ok(())
}

impl<C: Communicator> Coupler<'_, C> {
    /// Normalizes field `tag` over everything below `root`. Collective.
    ///
    /// Returns the factor written to `root`. Later calls to
    /// [`Coupler::interpolate`] with `normalize` read the factor from `root`.
    pub fn normalize_mesh<M: MeshStore>(
        &mut self,
        mesh: &mut M,
        root: EntityHandle,
        tag: &str,
        integ_type: Method,
        order: usize,
    ) -> Result<f64, CouplerError> {
        let factors = self.normalize_subset(mesh, root, tag, &[], &[], integ_type, order)?;
        self.norm_sets.insert(tag.to_string(), root);
        Ok(factors.first().copied().unwrap_or(0.0))
    }

    /// Normalizes field `tag` separately over each group of entity sets
    /// selected by `selector_tags`/`selector_values`. Collective.
    ///
    /// Returns one factor per group, in the global group order. A rank whose
    /// local integration fails still takes part in the reduction; it returns
    /// its own error, every other rank returns [`CouplerError::PeerFailure`],
    /// and no factors are written anywhere.
    #[allow(clippy::too_many_arguments)]
    pub fn normalize_subset<M: MeshStore>(
        &mut self,
        mesh: &mut M,
        root: EntityHandle,
        tag: &str,
        selector_tags: &[&str],
        selector_values: &[Option<i32>],
        integ_type: Method,
        order: usize,
    ) -> Result<Vec<f64>, CouplerError> {
        let (groups, mut local_err) = matching_groups(
            self.comm,
            &*mesh,
            root,
            selector_tags,
            selector_values,
            self.tag(phase::CONSOLIDATE),
        )?;
        let (me, size) = (self.comm.rank(), self.comm.size());
        let ng = groups.len();

        // Group integrals, then one failure flag per rank.
        let mut contribution = vec![0.0; ng + size];
        if local_err.is_none() {
            for (g, sets) in groups.sets.iter().enumerate() {
                match self.integrate_sets(&*mesh, sets, tag, integ_type, order) {
                    Ok(v) => contribution[g] = v,
                    Err(err) => {
                        local_err = Some(err);
                        break;
                    }
                }
            }
        }
        if local_err.is_some() {
            contribution[ng + me] = 1.0;
        }

        let totals = reduce_sum_f64(self.comm, self.tag(phase::REDUCE), 0, &contribution)?;
        let encoded: Vec<u8> = match totals {
            Some(totals) => {
                let (integrals, flags) = totals.split_at(ng);
                let failed = flags.iter().any(|&f| f != 0.0);
                integrals
                    .iter()
                    .enumerate()
                    .map(|(g, &total)| {
                        if total != 0.0 {
                            1.0 / total
                        } else {
                            if !failed {
                                warn!("group {g} of `{tag}` integrates to zero; normalization factor set to 0");
                            }
                            0.0
                        }
                    })
                    .chain(flags.iter().copied())
                    .flat_map(f64::to_le_bytes)
                    .collect()
            }
            None => Vec::new(),
        };
        let bytes = broadcast_bytes(self.comm, self.tag(phase::FACTORS), 0, &encoded)?;
        if let Some(err) = local_err {
            return Err(err);
        }
        if bytes.len() != (ng + size) * 8 {
            return Err(CouplerError::comm(
                0,
                format!("expected {} factors, got {} bytes", ng, bytes.len()),
            ));
        }
        let decoded: Vec<f64> = bytes
            .chunks_exact(8)
            .map(|c| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(c);
                f64::from_le_bytes(raw)
            })
            .collect();
        let (factors, flags) = decoded.split_at(ng);
        let failed: Vec<usize> = flags
            .iter()
            .enumerate()
            .filter_map(|(rank, &f)| (f != 0.0).then_some(rank))
            .collect();
        if !failed.is_empty() {
            return Err(CouplerError::PeerFailure { ranks: failed });
        }
        apply_group_norm_factor(mesh, &groups.sets, factors, tag)?;
        Ok(factors.to_vec())
    }

    /// Local integral of field `tag` over the elements below `sets`, each
    /// element counted once.
    fn integrate_sets<M: MeshStore>(
        &mut self,
        mesh: &M,
        sets: &[EntityHandle],
        tag: &str,
        method: Method,
        order: usize,
    ) -> Result<f64, CouplerError> {
        let mut elements = Vec::new();
        for &set in sets {
            for ty in ELEMENT_TYPES {
                elements.extend(mesh.entities_under(set, ty)?);
            }
        }
        elements.sort_unstable();
        elements.dedup();

        let mut total = 0.0;
        for e in elements {
            let map = element_map(mesh, e, &self.config, &mut self.lagrange)?;
            total += match method {
                Method::Constant => element_value(mesh, tag, e)? * map.measure_total(order)?,
                Method::LinearFe | Method::QuadraticFe => {
                    map.integrate_scalar_field(&mesh.vertex_values(tag, e)?, order)?
                }
                Method::Spectral => map.integrate_scalar_field(mesh.tag_get(tag, e)?, order)?,
            };
        }
        Ok(total)
    }
}
