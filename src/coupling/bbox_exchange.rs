//! Source index: local element maps, their KD-tree and every rank's box.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::all_gather_bytes;
use crate::algs::wire::{WireBox, cast_slice, cast_slice_mut, expect_exact_len};
use crate::config::{CouplerConfig, SPECTRAL_COORD_TAGS};
use crate::data::mesh::MeshStore;
use crate::geometry::bbox::BoundingBox;
use crate::geometry::element_map::{ElementMap, Vec3};
use crate::geometry::kd_tree::KdTree;
use crate::geometry::quadrature::LagrangeCache;
use crate::mesh_error::CouplerError;
use crate::topology::cell_type::CellType;
use crate::topology::entity::EntityHandle;
use bytemuck::Zeroable;
use log::{debug, warn};
use std::mem::size_of;

/// Box membership tolerance: `abs_eps` if positive, else `rel_eps` times the
/// box diagonal.
pub fn box_tolerance(b: &BoundingBox, rel_eps: f64, abs_eps: f64) -> f64 {
    if abs_eps > 0.0 {
        abs_eps
    } else {
        rel_eps * b.diagonal_length()
    }
}

fn fixed<const N: usize>(pts: &[Vec3]) -> Option<[Vec3; N]> {
    pts.try_into().ok()
}

/// Spectral node coordinates of `e` from the `SEM_*` tags, or `None` when
/// the element carries no such tags.
fn spectral_nodes<M: MeshStore>(
    mesh: &M,
    e: EntityHandle,
    expected: usize,
) -> Result<Option<Vec<Vec3>>, CouplerError> {
    let mut axes: [&[f64]; 3] = [&[]; 3];
    for (axis, name) in axes.iter_mut().zip(SPECTRAL_COORD_TAGS) {
        match mesh.tag_get(name, e) {
            Ok(values) if values.len() == expected => *axis = values,
            Ok(values) => {
                return Err(CouplerError::TagLength {
                    tag: name.to_string(),
                    handle: e,
                    expected,
                    found: values.len(),
                });
            }
            Err(CouplerError::MissingTag { .. }) => return Ok(None),
            Err(err) => return Err(err),
        }
    }
    Ok(Some(
        (0..expected)
            .map(|i| [axes[0][i], axes[1][i], axes[2][i]])
            .collect(),
    ))
}

/// Element map of `e`, chosen by cell type and node count.
///
/// With a spectral order configured, quads and hexes carrying the spectral
/// coordinate tags are mapped as spectral elements.
pub fn element_map<M: MeshStore>(
    mesh: &M,
    e: EntityHandle,
    config: &CouplerConfig,
    cache: &mut LagrangeCache,
) -> Result<ElementMap, CouplerError> {
    let ty = mesh.entity_type(e)?;
    if let Some(order) = config.spectral_order {
        let per_element = match ty {
            CellType::Quadrilateral => Some(order * order),
            CellType::Hexahedron => Some(order * order * order),
            _ => None,
        };
        if let Some(expected) = per_element {
            if let Some(nodes) = spectral_nodes(mesh, e, expected)? {
                let table = cache.table(order);
                let map = if ty == CellType::Hexahedron {
                    ElementMap::spectral_hex(table, nodes)?
                } else {
                    ElementMap::spectral_quad(table, nodes)?
                };
                return Ok(map);
            }
        }
    }
    let pts = mesh.element_coords(e)?;
    let map = match (ty, pts.len()) {
        (CellType::Edge, 2) => fixed(&pts).map(ElementMap::linear_edge),
        (CellType::Quadrilateral, 4) => fixed(&pts).map(ElementMap::linear_quad),
        (CellType::Tetrahedron, 4) => fixed(&pts).map(ElementMap::linear_tet),
        (CellType::Hexahedron, 8) => fixed(&pts).map(ElementMap::linear_hex),
        (CellType::Hexahedron, 27) => ElementMap::quadratic_hex(&pts).ok(),
        _ => None,
    };
    map.ok_or(CouplerError::UnsupportedElement {
        handle: e,
        cell_type: ty,
        nodes: pts.len(),
    })
}

/// Builds the tree, doubling the leaf cap after each failed attempt.
fn build_tree(boxes: &[BoundingBox], config: &CouplerConfig) -> Result<KdTree, CouplerError> {
    let mut cap = config.max_per_leaf;
    for attempt in 1..=config.max_build_attempts {
        match KdTree::build(boxes, cap, config.max_tree_depth) {
            Ok(tree) => {
                debug!(
                    "kd-tree over {} elements: {} leaves, depth {}, {} references (attempt {attempt})",
                    tree.len(),
                    tree.leaf_count(),
                    tree.depth(),
                    tree.reference_count()
                );
                return Ok(tree);
            }
            Err(err) => {
                warn!("kd-tree build attempt {attempt} with leaf cap {cap} failed: {err}");
                if attempt < config.max_build_attempts {
                    cap = cap.saturating_mul(2);
                }
            }
        }
    }
    Err(CouplerError::IndexBuildFailed {
        attempts: config.max_build_attempts,
        max_per_leaf: cap,
    })
}

/// Local source elements with their maps and spatial index, plus the
/// bounding box of every rank's source elements.
#[derive(Clone, Debug)]
pub struct SourceIndex {
    elements: Vec<EntityHandle>,
    maps: Vec<ElementMap>,
    tree: KdTree,
    local_box: BoundingBox,
    rank_boxes: Vec<BoundingBox>,
}

impl SourceIndex {
    /// Local part of initialization: element maps and tree. No communication.
    pub fn build<M: MeshStore>(
        mesh: &M,
        elements: &[EntityHandle],
        config: &CouplerConfig,
        cache: &mut LagrangeCache,
    ) -> Result<Self, CouplerError> {
        if elements.is_empty() {
            return Err(CouplerError::EmptySourceSet);
        }
        let maps = elements
            .iter()
            .map(|&e| element_map(mesh, e, config, cache))
            .collect::<Result<Vec<_>, _>>()?;
        let boxes: Vec<BoundingBox> = maps.iter().map(ElementMap::bounding_box).collect();
        let tree = build_tree(&boxes, config)?;
        let local_box = tree.root_box();
        Ok(Self {
            elements: elements.to_vec(),
            maps,
            tree,
            local_box,
            rank_boxes: Vec::new(),
        })
    }

    /// Builds the local index and exchanges boxes with every rank. Collective.
    ///
    /// A rank whose local build fails sends an empty box record, so the
    /// exchange completes everywhere: that rank returns its build error and
    /// the others return [`CouplerError::PeerFailure`].
    pub fn initialize<C: Communicator, M: MeshStore>(
        comm: &C,
        mesh: &M,
        elements: &[EntityHandle],
        config: &CouplerConfig,
        cache: &mut LagrangeCache,
        tag: CommTag,
    ) -> Result<Self, CouplerError> {
        match Self::build(mesh, elements, config, cache) {
            Ok(mut index) => {
                index.exchange_boxes(comm, tag)?;
                Ok(index)
            }
            Err(err) => {
                all_gather_bytes(comm, tag, &[])?;
                Err(err)
            }
        }
    }

    /// All-gathers the local box so every rank knows every rank's box.
    pub fn exchange_boxes<C: Communicator>(
        &mut self,
        comm: &C,
        tag: CommTag,
    ) -> Result<(), CouplerError> {
        let local = [WireBox::of(&self.local_box)];
        let gathered = all_gather_bytes(comm, tag, cast_slice(&local))?;
        let failed: Vec<usize> = (0..gathered.len())
            .filter(|&rank| gathered[rank].is_empty())
            .collect();
        if !failed.is_empty() {
            return Err(CouplerError::PeerFailure { ranks: failed });
        }
        let mut boxes = Vec::with_capacity(gathered.len());
        for bytes in &gathered {
            expect_exact_len(bytes.len(), size_of::<WireBox>())?;
            let mut wire = [WireBox::zeroed()];
            cast_slice_mut(&mut wire).copy_from_slice(bytes);
            boxes.push(wire[0].get());
        }
        debug!(
            "rank {}: exchanged source boxes with {} ranks",
            comm.rank(),
            boxes.len()
        );
        self.rank_boxes = boxes;
        Ok(())
    }

    /// Number of local source elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[EntityHandle] {
        &self.elements
    }

    pub fn element(&self, i: usize) -> Option<EntityHandle> {
        self.elements.get(i).copied()
    }

    pub fn maps(&self) -> &[ElementMap] {
        &self.maps
    }

    pub fn map(&self, i: usize) -> Option<&ElementMap> {
        self.maps.get(i)
    }

    pub fn tree(&self) -> &KdTree {
        &self.tree
    }

    /// Box of the local source elements.
    pub fn local_box(&self) -> &BoundingBox {
        &self.local_box
    }

    /// Box of every rank's source elements, by rank.
    pub fn rank_boxes(&self) -> &[BoundingBox] {
        &self.rank_boxes
    }

    /// Ranks whose box contains `p` within tolerance.
    pub fn candidate_ranks<'s>(
        &'s self,
        p: &'s Vec3,
        rel_eps: f64,
        abs_eps: f64,
    ) -> impl Iterator<Item = usize> + 's {
        self.rank_boxes
            .iter()
            .enumerate()
            .filter(move |(_, b)| b.contains_point(p, box_tolerance(b, rel_eps, abs_eps)))
            .map(|(rank, _)| rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::data::mesh::InMemoryMesh;

    fn unit_tet(mesh: &mut InMemoryMesh) -> EntityHandle {
        let v: Vec<_> = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]
        .into_iter()
        .map(|p| mesh.add_vertex(p))
        .collect();
        mesh.add_element(CellType::Tetrahedron, &v).unwrap()
    }

    #[test]
    fn empty_source_set_is_rejected() {
        let mesh = InMemoryMesh::new();
        let err = SourceIndex::build(
            &mesh,
            &[],
            &CouplerConfig::default(),
            &mut LagrangeCache::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CouplerError::EmptySourceSet));
    }

    #[test]
    fn serial_box_exchange() {
        let mut mesh = InMemoryMesh::new();
        let t = unit_tet(&mut mesh);
        let index = SourceIndex::initialize(
            &NoComm,
            &mesh,
            &[t],
            &CouplerConfig::default(),
            &mut LagrangeCache::new(),
            CommTag::new(1),
        )
        .unwrap();
        assert_eq!(index.rank_boxes().len(), 1);
        assert_eq!(index.rank_boxes()[0].max, [1.0, 1.0, 1.0]);
        let inside: Vec<_> = index.candidate_ranks(&[0.2, 0.2, 0.2], 0.0, 0.0).collect();
        assert_eq!(inside, vec![0]);
        let near = [1.05, 0.5, 0.5];
        assert_eq!(index.candidate_ranks(&near, 0.0, 0.0).count(), 0);
        assert_eq!(index.candidate_ranks(&near, 0.0, 0.1).count(), 1);
        assert_eq!(index.candidate_ranks(&near, 0.1, 0.0).count(), 1);
    }

    #[test]
    fn unsupported_node_count() {
        let mut mesh = InMemoryMesh::new();
        let v: Vec<_> = (0..3).map(|i| mesh.add_vertex([i as f64, 0.0, 0.0])).collect();
        let e = mesh.add_element(CellType::Edge, &v).unwrap();
        let err = element_map(&mesh, e, &CouplerConfig::default(), &mut LagrangeCache::new())
            .unwrap_err();
        assert!(matches!(err, CouplerError::UnsupportedElement { nodes: 3, .. }));
    }
}
