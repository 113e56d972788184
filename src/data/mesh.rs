//! Mesh store interface and an in-memory reference store.
//!
//! The coupler never owns mesh data. Entity types, vertex coordinates, element
//! connectivity, tagged per-entity values and entity-set membership are all
//! read through the [`MeshStore`] trait.
//! [`InMemoryMesh`] is a small hash-map backed implementation used by the tests,
//! benches and single-process drivers.
//!
//! Real-valued tags store a slice per entity (length 1 for scalar fields, `n³`
//! for spectral node values); integer tags store one `i32` per entity and are
//! what entity sets are selected by during subset normalization.

use crate::mesh_error::CouplerError;
use crate::topology::cell_type::CellType;
use crate::topology::entity::EntityHandle;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroU64;

/// Read/write access to the mesh store collaborator.
pub trait MeshStore {
    /// Handle of the root set, which (transitively) contains every entity.
    fn root_set(&self) -> EntityHandle;

    /// Type of entity `h`.
    fn entity_type(&self, h: EntityHandle) -> Result<CellType, CouplerError>;

    /// Coordinates of vertex `v`.
    fn coords(&self, v: EntityHandle) -> Result<[f64; 3], CouplerError>;

    /// Ordered vertices of element `e`.
    fn connectivity(&self, e: EntityHandle) -> Result<&[EntityHandle], CouplerError>;

    /// Real-valued tag data of `h`.
    fn tag_get(&self, tag: &str, h: EntityHandle) -> Result<&[f64], CouplerError>;

    /// Overwrites (or creates) the real-valued tag data of `h`.
    fn tag_set(&mut self, tag: &str, h: EntityHandle, values: &[f64]) -> Result<(), CouplerError>;

    /// Integer tag value of `h`, if set.
    fn int_tag(&self, tag: &str, h: EntityHandle) -> Option<i32>;

    /// Direct members of entity set `set`.
    fn set_members(&self, set: EntityHandle) -> Result<&[EntityHandle], CouplerError>;

    /// Coordinates of every vertex of element `e`, in connectivity order.
    fn element_coords(&self, e: EntityHandle) -> Result<Vec<[f64; 3]>, CouplerError> {
        self.connectivity(e)?
            .iter()
            .map(|&v| self.coords(v))
            .collect()
    }

    /// First component of tag `tag` on each vertex of element `e`.
    fn vertex_values(&self, tag: &str, e: EntityHandle) -> Result<Vec<f64>, CouplerError> {
        let mut out = Vec::new();
        for &v in self.connectivity(e)? {
            let values = self.tag_get(tag, v)?;
            let first = values.first().ok_or_else(|| CouplerError::TagLength {
                tag: tag.to_string(),
                handle: v,
                expected: 1,
                found: 0,
            })?;
            out.push(*first);
        }
        Ok(out)
    }

    /// Position used to locate an entity: a vertex's coordinates or the
    /// average of an element's vertices.
    fn centroid(&self, h: EntityHandle) -> Result<[f64; 3], CouplerError> {
        match self.entity_type(h)? {
            CellType::Vertex => self.coords(h),
            CellType::EntitySet => Err(CouplerError::UnsupportedElement {
                handle: h,
                cell_type: CellType::EntitySet,
                nodes: 0,
            }),
            _ => {
                let pts = self.element_coords(h)?;
                let mut c = [0.0; 3];
                for p in &pts {
                    for d in 0..3 {
                        c[d] += p[d];
                    }
                }
                let inv = 1.0 / pts.len().max(1) as f64;
                Ok([c[0] * inv, c[1] * inv, c[2] * inv])
            }
        }
    }

    /// Non-set entities of type `ty` reachable from `set` through set
    /// membership, sorted and duplicate-free.
    fn entities_under(
        &self,
        set: EntityHandle,
        ty: CellType,
    ) -> Result<Vec<EntityHandle>, CouplerError> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![set];
        while let Some(s) = stack.pop() {
            if !visited.insert(s) {
                continue;
            }
            for &m in self.set_members(s)? {
                match self.entity_type(m)? {
                    CellType::EntitySet => stack.push(m),
                    t if t == ty => out.push(m),
                    _ => {}
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }

    /// Entity sets contained (transitively) in `set`, excluding `set` itself,
    /// sorted by handle.
    fn sets_under(&self, set: EntityHandle) -> Result<Vec<EntityHandle>, CouplerError> {
        let mut out = Vec::new();
        let mut visited = HashSet::from([set]);
        let mut stack = vec![set];
        while let Some(s) = stack.pop() {
            for &m in self.set_members(s)? {
                if self.entity_type(m)? == CellType::EntitySet && visited.insert(m) {
                    out.push(m);
                    stack.push(m);
                }
            }
        }
        out.sort_unstable();
        Ok(out)
    }
}

/// Hash-map backed mesh store.
///
/// Vertices, elements and sets created through the builder methods are
/// members of the root set; sets created with [`InMemoryMesh::create_set`]
/// are members of their parent.
#[derive(Clone, Debug)]
pub struct InMemoryMesh {
    next: NonZeroU64,
    root: EntityHandle,
    types: HashMap<EntityHandle, CellType>,
    coords: HashMap<EntityHandle, [f64; 3]>,
    connectivity: HashMap<EntityHandle, Vec<EntityHandle>>,
    sets: HashMap<EntityHandle, Vec<EntityHandle>>,
    real_tags: HashMap<String, HashMap<EntityHandle, Vec<f64>>>,
    int_tags: HashMap<String, HashMap<EntityHandle, i32>>,
}

impl Default for InMemoryMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMesh {
    /// Creates an empty mesh holding only the root set.
    pub fn new() -> Self {
        let root = EntityHandle::from_nonzero(NonZeroU64::MIN);
        let mut mesh = Self {
            next: NonZeroU64::MIN.saturating_add(1),
            root,
            types: HashMap::new(),
            coords: HashMap::new(),
            connectivity: HashMap::new(),
            sets: HashMap::new(),
            real_tags: HashMap::new(),
            int_tags: HashMap::new(),
        };
        mesh.types.insert(root, CellType::EntitySet);
        mesh.sets.insert(root, Vec::new());
        mesh
    }

    fn allocate(&mut self, ty: CellType) -> EntityHandle {
        let h = EntityHandle::from_nonzero(self.next);
        self.next = self.next.saturating_add(1);
        self.types.insert(h, ty);
        h
    }

    fn push_member(&mut self, set: EntityHandle, member: EntityHandle) -> Result<(), CouplerError> {
        self.sets
            .get_mut(&set)
            .ok_or(CouplerError::MissingEntity(set))?
            .push(member);
        Ok(())
    }

    /// Adds a vertex at `xyz` to the root set.
    pub fn add_vertex(&mut self, xyz: [f64; 3]) -> EntityHandle {
        let h = self.allocate(CellType::Vertex);
        self.coords.insert(h, xyz);
        if let Some(root) = self.sets.get_mut(&self.root) {
            root.push(h);
        }
        h
    }

    /// Adds an element of type `ty` over existing `vertices`.
    pub fn add_element(
        &mut self,
        ty: CellType,
        vertices: &[EntityHandle],
    ) -> Result<EntityHandle, CouplerError> {
        if !ty.is_element() {
            return Err(CouplerError::UnsupportedElement {
                handle: self.root,
                cell_type: ty,
                nodes: vertices.len(),
            });
        }
        for &v in vertices {
            if self.types.get(&v) != Some(&CellType::Vertex) {
                return Err(CouplerError::MissingEntity(v));
            }
        }
        let h = self.allocate(ty);
        self.connectivity.insert(h, vertices.to_vec());
        self.push_member(self.root, h)?;
        Ok(h)
    }

    /// Creates an empty entity set inside `parent`.
    pub fn create_set(&mut self, parent: EntityHandle) -> Result<EntityHandle, CouplerError> {
        if !self.sets.contains_key(&parent) {
            return Err(CouplerError::MissingEntity(parent));
        }
        let h = self.allocate(CellType::EntitySet);
        self.sets.insert(h, Vec::new());
        self.push_member(parent, h)?;
        Ok(h)
    }

    /// Appends `members` to entity set `set`.
    pub fn add_to_set(
        &mut self,
        set: EntityHandle,
        members: &[EntityHandle],
    ) -> Result<(), CouplerError> {
        for &m in members {
            if !self.types.contains_key(&m) {
                return Err(CouplerError::MissingEntity(m));
            }
        }
        self.sets
            .get_mut(&set)
            .ok_or(CouplerError::MissingEntity(set))?
            .extend_from_slice(members);
        Ok(())
    }

    /// Assigns integer tag `name` on `h`, returning the previous value.
    pub fn set_int_tag(&mut self, name: &str, h: EntityHandle, value: i32) -> Option<i32> {
        self.int_tags
            .entry(name.to_string())
            .or_default()
            .insert(h, value)
    }

    /// Sets a scalar (single-component) real tag.
    pub fn set_scalar(&mut self, name: &str, h: EntityHandle, value: f64) {
        self.real_tags
            .entry(name.to_string())
            .or_default()
            .insert(h, vec![value]);
    }

    /// All entities of type `ty`, sorted by handle.
    pub fn entities_of_type(&self, ty: CellType) -> Vec<EntityHandle> {
        let mut out: Vec<_> = self
            .types
            .iter()
            .filter_map(|(&h, &t)| (t == ty).then_some(h))
            .collect();
        out.sort_unstable();
        out
    }

    /// Distinct values of integer tag `name`, ascending.
    pub fn int_tag_values(&self, name: &str) -> Vec<i32> {
        let by_value: BTreeMap<i32, ()> = self
            .int_tags
            .get(name)
            .map(|m| m.values().map(|&v| (v, ())).collect())
            .unwrap_or_default();
        by_value.into_keys().collect()
    }
}

impl MeshStore for InMemoryMesh {
    fn root_set(&self) -> EntityHandle {
        self.root
    }

    fn entity_type(&self, h: EntityHandle) -> Result<CellType, CouplerError> {
        self.types
            .get(&h)
            .copied()
            .ok_or(CouplerError::MissingEntity(h))
    }

    fn coords(&self, v: EntityHandle) -> Result<[f64; 3], CouplerError> {
        self.coords
            .get(&v)
            .copied()
            .ok_or(CouplerError::MissingEntity(v))
    }

    fn connectivity(&self, e: EntityHandle) -> Result<&[EntityHandle], CouplerError> {
        self.connectivity
            .get(&e)
            .map(Vec::as_slice)
            .ok_or(CouplerError::MissingEntity(e))
    }

    fn tag_get(&self, tag: &str, h: EntityHandle) -> Result<&[f64], CouplerError> {
        self.real_tags
            .get(tag)
            .and_then(|m| m.get(&h))
            .map(Vec::as_slice)
            .ok_or_else(|| CouplerError::MissingTag {
                tag: tag.to_string(),
                handle: h,
            })
    }

    fn tag_set(&mut self, tag: &str, h: EntityHandle, values: &[f64]) -> Result<(), CouplerError> {
        if !self.types.contains_key(&h) {
            return Err(CouplerError::MissingEntity(h));
        }
        self.real_tags
            .entry(tag.to_string())
            .or_default()
            .insert(h, values.to_vec());
        Ok(())
    }

    fn int_tag(&self, tag: &str, h: EntityHandle) -> Option<i32> {
        self.int_tags.get(tag).and_then(|m| m.get(&h).copied())
    }

    fn set_members(&self, set: EntityHandle) -> Result<&[EntityHandle], CouplerError> {
        self.sets
            .get(&set)
            .map(Vec::as_slice)
            .ok_or(CouplerError::MissingEntity(set))
    }
}
