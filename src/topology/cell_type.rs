//! Entity type metadata for the mesh store.

/// Entity types known to the mesh store.
///
/// Higher-order variants of an element share the linear topology type and
/// are told apart by their node count (e.g. a 27-node hexahedron is a
/// `Hexahedron` with 27 connectivity entries).
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Serialize, serde::Deserialize,
)]
pub enum CellType {
    /// 0D vertex.
    #[default]
    Vertex,
    /// 1D edge.
    Edge,
    /// 2D tensor-product cell (quad).
    Quadrilateral,
    /// 3D simplex (tet).
    Tetrahedron,
    /// 3D tensor-product cell (hex).
    Hexahedron,
    /// A set of other entities (groups, the root set).
    EntitySet,
}

impl CellType {
    /// Returns the topological dimension of the entity (sets report 0).
    pub fn dimension(self) -> u8 {
        match self {
            CellType::Vertex | CellType::EntitySet => 0,
            CellType::Edge => 1,
            CellType::Quadrilateral => 2,
            CellType::Tetrahedron | CellType::Hexahedron => 3,
        }
    }

    /// `true` for types that carry connectivity and can hold a field.
    pub fn is_element(self) -> bool {
        !matches!(self, CellType::Vertex | CellType::EntitySet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions() {
        assert_eq!(CellType::Edge.dimension(), 1);
        assert_eq!(CellType::Quadrilateral.dimension(), 2);
        assert_eq!(CellType::Hexahedron.dimension(), 3);
        assert!(!CellType::EntitySet.is_element());
        assert!(CellType::Tetrahedron.is_element());
    }
}
