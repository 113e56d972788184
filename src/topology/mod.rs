//! Entity handles and cell types shared with the mesh store.

pub mod cell_type;
pub mod entity;

pub use cell_type::CellType;
pub use entity::EntityHandle;
