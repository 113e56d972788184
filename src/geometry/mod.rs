//! Geometry for point location.
//!
//! This module provides bounding boxes, the KD-tree built over element boxes,
//! 1D quadrature and Lagrange tables, and the element shape-function maps.

pub mod bbox;
pub mod element_map;
pub mod kd_tree;
pub mod quadrature;

pub use bbox::BoundingBox;
pub use element_map::ElementMap;
