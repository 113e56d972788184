//! Element shape-function maps.
//!
//! An [`ElementMap`] maps parametric (natural) coordinates `ξ` of a canonical
//! reference element to physical space, `x = F(ξ)`, and inverts that map with
//! Newton–Raphson. The supported elements and their reference domains:
//!
//! - Linear edge (2 nodes): `ξ₀ ∈ [-1, 1]`.
//! - Linear quad (4 nodes): `(ξ₀, ξ₁) ∈ [-1, 1]²`, counter-clockwise corners.
//! - Linear tet (4 nodes): `ξ` in the unit simplex, `x = v₀ + T ξ`.
//! - Linear hex (8 nodes): `ξ ∈ [-1, 1]³`, bottom face then top face.
//! - Quadratic hex (27 nodes): corners, bottom/vertical/top mid-edges,
//!   mid-faces (`-y, +x, +y, -x, -z, +z`), center.
//! - Spectral quad/hex: `n²`/`n³` Gauss–Lobatto nodes, `i` fastest.
//!
//! Edges and quads are lower-dimensional manifolds in 3D. Their maps are
//! completed to square 3×3 Jacobians by offsetting along an orthonormal frame
//! (edge) or the unit normal (quad): the trailing natural coordinates are the
//! signed distances from the curve or surface, and the inside test requires
//! them to vanish within tolerance.

use crate::geometry::bbox::BoundingBox;
use crate::geometry::quadrature::{GllTable, gauss_legendre};
use crate::mesh_error::EvalError;
use itertools::iproduct;
use std::sync::Arc;

pub type Vec3 = [f64; 3];
/// Row-major 3×3 matrix; column `c` of a Jacobian is `∂F/∂ξ_c`.
pub type Mat3 = [[f64; 3]; 3];

/// Newton iteration bound of [`ElementMap::ievaluate`].
pub const MAX_NEWTON_ITERATIONS: usize = 10;

const HEX_CORNERS: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

const QUAD_CORNERS: [[f64; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

/// Reference position of each 27-node hex node, per axis in `{-1, 0, 1}`.
const HEX27_NODES: [[i8; 3]; 27] = [
    [-1, -1, -1],
    [1, -1, -1],
    [1, 1, -1],
    [-1, 1, -1],
    [-1, -1, 1],
    [1, -1, 1],
    [1, 1, 1],
    [-1, 1, 1],
    [0, -1, -1],
    [1, 0, -1],
    [0, 1, -1],
    [-1, 0, -1],
    [-1, -1, 0],
    [1, -1, 0],
    [1, 1, 0],
    [-1, 1, 0],
    [0, -1, 1],
    [1, 0, 1],
    [0, 1, 1],
    [-1, 0, 1],
    [0, -1, 0],
    [1, 0, 0],
    [0, 1, 0],
    [-1, 0, 0],
    [0, 0, -1],
    [0, 0, 1],
    [0, 0, 0],
];

/// Geometry of a spectral element: Gauss–Lobatto node coordinates plus the
/// shared Lagrange table of its order.
#[derive(Clone, Debug)]
pub struct SpectralElement {
    table: Arc<GllTable>,
    nodes: Vec<Vec3>,
    /// Unit normal for quads; unused for hexes.
    normal: Vec3,
}

impl SpectralElement {
    /// Nodes per direction.
    pub fn order(&self) -> usize {
        self.table.order()
    }

    pub fn table(&self) -> &Arc<GllTable> {
        &self.table
    }
}

/// A canonical element and the geometric data its map needs.
#[derive(Clone, Debug)]
pub enum ElementMap {
    LinearEdge { vertices: [Vec3; 2], frame: [Vec3; 2] },
    LinearQuad { vertices: [Vec3; 4], normal: Vec3 },
    LinearTet { vertices: [Vec3; 4], inverse: Option<Mat3> },
    LinearHex { vertices: [Vec3; 8] },
    QuadraticHex { vertices: Box<[Vec3; 27]> },
    SpectralQuad(SpectralElement),
    SpectralHex(SpectralElement),
}

impl ElementMap {
    pub fn linear_edge(vertices: [Vec3; 2]) -> Self {
        let frame = orthonormal_complement(sub(vertices[1], vertices[0]));
        ElementMap::LinearEdge { vertices, frame }
    }

    pub fn linear_quad(vertices: [Vec3; 4]) -> Self {
        let normal = quad_normal(&vertices[0], &vertices[1], &vertices[2], &vertices[3]);
        ElementMap::LinearQuad { vertices, normal }
    }

    /// Linear tet; the affine map is factored once here.
    pub fn linear_tet(vertices: [Vec3; 4]) -> Self {
        let t = columns(
            sub(vertices[1], vertices[0]),
            sub(vertices[2], vertices[0]),
            sub(vertices[3], vertices[0]),
        );
        let det = det3(&t);
        let scale = BoundingBox::from_points(&vertices).diagonal_length();
        let inverse = (det.abs() > f64::EPSILON * scale.powi(3)).then(|| inverse3(&t, det));
        ElementMap::LinearTet { vertices, inverse }
    }

    pub fn linear_hex(vertices: [Vec3; 8]) -> Self {
        ElementMap::LinearHex { vertices }
    }

    pub fn quadratic_hex(vertices: &[Vec3]) -> Result<Self, EvalError> {
        let arr: [Vec3; 27] = vertices.try_into().map_err(|_| EvalError::DimensionMismatch {
            expected: 27,
            found: vertices.len(),
        })?;
        Ok(ElementMap::QuadraticHex {
            vertices: Box::new(arr),
        })
    }

    /// Spectral quad from `order²` Gauss–Lobatto node coordinates.
    pub fn spectral_quad(table: Arc<GllTable>, nodes: Vec<Vec3>) -> Result<Self, EvalError> {
        let n = spectral_order(&table)?;
        check_len(n * n, nodes.len())?;
        let normal = quad_normal(
            &nodes[0],
            &nodes[n - 1],
            &nodes[n * n - 1],
            &nodes[n * (n - 1)],
        );
        Ok(ElementMap::SpectralQuad(SpectralElement {
            table,
            nodes,
            normal,
        }))
    }

    /// Spectral hex from `order³` Gauss–Lobatto node coordinates.
    pub fn spectral_hex(table: Arc<GllTable>, nodes: Vec<Vec3>) -> Result<Self, EvalError> {
        let n = spectral_order(&table)?;
        check_len(n * n * n, nodes.len())?;
        Ok(ElementMap::SpectralHex(SpectralElement {
            table,
            nodes,
            normal: [0.0; 3],
        }))
    }

    /// Physical node coordinates in map order.
    pub fn nodes(&self) -> &[Vec3] {
        match self {
            ElementMap::LinearEdge { vertices, .. } => vertices,
            ElementMap::LinearQuad { vertices, .. } => vertices,
            ElementMap::LinearTet { vertices, .. } => vertices,
            ElementMap::LinearHex { vertices } => vertices,
            ElementMap::QuadraticHex { vertices } => vertices.as_slice(),
            ElementMap::SpectralQuad(s) | ElementMap::SpectralHex(s) => &s.nodes,
        }
    }

    /// Number of field values the map interpolates.
    pub fn num_nodes(&self) -> usize {
        self.nodes().len()
    }

    /// Parametric dimension of the element.
    pub fn dimension(&self) -> usize {
        match self {
            ElementMap::LinearEdge { .. } => 1,
            ElementMap::LinearQuad { .. } | ElementMap::SpectralQuad(_) => 2,
            _ => 3,
        }
    }

    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ElementMap::LinearEdge { .. } => "LinearEdge",
            ElementMap::LinearQuad { .. } => "LinearQuad",
            ElementMap::LinearTet { .. } => "LinearTet",
            ElementMap::LinearHex { .. } => "LinearHex",
            ElementMap::QuadraticHex { .. } => "QuadraticHex",
            ElementMap::SpectralQuad(_) => "SpectralQuad",
            ElementMap::SpectralHex(_) => "SpectralHex",
        }
    }

    /// Physical-space bounding box of the nodes.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.nodes())
    }

    /// Parametric center used as the Newton starting point.
    fn center(&self) -> Vec3 {
        match self {
            ElementMap::LinearTet { .. } => [0.25; 3],
            _ => [0.0; 3],
        }
    }

    /// Shape function values at `xi`, one per node.
    pub fn shape_values(&self, xi: &Vec3) -> Vec<f64> {
        match self {
            ElementMap::LinearEdge { .. } => vec![0.5 * (1.0 - xi[0]), 0.5 * (1.0 + xi[0])],
            ElementMap::LinearQuad { .. } => QUAD_CORNERS
                .iter()
                .map(|c| 0.25 * (1.0 + c[0] * xi[0]) * (1.0 + c[1] * xi[1]))
                .collect(),
            ElementMap::LinearTet { .. } => vec![1.0 - xi[0] - xi[1] - xi[2], xi[0], xi[1], xi[2]],
            ElementMap::LinearHex { .. } => HEX_CORNERS
                .iter()
                .map(|c| {
                    0.125 * (1.0 + c[0] * xi[0]) * (1.0 + c[1] * xi[1]) * (1.0 + c[2] * xi[2])
                })
                .collect(),
            ElementMap::QuadraticHex { .. } => HEX27_NODES
                .iter()
                .map(|n| quad1d(n[0], xi[0]) * quad1d(n[1], xi[1]) * quad1d(n[2], xi[2]))
                .collect(),
            ElementMap::SpectralQuad(s) => {
                let b = &s.table.basis;
                let (lx, ly) = (b.values(xi[0]), b.values(xi[1]));
                iproduct!(0..ly.len(), 0..lx.len())
                    .map(|(j, i)| lx[i] * ly[j])
                    .collect()
            }
            ElementMap::SpectralHex(s) => {
                let b = &s.table.basis;
                let (lx, ly, lz) = (b.values(xi[0]), b.values(xi[1]), b.values(xi[2]));
                iproduct!(0..lz.len(), 0..ly.len(), 0..lx.len())
                    .map(|(k, j, i)| lx[i] * ly[j] * lz[k])
                    .collect()
            }
        }
    }

    /// Shape function gradients `∂N/∂ξ` at `xi`, one per node; components
    /// beyond the parametric dimension are zero.
    pub fn shape_derivatives(&self, xi: &Vec3) -> Vec<Vec3> {
        match self {
            ElementMap::LinearEdge { .. } => vec![[-0.5, 0.0, 0.0], [0.5, 0.0, 0.0]],
            ElementMap::LinearQuad { .. } => QUAD_CORNERS
                .iter()
                .map(|c| {
                    [
                        0.25 * c[0] * (1.0 + c[1] * xi[1]),
                        0.25 * c[1] * (1.0 + c[0] * xi[0]),
                        0.0,
                    ]
                })
                .collect(),
            ElementMap::LinearTet { .. } => vec![
                [-1.0, -1.0, -1.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            ElementMap::LinearHex { .. } => HEX_CORNERS
                .iter()
                .map(|c| {
                    let f = [1.0 + c[0] * xi[0], 1.0 + c[1] * xi[1], 1.0 + c[2] * xi[2]];
                    [
                        0.125 * c[0] * f[1] * f[2],
                        0.125 * c[1] * f[0] * f[2],
                        0.125 * c[2] * f[0] * f[1],
                    ]
                })
                .collect(),
            ElementMap::QuadraticHex { .. } => HEX27_NODES
                .iter()
                .map(|n| {
                    let v = [quad1d(n[0], xi[0]), quad1d(n[1], xi[1]), quad1d(n[2], xi[2])];
                    let d = [dquad1d(n[0], xi[0]), dquad1d(n[1], xi[1]), dquad1d(n[2], xi[2])];
                    [d[0] * v[1] * v[2], v[0] * d[1] * v[2], v[0] * v[1] * d[2]]
                })
                .collect(),
            ElementMap::SpectralQuad(s) => {
                let b = &s.table.basis;
                let (lx, ly) = (b.values(xi[0]), b.values(xi[1]));
                let (dx, dy) = (b.derivatives(xi[0]), b.derivatives(xi[1]));
                iproduct!(0..ly.len(), 0..lx.len())
                    .map(|(j, i)| [dx[i] * ly[j], lx[i] * dy[j], 0.0])
                    .collect()
            }
            ElementMap::SpectralHex(s) => {
                let b = &s.table.basis;
                let (lx, ly, lz) = (b.values(xi[0]), b.values(xi[1]), b.values(xi[2]));
                let (dx, dy, dz) = (
                    b.derivatives(xi[0]),
                    b.derivatives(xi[1]),
                    b.derivatives(xi[2]),
                );
                iproduct!(0..lz.len(), 0..ly.len(), 0..lx.len())
                    .map(|(k, j, i)| {
                        [
                            dx[i] * ly[j] * lz[k],
                            lx[i] * dy[j] * lz[k],
                            lx[i] * ly[j] * dz[k],
                        ]
                    })
                    .collect()
            }
        }
    }

    /// Columns completing a lower-dimensional element to a 3D map.
    fn offset_columns(&self) -> &[Vec3] {
        match self {
            ElementMap::LinearEdge { frame, .. } => frame,
            ElementMap::LinearQuad { normal, .. } => std::slice::from_ref(normal),
            ElementMap::SpectralQuad(s) => std::slice::from_ref(&s.normal),
            _ => &[],
        }
    }

    /// Forward map `x = F(ξ)`.
    pub fn evaluate(&self, xi: &Vec3) -> Vec3 {
        let mut x = [0.0; 3];
        for (n, v) in self.shape_values(xi).iter().zip(self.nodes()) {
            for d in 0..3 {
                x[d] += n * v[d];
            }
        }
        let dim = self.dimension();
        for (k, col) in self.offset_columns().iter().enumerate() {
            for d in 0..3 {
                x[d] += xi[dim + k] * col[d];
            }
        }
        x
    }

    /// Jacobian `∂F/∂ξ` at `xi`.
    pub fn jacobian(&self, xi: &Vec3) -> Mat3 {
        let mut j = [[0.0; 3]; 3];
        for (g, v) in self.shape_derivatives(xi).iter().zip(self.nodes()) {
            for r in 0..3 {
                for c in 0..3 {
                    j[r][c] += v[r] * g[c];
                }
            }
        }
        let dim = self.dimension();
        for (k, col) in self.offset_columns().iter().enumerate() {
            for r in 0..3 {
                j[r][dim + k] = col[r];
            }
        }
        j
    }

    /// Determinant magnitude below which the Jacobian counts as singular.
    fn singular_threshold(&self) -> f64 {
        let scale = self.bounding_box().diagonal_length();
        f64::EPSILON * scale.powi(self.dimension() as i32)
    }

    /// Inverse map with the default iteration bound.
    pub fn ievaluate(&self, x: &Vec3, tol: f64) -> Result<Vec3, EvalError> {
        self.ievaluate_with(x, tol, MAX_NEWTON_ITERATIONS)
    }

    /// Inverse map `ξ = F⁻¹(x)`: Newton–Raphson from the parametric center
    /// until `‖F(ξ) - x‖ < tol`. Linear tets solve the affine map directly.
    pub fn ievaluate_with(&self, x: &Vec3, tol: f64, max_iter: usize) -> Result<Vec3, EvalError> {
        if let ElementMap::LinearTet { vertices, inverse } = self {
            let inv = inverse.as_ref().ok_or(EvalError::SingularJacobian { det: 0.0 })?;
            return Ok(mat_vec(inv, &sub(*x, vertices[0])));
        }
        let threshold = self.singular_threshold();
        let tol2 = tol * tol;
        let mut xi = self.center();
        let mut delta = sub(self.evaluate(&xi), *x);
        let mut iterations = 0;
        while dot(&delta, &delta) > tol2 {
            if iterations >= max_iter {
                return Err(EvalError::NotConverged { iterations });
            }
            let j = self.jacobian(&xi);
            let det = det3(&j);
            if det.abs() < threshold {
                return Err(EvalError::SingularJacobian { det });
            }
            let step = mat_vec(&inverse3(&j, det), &delta);
            xi = sub(xi, step);
            delta = sub(self.evaluate(&xi), *x);
            iterations += 1;
        }
        Ok(xi)
    }

    /// Containment test in parametric space.
    pub fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool {
        match self {
            ElementMap::LinearTet { .. } => {
                xi.iter().all(|&c| c >= -tol) && xi[0] + xi[1] + xi[2] <= 1.0 + tol
            }
            _ => {
                let dim = self.dimension();
                xi[..dim].iter().all(|c| c.abs() <= 1.0 + tol)
                    && xi[dim..].iter().all(|c| c.abs() <= tol)
            }
        }
    }

    /// Cheap pre-filter: `x` lies in the node bounding box grown by `tol`.
    #[inline]
    pub fn inside_box(&self, x: &Vec3, tol: f64) -> bool {
        self.bounding_box().contains_point(x, tol)
    }

    /// Interpolates per-node `field` values at `xi`.
    pub fn evaluate_scalar_field(&self, xi: &Vec3, field: &[f64]) -> Result<f64, EvalError> {
        check_len(self.num_nodes(), field.len())?;
        Ok(self
            .shape_values(xi)
            .iter()
            .zip(field)
            .map(|(n, f)| n * f)
            .sum())
    }

    /// Integrates per-node `field` over the element.
    ///
    /// Fixed-vertex elements use an `order`-point Gauss–Legendre rule per
    /// direction; spectral elements use their own Gauss–Lobatto nodes.
    pub fn integrate_scalar_field(&self, field: &[f64], order: usize) -> Result<f64, EvalError> {
        check_len(self.num_nodes(), field.len())?;
        match self {
            ElementMap::LinearTet { vertices, .. } => {
                let t = columns(
                    sub(vertices[1], vertices[0]),
                    sub(vertices[2], vertices[0]),
                    sub(vertices[3], vertices[0]),
                );
                let volume = det3(&t).abs() / 6.0;
                Ok(volume * field.iter().sum::<f64>() / 4.0)
            }
            ElementMap::SpectralQuad(s) => {
                let rule = &s.table.rule;
                let n = rule.len();
                let mut total = 0.0;
                for (j, i) in iproduct!(0..n, 0..n) {
                    let xi = [rule.points[i], rule.points[j], 0.0];
                    let w = rule.weights[i] * rule.weights[j];
                    total += w * field[i + n * j] * self.measure(&xi);
                }
                Ok(total)
            }
            ElementMap::SpectralHex(s) => {
                let rule = &s.table.rule;
                let n = rule.len();
                let mut total = 0.0;
                for (k, j, i) in iproduct!(0..n, 0..n, 0..n) {
                    let xi = [rule.points[i], rule.points[j], rule.points[k]];
                    let w = rule.weights[i] * rule.weights[j] * rule.weights[k];
                    total += w * field[i + n * (j + n * k)] * self.measure(&xi);
                }
                Ok(total)
            }
            _ => {
                let rule = gauss_legendre(order.max(1));
                let dim = self.dimension();
                let q = rule.len();
                let (qy, qz) = (if dim > 1 { q } else { 1 }, if dim > 2 { q } else { 1 });
                let mut total = 0.0;
                for (k, j, i) in iproduct!(0..qz, 0..qy, 0..q) {
                    let mut xi = [rule.points[i], 0.0, 0.0];
                    let mut w = rule.weights[i];
                    if dim > 1 {
                        xi[1] = rule.points[j];
                        w *= rule.weights[j];
                    }
                    if dim > 2 {
                        xi[2] = rule.points[k];
                        w *= rule.weights[k];
                    }
                    total += w * self.evaluate_scalar_field(&xi, field)? * self.measure(&xi);
                }
                Ok(total)
            }
        }
    }

    /// Length, area or volume element `|∂F/∂ξ|` at `xi`.
    fn measure(&self, xi: &Vec3) -> f64 {
        let j = self.jacobian(xi);
        let col = |c: usize| [j[0][c], j[1][c], j[2][c]];
        match self.dimension() {
            1 => norm(&col(0)),
            2 => norm(&cross(&col(0), &col(1))),
            _ => det3(&j).abs(),
        }
    }

    /// Length, area or volume of the element.
    pub fn measure_total(&self, order: usize) -> Result<f64, EvalError> {
        self.integrate_scalar_field(&vec![1.0; self.num_nodes()], order)
    }
}

/// Nodes per direction of `table`; a spectral element needs both endpoints.
fn spectral_order(table: &GllTable) -> Result<usize, EvalError> {
    match table.order() {
        n if n >= 2 => Ok(n),
        n => Err(EvalError::DimensionMismatch {
            expected: 2,
            found: n,
        }),
    }
}

#[inline]
fn check_len(expected: usize, found: usize) -> Result<(), EvalError> {
    if expected == found {
        Ok(())
    } else {
        Err(EvalError::DimensionMismatch { expected, found })
    }
}

/// 1D quadratic Lagrange basis at nodes `{-1, 0, 1}`.
#[inline]
fn quad1d(node: i8, t: f64) -> f64 {
    match node {
        -1 => 0.5 * t * (t - 1.0),
        0 => 1.0 - t * t,
        _ => 0.5 * t * (t + 1.0),
    }
}

#[inline]
fn dquad1d(node: i8, t: f64) -> f64 {
    match node {
        -1 => t - 0.5,
        0 => -2.0 * t,
        _ => t + 0.5,
    }
}

fn quad_normal(a: &Vec3, b: &Vec3, c: &Vec3, d: &Vec3) -> Vec3 {
    let n = cross(&sub(*c, *a), &sub(*d, *b));
    let len = norm(&n);
    if len > 0.0 { n.map(|v| v / len) } else { [0.0; 3] }
}

/// Two unit vectors completing `e` to an orthonormal frame (zero for `e = 0`).
fn orthonormal_complement(e: Vec3) -> [Vec3; 2] {
    let len = norm(&e);
    if len == 0.0 {
        return [[0.0; 3]; 2];
    }
    let e = e.map(|v| v / len);
    let mut axis = [0.0; 3];
    let weakest = (1..3).fold(0, |best, d| if e[d].abs() < e[best].abs() { d } else { best });
    axis[weakest] = 1.0;
    let proj = dot(&axis, &e);
    let f1 = sub(axis, e.map(|v| v * proj));
    let f1_len = norm(&f1);
    let f1 = f1.map(|v| v / f1_len);
    [f1, cross(&e, &f1)]
}

#[inline]
fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn cross(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
fn norm(a: &Vec3) -> f64 {
    dot(a, a).sqrt()
}

fn columns(c0: Vec3, c1: Vec3, c2: Vec3) -> Mat3 {
    [
        [c0[0], c1[0], c2[0]],
        [c0[1], c1[1], c2[1]],
        [c0[2], c1[2], c2[2]],
    ]
}

fn det3(m: &Mat3) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn inverse3(m: &Mat3, det: f64) -> Mat3 {
    let inv = 1.0 / det;
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv,
        ],
    ]
}

#[inline]
fn mat_vec(m: &Mat3, v: &Vec3) -> Vec3 {
    [dot(&m[0], v), dot(&m[1], v), dot(&m[2], v)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::quadrature::GllTable;

    fn cube(half: f64) -> ElementMap {
        ElementMap::linear_hex(HEX_CORNERS.map(|c| c.map(|v| v * half)))
    }

    #[test]
    fn hex_center_maps_to_origin() {
        let hex = cube(1.0);
        assert_eq!(hex.evaluate(&[0.0; 3]), [0.0; 3]);
        let xi = hex.ievaluate(&[0.0; 3], 1e-10).unwrap();
        assert!(xi.iter().all(|c| c.abs() < 1e-12));
    }

    #[test]
    fn skewed_hex_roundtrip() {
        let mut v = HEX_CORNERS;
        v[6] = [1.4, 1.3, 1.2];
        v[2] = [1.1, 0.9, -1.0];
        let hex = ElementMap::linear_hex(v);
        let xi = [0.3, -0.6, 0.45];
        let back = hex.ievaluate(&hex.evaluate(&xi), 1e-12).unwrap();
        for d in 0..3 {
            assert!((back[d] - xi[d]).abs() < 1e-9);
        }
    }

    #[test]
    fn tet_inverse_is_affine() {
        let tet = ElementMap::linear_tet([
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [0.0, 0.0, 2.0],
        ]);
        let xi = tet.ievaluate(&[0.5, 0.5, 0.5], 1e-12).unwrap();
        assert_eq!(xi, [0.25, 0.25, 0.25]);
        assert!(tet.inside_nat_space(&xi, 0.0));
        assert!(!tet.inside_nat_space(&[0.5, 0.5, 0.5], 1e-6));
    }

    #[test]
    fn flat_tet_is_singular() {
        let tet = ElementMap::linear_tet([
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ]);
        assert!(matches!(
            tet.ievaluate(&[0.1, 0.1, 0.0], 1e-10),
            Err(EvalError::SingularJacobian { .. })
        ));
    }

    #[test]
    fn quad_off_plane_coordinate_is_distance() {
        let quad = ElementMap::linear_quad([
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [2.0, 2.0, 0.0],
            [0.0, 2.0, 0.0],
        ]);
        let xi = quad.ievaluate(&[1.5, 0.5, 0.25], 1e-12).unwrap();
        assert!((xi[0] - 0.5).abs() < 1e-12);
        assert!((xi[1] + 0.5).abs() < 1e-12);
        assert!((xi[2] - 0.25).abs() < 1e-12);
        assert!(!quad.inside_nat_space(&xi, 1e-6));
        assert!(quad.inside_nat_space(&[xi[0], xi[1], 0.0], 1e-6));
    }

    #[test]
    fn edge_integrates_length() {
        let edge = ElementMap::linear_edge([[0.0, 0.0, 0.0], [3.0, 4.0, 0.0]]);
        let len = edge.integrate_scalar_field(&[1.0, 1.0], 2).unwrap();
        assert!((len - 5.0).abs() < 1e-12);
        let mid = edge.ievaluate(&[1.5, 2.0, 0.0], 1e-12).unwrap();
        assert!(mid[0].abs() < 1e-12);
    }

    #[test]
    fn quadratic_hex_reproduces_quadratic_field() {
        let vertices: Vec<Vec3> = HEX27_NODES
            .iter()
            .map(|n| n.map(|c| f64::from(c)))
            .collect();
        let hex = ElementMap::quadratic_hex(&vertices).unwrap();
        let field: Vec<f64> = vertices.iter().map(|p| p[0] * p[0] + p[1]).collect();
        let xi = [0.3, -0.2, 0.7];
        let got = hex.evaluate_scalar_field(&xi, &field).unwrap();
        assert!((got - (0.09 - 0.2)).abs() < 1e-12);
        let vol = hex.measure_total(3).unwrap();
        assert!((vol - 8.0).abs() < 1e-12);
    }

    #[test]
    fn spectral_hex_matches_trilinear_cube() {
        let table = Arc::new(GllTable::new(4));
        let pts = table.rule.points.clone();
        let nodes: Vec<Vec3> = iproduct!(0..4, 0..4, 0..4)
            .map(|(k, j, i)| [2.0 * pts[i], pts[j], pts[k]])
            .collect();
        let hex = ElementMap::spectral_hex(table, nodes).unwrap();
        let x = [1.2, -0.4, 0.5];
        let xi = hex.ievaluate(&x, 1e-12).unwrap();
        assert!((xi[0] - 0.6).abs() < 1e-10);
        assert!((hex.measure_total(0).unwrap() - 16.0).abs() < 1e-10);
    }

    #[test]
    fn spectral_tables_below_order_two_are_rejected() {
        for order in [0, 1] {
            let table = Arc::new(GllTable::new(order));
            let nodes = vec![[0.0; 3]; order];
            assert_eq!(
                ElementMap::spectral_quad(Arc::clone(&table), nodes.clone()).err(),
                Some(EvalError::DimensionMismatch {
                    expected: 2,
                    found: order
                })
            );
            assert!(ElementMap::spectral_hex(table, nodes).is_err());
        }
    }

    #[test]
    fn field_length_is_checked() {
        let hex = cube(1.0);
        assert_eq!(
            hex.evaluate_scalar_field(&[0.0; 3], &[1.0; 4]),
            Err(EvalError::DimensionMismatch {
                expected: 8,
                found: 4
            })
        );
    }
}
