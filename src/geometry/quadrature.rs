//! 1D quadrature rules and Lagrange bases on `[-1, 1]`.
//!
//! Tensor-product elements build their volume rules from these: Gauss–Legendre
//! points for the fixed-vertex elements, Gauss–Lobatto points (which double as
//! the nodes of spectral elements) for the spectral ones.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

const ROOT_TOL: f64 = 1e-15;
const ROOT_MAX_ITER: usize = 100;

/// Quadrature rule on the reference interval.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadratureRule {
    /// Points in ascending order.
    pub points: Vec<f64>,
    /// Matching weights.
    pub weights: Vec<f64>,
}

impl QuadratureRule {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Legendre polynomial `P_n(x)` together with `P_{n-1}(x)`.
fn legendre_pair(n: usize, x: f64) -> (f64, f64) {
    let (mut p_prev, mut p) = (1.0, x);
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let next = ((2.0 * kf - 1.0) * x * p - (kf - 1.0) * p_prev) / kf;
        p_prev = p;
        p = next;
    }
    (p, p_prev)
}

/// `n`-point Gauss–Legendre rule (exact for degree `2n - 1`).
///
/// Returns an empty rule for `n == 0`.
pub fn gauss_legendre(n: usize) -> QuadratureRule {
    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    let nf = n as f64;
    for i in 0..n {
        let mut x = (PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
        let mut dp = 1.0;
        for _ in 0..ROOT_MAX_ITER {
            let (p, p_prev) = legendre_pair(n, x);
            dp = nf * (x * p - p_prev) / (x * x - 1.0);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < ROOT_TOL {
                break;
            }
        }
        points.push(x);
        weights.push(2.0 / ((1.0 - x * x) * dp * dp));
    }
    sort_rule(points, weights)
}

/// `n`-point Gauss–Lobatto rule, endpoints included (`n >= 2`).
///
/// Exact for degree `2n - 3`.
pub fn gauss_lobatto(n: usize) -> QuadratureRule {
    if n < 2 {
        return QuadratureRule {
            points: vec![0.0; n],
            weights: vec![2.0; n],
        };
    }
    let degree = n - 1;
    let df = degree as f64;
    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for i in 0..n {
        // Chebyshev–Gauss–Lobatto initial guess.
        let mut x = (PI * i as f64 / df).cos();
        if i != 0 && i != degree {
            for _ in 0..ROOT_MAX_ITER {
                let (p, p_prev) = legendre_pair(degree, x);
                let dx = (x * p - p_prev) / ((df + 1.0) * p);
                x -= dx;
                if dx.abs() < ROOT_TOL {
                    break;
                }
            }
        }
        let p_n = legendre_pair(degree, x).0;
        points.push(x);
        weights.push(2.0 / (df * (df + 1.0) * p_n * p_n));
    }
    sort_rule(points, weights)
}

fn sort_rule(points: Vec<f64>, weights: Vec<f64>) -> QuadratureRule {
    let mut pairs: Vec<(f64, f64)> = points.into_iter().zip(weights).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (points, weights) = pairs.into_iter().unzip();
    QuadratureRule { points, weights }
}

/// Lagrange interpolation basis through a set of distinct nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct LagrangeBasis {
    nodes: Vec<f64>,
    /// `1 / prod_{m != j} (x_j - x_m)` per node.
    denominators: Vec<f64>,
}

impl LagrangeBasis {
    pub fn new(nodes: Vec<f64>) -> Self {
        let denominators = (0..nodes.len())
            .map(|j| {
                let prod: f64 = (0..nodes.len())
                    .filter(|&m| m != j)
                    .map(|m| nodes[j] - nodes[m])
                    .product();
                1.0 / prod
            })
            .collect();
        Self {
            nodes,
            denominators,
        }
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Basis values `l_j(x)`.
    pub fn values(&self, x: f64) -> Vec<f64> {
        let n = self.nodes.len();
        (0..n)
            .map(|j| {
                let prod: f64 = (0..n)
                    .filter(|&m| m != j)
                    .map(|m| x - self.nodes[m])
                    .product();
                prod * self.denominators[j]
            })
            .collect()
    }

    /// Basis derivatives `l_j'(x)`.
    pub fn derivatives(&self, x: f64) -> Vec<f64> {
        let n = self.nodes.len();
        (0..n)
            .map(|j| {
                let mut sum = 0.0;
                for k in (0..n).filter(|&k| k != j) {
                    let prod: f64 = (0..n)
                        .filter(|&m| m != j && m != k)
                        .map(|m| x - self.nodes[m])
                        .product();
                    sum += prod;
                }
                sum * self.denominators[j]
            })
            .collect()
    }
}

/// Gauss–Lobatto nodes, weights and Lagrange basis of one element order.
#[derive(Clone, Debug, PartialEq)]
pub struct GllTable {
    pub rule: QuadratureRule,
    pub basis: LagrangeBasis,
}

impl GllTable {
    /// Table for `order` nodes per direction.
    pub fn new(order: usize) -> Self {
        let rule = gauss_lobatto(order);
        let basis = LagrangeBasis::new(rule.points.clone());
        Self { rule, basis }
    }

    /// Nodes per direction.
    pub fn order(&self) -> usize {
        self.rule.len()
    }
}

/// Explicit cache of [`GllTable`]s keyed by order.
///
/// Owned by the coupler; there is no process-global table. Switching the
/// active order with [`LagrangeCache::set_order`] drops every table of a
/// different order.
#[derive(Clone, Debug, Default)]
pub struct LagrangeCache {
    active: Option<usize>,
    tables: HashMap<usize, Arc<GllTable>>,
}

impl LagrangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `order` the active order, invalidating tables of other orders.
    pub fn set_order(&mut self, order: usize) -> Arc<GllTable> {
        if self.active != Some(order) {
            self.tables.retain(|&k, _| k == order);
            self.active = Some(order);
        }
        self.table(order)
    }

    /// Table of `order`, built on first use.
    pub fn table(&mut self, order: usize) -> Arc<GllTable> {
        Arc::clone(
            self.tables
                .entry(order)
                .or_insert_with(|| Arc::new(GllTable::new(order))),
        )
    }

    pub fn active_order(&self) -> Option<usize> {
        self.active
    }

    /// Number of cached orders.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Drops every cached table.
    pub fn clear(&mut self) {
        self.tables.clear();
        self.active = None;
    }
}
