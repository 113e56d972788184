use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use mesh_coupler::prelude::*;

// 1) Structured n×n×n grid of unit hexes
fn grid(n: usize) -> (InMemoryMesh, Vec<EntityHandle>) {
    let mut mesh = InMemoryMesh::new();
    let stride = n + 1;
    let mut verts = Vec::with_capacity(stride * stride * stride);
    for k in 0..=n {
        for j in 0..=n {
            for i in 0..=n {
                verts.push(mesh.add_vertex([i as f64, j as f64, k as f64]));
            }
        }
    }
    let id = |i: usize, j: usize, k: usize| verts[i + stride * (j + stride * k)];
    let mut hexes = Vec::with_capacity(n * n * n);
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                let conn = [
                    id(i, j, k),
                    id(i + 1, j, k),
                    id(i + 1, j + 1, k),
                    id(i, j + 1, k),
                    id(i, j, k + 1),
                    id(i + 1, j, k + 1),
                    id(i + 1, j + 1, k + 1),
                    id(i, j + 1, k + 1),
                ];
                hexes.push(mesh.add_element(CellType::Hexahedron, &conn).unwrap());
            }
        }
    }
    (mesh, hexes)
}

// 2) Uniform random points inside the grid
fn random_points(n: usize, count: usize, seed: u64) -> Vec<[f64; 3]> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let hi = n as f64;
    (0..count)
        .map(|_| {
            [
                rng.gen_range(0.0..hi),
                rng.gen_range(0.0..hi),
                rng.gen_range(0.0..hi),
            ]
        })
        .collect()
}

fn bench_locate(c: &mut Criterion) {
    let mut group = c.benchmark_group("locate_points");
    for &n in &[8usize, 16, 24] {
        let (mesh, hexes) = grid(n);
        let points = random_points(n, 2_000, 42);
        let mut coupler = Coupler::new(&NoComm, &mesh, &hexes, CouplerConfig::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &points, |b, pts| {
            b.iter(|| coupler.locate_points(pts, 0.0, 0.0).unwrap())
        });
    }
    group.finish();
}

fn bench_interpolate(c: &mut Criterion) {
    let n = 16;
    let (mut mesh, hexes) = grid(n);
    for v in mesh.entities_of_type(CellType::Vertex) {
        let x = mesh.coords(v).unwrap();
        mesh.set_scalar("f", v, x[0] + x[1] * x[2]);
    }
    let points = random_points(n, 2_000, 7);
    let mut coupler = Coupler::new(&NoComm, &mesh, &hexes, CouplerConfig::default()).unwrap();
    coupler.locate_points(&points, 0.0, 0.0).unwrap();
    let mut out = vec![0.0; points.len()];
    c.bench_function("interpolate_linear_fe", |b| {
        b.iter(|| {
            coupler
                .interpolate(&mesh, Method::LinearFe, "f", &mut out, false)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_locate, bench_interpolate);
criterion_main!(benches);
