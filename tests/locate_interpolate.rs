mod util;
use util::*;

use itertools::iproduct;
use mesh_coupler::algs::communicator::{Communicator, NoComm};
use mesh_coupler::config::{CouplerConfig, SPECTRAL_COORD_TAGS};
use mesh_coupler::coupling::{Coupler, Method, PointLocation, norm_factor_tag};
use mesh_coupler::data::mesh::{InMemoryMesh, MeshStore};
use mesh_coupler::geometry::element_map::ElementMap;
use mesh_coupler::geometry::quadrature::GllTable;
use mesh_coupler::mesh_error::CouplerError;
use mesh_coupler::topology::cell_type::CellType;
use mesh_coupler::topology::entity::EntityHandle;

const UNSET: f64 = -999.0;

fn linear(x: [f64; 3]) -> f64 {
    x[0] + 2.0 * x[1] - 3.0 * x[2] + 1.0
}

#[test]
fn shared_cube_prefers_local_owner() {
    let results = run_world(2, |comm| {
        let (mut mesh, hex) = unit_cube();
        tag_vertices(&mut mesh, hex, "temp", |_| 5.0);
        let mut coupler = Coupler::new(comm, &mesh, &[hex], CouplerConfig::default()).unwrap();
        let report = coupler
            .locate_points(&[[0.0, 0.0, 0.0], [5.0, 0.0, 0.0]], 0.0, 0.0)
            .unwrap();
        let mut out = [UNSET; 2];
        coupler
            .interpolate(&mesh, Method::LinearFe, "temp", &mut out, false)
            .unwrap();
        let natural = coupler.located().get(0).map(|loc| {
            assert_eq!(loc.rank, comm.rank());
            coupler.mapped_points()[loc.mapped_index].natural
        });
        (report, coupler.located().get(1), natural, out)
    });
    for (report, outside, natural, out) in results {
        assert_eq!(report.located, 1);
        assert_eq!(report.unlocated_indices, vec![1]);
        assert!(outside.is_none());
        let xi = natural.unwrap();
        for c in xi {
            assert_close(c, 0.0, 1e-12);
        }
        assert_close(out[0], 5.0, 1e-12);
        assert_eq!(out[1], UNSET);
    }
}

#[test]
fn points_travel_to_the_owning_rank() {
    let results = run_world(2, |comm| {
        let me = comm.rank();
        let mut mesh = InMemoryMesh::new();
        let lo = [-1.0 + me as f64, -1.0, -1.0];
        let hi = [me as f64, 1.0, 1.0];
        let hex = add_hex(&mut mesh, lo, hi);
        tag_vertices(&mut mesh, hex, "f", linear);
        let mut coupler = Coupler::new(comm, &mesh, &[hex], CouplerConfig::default()).unwrap();

        // each rank asks for points on both sides
        let points = [
            [-0.5, 0.25, 0.1],
            [0.5, -0.75, 0.9],
            [0.25, 0.5, -0.5],
            [-0.9, -0.1, 0.3],
        ];
        let report = coupler.locate_points(&points, 0.0, 0.0).unwrap();
        assert!(report.all_located());
        let mut out = [UNSET; 4];
        coupler
            .interpolate(&mesh, Method::LinearFe, "f", &mut out, false)
            .unwrap();
        let owners: Vec<usize> = coupler.located().iter().map(|l| l.unwrap().rank).collect();
        (points, owners, out)
    });
    for (points, owners, out) in results {
        assert_eq!(owners, vec![0, 1, 1, 0]);
        for (p, v) in points.iter().zip(out) {
            assert_close(v, linear(*p), 1e-10);
        }
    }
}

#[test]
fn constant_and_normalized_values() {
    let results = run_world(3, |comm| {
        let me = comm.rank();
        let mut mesh = InMemoryMesh::new();
        let hex = add_hex(&mut mesh, [me as f64, 0.0, 0.0], [me as f64 + 1.0, 1.0, 1.0]);
        mesh.set_scalar("p", hex, 10.0 * (me as f64 + 1.0));
        let root = mesh.root_set();
        mesh.set_scalar(&norm_factor_tag("p"), root, 0.5);
        let mut coupler = Coupler::new(comm, &mesh, &[hex], CouplerConfig::default()).unwrap();

        let points: Vec<[f64; 3]> = (0..3).map(|r| [r as f64 + 0.5, 0.5, 0.5]).collect();
        coupler.locate_points(&points, 0.0, 0.0).unwrap();
        let mut plain = [UNSET; 3];
        coupler
            .interpolate(&mesh, Method::Constant, "p", &mut plain, false)
            .unwrap();
        let mut scaled = [UNSET; 3];
        coupler
            .interpolate(&mesh, Method::Constant, "p", &mut scaled, true)
            .unwrap();
        (plain, scaled)
    });
    for (plain, scaled) in results {
        assert_eq!(plain, [10.0, 20.0, 30.0]);
        assert_eq!(scaled, [5.0, 10.0, 15.0]);
    }
}

#[test]
fn batched_methods_split_the_located_points() {
    let (mut mesh, hex) = unit_cube();
    tag_vertices(&mut mesh, hex, "f", linear);
    mesh.set_scalar("c", hex, 7.0);
    let mut coupler = Coupler::new(&NoComm, &mesh, &[hex], CouplerConfig::default()).unwrap();
    let points = [[0.1, 0.2, 0.3], [-0.5, 0.5, 0.0], [0.9, 0.9, 0.9]];
    coupler.locate_points(&points, 0.0, 0.0).unwrap();
    let mut out = [UNSET; 3];
    coupler
        .interpolate_many(
            &mesh,
            &[Method::LinearFe, Method::Constant],
            &["f", "c"],
            &[2, 1],
            &mut out,
            false,
        )
        .unwrap();
    assert_close(out[0], linear(points[0]), 1e-12);
    assert_close(out[1], linear(points[1]), 1e-12);
    assert_eq!(out[2], 7.0);

    let err = coupler
        .interpolate_many(&mesh, &[Method::Constant], &["c"], &[2], &mut out, false)
        .unwrap_err();
    assert!(matches!(err, CouplerError::LengthMismatch { .. }));
}

#[test]
fn tolerance_admits_points_just_outside() {
    let (mesh, hex) = unit_cube();
    let config = CouplerConfig {
        inside_tolerance: 0.1,
        ..CouplerConfig::default()
    };
    let mut coupler = Coupler::new(&NoComm, &mesh, &[hex], config).unwrap();
    let near = [1.05, 0.0, 0.0];
    let strict = coupler.locate_points(&[near], 0.0, 0.0).unwrap();
    assert!(!strict.all_located());
    assert!(matches!(
        strict.require_all(),
        Err(CouplerError::NotLocated { count: 1 })
    ));
    let loose = coupler.locate_points(&[near], 0.0, 0.1).unwrap();
    assert!(loose.all_located());
    assert_eq!(
        coupler.located().get(0),
        Some(PointLocation {
            rank: 0,
            mapped_index: 0
        })
    );
}

#[test]
fn locate_entities_uses_centroids() {
    let mut source = InMemoryMesh::new();
    let a = add_hex(&mut source, [0.0; 3], [1.0; 3]);
    let b = add_hex(&mut source, [1.0, 0.0, 0.0], [2.0, 1.0, 1.0]);
    tag_vertices(&mut source, a, "f", linear);
    tag_vertices(&mut source, b, "f", linear);

    let mut target = InMemoryMesh::new();
    let t = add_hex(&mut target, [0.5, 0.0, 0.0], [1.5, 1.0, 1.0]);
    let lone = target.add_vertex([1.75, 0.25, 0.25]);
    let mut coupler = Coupler::new(&NoComm, &source, &[a, b], CouplerConfig::default()).unwrap();
    let report = coupler.locate_entities(&target, &[t, lone], 0.0, 0.0).unwrap();
    assert!(report.all_located());
    let mut out = [UNSET; 2];
    coupler
        .interpolate(&source, Method::LinearFe, "f", &mut out, false)
        .unwrap();
    assert_close(out[0], linear([1.0, 0.5, 0.5]), 1e-12);
    assert_close(out[1], linear([1.75, 0.25, 0.25]), 1e-12);
    assert_eq!(target.entity_type(lone).unwrap(), CellType::Vertex);
}

#[test]
fn reinitialize_with_new_elements_clears_locations() {
    let mut mesh = InMemoryMesh::new();
    let a = add_hex(&mut mesh, [0.0; 3], [1.0; 3]);
    let b = add_hex(&mut mesh, [5.0; 3], [6.0; 3]);
    let mut coupler = Coupler::new(&NoComm, &mesh, &[a], CouplerConfig::default()).unwrap();
    assert!(
        !coupler
            .locate_points(&[[5.5; 3]], 0.0, 0.0)
            .unwrap()
            .all_located()
    );
    coupler.reinitialize(&mesh, &[b]).unwrap();
    assert!(coupler.located().is_empty());
    assert!(
        coupler
            .locate_points(&[[5.5; 3]], 0.0, 0.0)
            .unwrap()
            .all_located()
    );
    // no elements: keep the index, redo the box exchange
    coupler.reinitialize(&mesh, &[]).unwrap();
    assert_eq!(coupler.source().elements(), &[b]);
}

#[test]
fn empty_source_set_is_an_error() {
    let mesh = InMemoryMesh::new();
    let err = Coupler::new(&NoComm, &mesh, &[], CouplerConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, CouplerError::EmptySourceSet));
}

#[test]
fn box_prefilter_skips_elements_before_inversion() {
    // a loose parametric tolerance would accept the point in `a`, but it is
    // outside `a`'s box, which is checked first
    let mut mesh = InMemoryMesh::new();
    let a = add_hex(&mut mesh, [0.0; 3], [1.0; 3]);
    let b = add_hex(&mut mesh, [1.5, 0.0, 0.0], [2.5, 1.0, 1.0]);
    let config = CouplerConfig {
        inside_tolerance: 0.5,
        ..CouplerConfig::default()
    };
    let mut coupler = Coupler::new(&NoComm, &mesh, &[a, b], config).unwrap();
    assert_eq!(coupler.source().tree().leaf_count(), 1);
    let gap = [1.1, 0.5, 0.5];

    let strict = coupler.locate_points(&[gap], 0.0, 0.0).unwrap();
    assert_eq!(strict.unlocated_indices, vec![0]);
    assert!(coupler.mapped_points().is_empty());

    // growing the boxes lets the same point through to the inverse map
    let loose = coupler.locate_points(&[gap], 0.0, 0.2).unwrap();
    assert!(loose.all_located());
    let mapped = coupler.mapped_points()[0];
    assert_eq!(mapped.handle, a);
    assert_close(mapped.natural[0], 1.2, 1e-10);
}

#[test]
fn failing_owner_releases_the_asking_rank() {
    let results = run_world(2, |comm| {
        let me = comm.rank() as f64;
        let mut mesh = InMemoryMesh::new();
        let hex = add_hex(&mut mesh, [me, 0.0, 0.0], [me + 1.0, 1.0, 1.0]);
        tag_vertices(&mut mesh, hex, "g", linear);
        if comm.rank() == 0 {
            tag_vertices(&mut mesh, hex, "f", linear);
        }
        let mut coupler = Coupler::new(comm, &mesh, &[hex], CouplerConfig::default()).unwrap();
        let points = [[0.5, 0.5, 0.5], [1.5, 0.5, 0.5]];
        coupler.locate_points(&points, 0.0, 0.0).unwrap();
        let mut out = [UNSET; 2];
        let err = coupler
            .interpolate(&mesh, Method::LinearFe, "f", &mut out, false)
            .unwrap_err();

        // every exchange completed, so the coupler is still usable
        let mut again = [UNSET; 2];
        coupler
            .interpolate(&mesh, Method::LinearFe, "g", &mut again, false)
            .unwrap();
        (err, out, points.map(linear), again)
    });
    for (rank, (err, out, want, again)) in results.into_iter().enumerate() {
        if rank == 0 {
            assert!(matches!(err, CouplerError::PeerFailure { ref ranks } if ranks == &[1]));
        } else {
            assert!(matches!(err, CouplerError::MissingTag { ref tag, .. } if tag == "f"));
        }
        assert_eq!(out, [UNSET; 2]);
        for (v, w) in again.into_iter().zip(want) {
            assert_close(v, w, 1e-12);
        }
    }
}

#[test]
fn bad_source_element_fails_initialization_on_every_rank() {
    let results = run_world(2, |comm| {
        let mut mesh = InMemoryMesh::new();
        let e = if comm.rank() == 0 {
            add_hex(&mut mesh, [0.0; 3], [1.0; 3])
        } else {
            let v: Vec<_> = (0..3).map(|i| mesh.add_vertex([i as f64, 0.0, 0.0])).collect();
            mesh.add_element(CellType::Edge, &v).unwrap()
        };
        Coupler::new(comm, &mesh, &[e], CouplerConfig::default()).err()
    });
    assert!(matches!(
        &results[0],
        Some(CouplerError::PeerFailure { ranks }) if ranks == &[1]
    ));
    assert!(matches!(
        results[1],
        Some(CouplerError::UnsupportedElement { nodes: 3, .. })
    ));
}

const SEM_ORDER: usize = 3;

/// Adds a hex over `[lo, hi]` carrying Gauss–Lobatto node coordinates of
/// `order` in the spectral coordinate tags and `f` at those nodes in `tag`.
fn add_spectral_hex(
    mesh: &mut InMemoryMesh,
    lo: [f64; 3],
    hi: [f64; 3],
    order: usize,
    tag: &str,
    f: impl Fn([f64; 3]) -> f64,
) -> EntityHandle {
    let hex = add_hex(mesh, lo, hi);
    let pts = GllTable::new(order).rule.points;
    let at = |d: usize, t: f64| lo[d] + 0.5 * (t + 1.0) * (hi[d] - lo[d]);
    let nodes: Vec<[f64; 3]> = iproduct!(0..order, 0..order, 0..order)
        .map(|(k, j, i)| [at(0, pts[i]), at(1, pts[j]), at(2, pts[k])])
        .collect();
    for (d, name) in SPECTRAL_COORD_TAGS.iter().enumerate() {
        let axis: Vec<f64> = nodes.iter().map(|p| p[d]).collect();
        mesh.tag_set(name, hex, &axis).unwrap();
    }
    let values: Vec<f64> = nodes.iter().map(|&p| f(p)).collect();
    mesh.tag_set(tag, hex, &values).unwrap();
    hex
}

fn quadratic(x: [f64; 3]) -> f64 {
    x[0] * x[0] + x[1] * x[2] - x[1]
}

#[test]
fn spectral_hexes_locate_interpolate_and_normalize() {
    let results = run_world(2, |comm| {
        let me = comm.rank() as f64;
        let mut mesh = InMemoryMesh::new();
        let (lo, hi) = ([me, 0.0, 0.0], [me + 1.0, 1.0, 1.0]);
        let hex = add_spectral_hex(&mut mesh, lo, hi, SEM_ORDER, "s", quadratic);
        let ones = vec![1.0; SEM_ORDER.pow(3)];
        mesh.tag_set("one", hex, &ones).unwrap();
        let config = CouplerConfig {
            spectral_order: Some(SEM_ORDER),
            ..CouplerConfig::default()
        };
        let mut coupler = Coupler::new(comm, &mesh, &[hex], config).unwrap();
        assert!(matches!(
            coupler.source().map(0),
            Some(ElementMap::SpectralHex(_))
        ));

        let points = [[0.3, 0.8, 0.1], [1.7, 0.25, 0.6], [1.05, 0.5, 0.95]];
        assert!(coupler.locate_points(&points, 0.0, 0.0).unwrap().all_located());
        let owners: Vec<usize> = coupler.located().iter().map(|l| l.unwrap().rank).collect();
        let mut out = [UNSET; 3];
        coupler
            .interpolate(&mesh, Method::Spectral, "s", &mut out, false)
            .unwrap();

        let root = mesh.root_set();
        let factor = coupler
            .normalize_mesh(&mut mesh, root, "one", Method::Spectral, SEM_ORDER)
            .unwrap();
        let mut scaled = [UNSET; 3];
        coupler
            .interpolate(&mesh, Method::Spectral, "one", &mut scaled, true)
            .unwrap();
        (points, owners, out, factor, scaled)
    });
    for (points, owners, out, factor, scaled) in results {
        assert_eq!(owners, vec![0, 1, 1]);
        for (p, v) in points.iter().zip(out) {
            assert_close(v, quadratic(*p), 1e-10);
        }
        // two unit cubes
        assert_close(factor, 0.5, 1e-12);
        for v in scaled {
            assert_close(v, 0.5, 1e-12);
        }
    }
}

#[test]
fn spectral_order_switch_takes_effect_on_reinitialize() {
    let mut mesh = InMemoryMesh::new();
    let hex = add_spectral_hex(&mut mesh, [0.0; 3], [1.0; 3], SEM_ORDER, "s", linear);
    tag_vertices(&mut mesh, hex, "f", linear);
    let mut coupler = Coupler::new(&NoComm, &mesh, &[hex], CouplerConfig::default()).unwrap();
    assert!(matches!(
        coupler.source().map(0),
        Some(ElementMap::LinearHex { .. })
    ));

    assert!(matches!(
        coupler.set_spectral_order(Some(1)),
        Err(CouplerError::InvalidConfig(_))
    ));
    assert_eq!(coupler.config().spectral_order, None);

    coupler.set_spectral_order(Some(SEM_ORDER)).unwrap();
    // still the old map until the index is rebuilt
    assert!(matches!(
        coupler.source().map(0),
        Some(ElementMap::LinearHex { .. })
    ));
    coupler.reinitialize(&mesh, &[hex]).unwrap();
    assert!(matches!(
        coupler.source().map(0),
        Some(ElementMap::SpectralHex(_))
    ));
    let p = [0.3, 0.6, 0.2];
    coupler.locate_points(&[p], 0.0, 0.0).unwrap();
    let mut out = [UNSET];
    coupler
        .interpolate(&mesh, Method::Spectral, "s", &mut out, false)
        .unwrap();
    assert_close(out[0], linear(p), 1e-10);

    coupler.set_spectral_order(None).unwrap();
    coupler.reinitialize(&mesh, &[hex]).unwrap();
    assert!(matches!(
        coupler.source().map(0),
        Some(ElementMap::LinearHex { .. })
    ));
    coupler.locate_points(&[p], 0.0, 0.0).unwrap();
    coupler
        .interpolate(&mesh, Method::LinearFe, "f", &mut out, false)
        .unwrap();
    assert_close(out[0], linear(p), 1e-12);
}

/// Reference positions of the 27 hex nodes: corners, bottom/vertical/top
/// mid-edges, mid-faces (`-y, +x, +y, -x, -z, +z`), center.
const HEX27: [[f64; 3]; 27] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
    [0.0, -1.0, -1.0],
    [1.0, 0.0, -1.0],
    [0.0, 1.0, -1.0],
    [-1.0, 0.0, -1.0],
    [-1.0, -1.0, 0.0],
    [1.0, -1.0, 0.0],
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [0.0, -1.0, 1.0],
    [1.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [-1.0, 0.0, 1.0],
    [0.0, -1.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, 0.0, -1.0],
    [0.0, 0.0, 1.0],
    [0.0, 0.0, 0.0],
];

/// Adds a 27-node hex over `[lo, hi]` with `f` on its vertices in `tag`.
fn add_hex27(
    mesh: &mut InMemoryMesh,
    lo: [f64; 3],
    hi: [f64; 3],
    tag: &str,
    f: impl Fn([f64; 3]) -> f64,
) -> EntityHandle {
    let verts: Vec<_> = HEX27
        .iter()
        .map(|r| {
            let x: [f64; 3] = std::array::from_fn(|d| lo[d] + 0.5 * (r[d] + 1.0) * (hi[d] - lo[d]));
            let v = mesh.add_vertex(x);
            mesh.set_scalar(tag, v, f(x));
            v
        })
        .collect();
    mesh.add_element(CellType::Hexahedron, &verts).unwrap()
}

#[test]
fn quadratic_hexes_reproduce_quadratic_fields() {
    let results = run_world(2, |comm| {
        let x0 = 2.0 * comm.rank() as f64;
        let mut mesh = InMemoryMesh::new();
        let hex = add_hex27(&mut mesh, [x0, 0.0, 0.0], [x0 + 2.0, 1.0, 1.0], "q", quadratic);
        let mut coupler = Coupler::new(comm, &mesh, &[hex], CouplerConfig::default()).unwrap();
        assert!(matches!(
            coupler.source().map(0),
            Some(ElementMap::QuadraticHex { .. })
        ));
        let points = [[1.3, 0.4, 0.7], [2.9, 0.1, 0.5], [0.2, 0.9, 0.9]];
        assert!(coupler.locate_points(&points, 0.0, 0.0).unwrap().all_located());
        let owners: Vec<usize> = coupler.located().iter().map(|l| l.unwrap().rank).collect();
        let mut out = [UNSET; 3];
        coupler
            .interpolate(&mesh, Method::QuadraticFe, "q", &mut out, false)
            .unwrap();

        let root = mesh.root_set();
        let factor = coupler
            .normalize_mesh(&mut mesh, root, "q", Method::QuadraticFe, 3)
            .unwrap();
        (points, owners, out, factor)
    });
    // ∫ over [0,4]×[0,1]² of x² + yz - y is 64/3 + 1 - 2
    let integral = 64.0 / 3.0 + 1.0 - 2.0;
    for (points, owners, out, factor) in results {
        assert_eq!(owners, vec![0, 1, 0]);
        for (p, v) in points.iter().zip(out) {
            assert_close(v, quadratic(*p), 1e-10);
        }
        assert_close(factor, 1.0 / integral, 1e-12);
    }
}
