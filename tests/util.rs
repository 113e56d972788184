#![allow(dead_code)]
use mesh_coupler::{
    algs::communicator::LocalComm,
    data::mesh::InMemoryMesh,
    topology::{cell_type::CellType, entity::EntityHandle},
};

/// Corners of the axis-aligned box `[lo, hi]` in hex connectivity order.
pub fn hex_corners(lo: [f64; 3], hi: [f64; 3]) -> [[f64; 3]; 8] {
    [
        [lo[0], lo[1], lo[2]],
        [hi[0], lo[1], lo[2]],
        [hi[0], hi[1], lo[2]],
        [lo[0], hi[1], lo[2]],
        [lo[0], lo[1], hi[2]],
        [hi[0], lo[1], hi[2]],
        [hi[0], hi[1], hi[2]],
        [lo[0], hi[1], hi[2]],
    ]
}

/// Adds a linear hex spanning `[lo, hi]`.
pub fn add_hex(mesh: &mut InMemoryMesh, lo: [f64; 3], hi: [f64; 3]) -> EntityHandle {
    let v: Vec<_> = hex_corners(lo, hi)
        .into_iter()
        .map(|p| mesh.add_vertex(p))
        .collect();
    mesh.add_element(CellType::Hexahedron, &v).unwrap()
}

/// A mesh holding the single hex `[-1, 1]³`.
pub fn unit_cube() -> (InMemoryMesh, EntityHandle) {
    let mut mesh = InMemoryMesh::new();
    let h = add_hex(&mut mesh, [-1.0; 3], [1.0; 3]);
    (mesh, h)
}

/// Sets scalar tag `tag` on every vertex of `e` to `f(x)`.
pub fn tag_vertices(
    mesh: &mut InMemoryMesh,
    e: EntityHandle,
    tag: &str,
    f: impl Fn([f64; 3]) -> f64,
) {
    use mesh_coupler::data::mesh::MeshStore;
    let verts = mesh.connectivity(e).unwrap().to_vec();
    for v in verts {
        let x = mesh.coords(v).unwrap();
        mesh.set_scalar(tag, v, f(x));
    }
}

/// Runs `body` once per rank of a fresh `size`-rank world, each on its own
/// thread, and returns the results in rank order.
pub fn run_world<T, F>(size: usize, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(&LocalComm) -> T + Sync,
{
    let comms = LocalComm::world(size);
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .map(|comm| {
                let body = &body;
                s.spawn(move || body(comm))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

pub fn assert_close(got: f64, want: f64, tol: f64) {
    assert!(
        (got - want).abs() <= tol,
        "got {got}, want {want} (tol {tol})"
    );
}
