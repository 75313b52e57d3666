#![allow(dead_code)]
use mesh_adapt_run::algs::communicator::LocalComm;
use mesh_adapt_run::algs::meshgen::{box_mesh, uniform_size_field};
use mesh_adapt_run::data::fragment::MeshFragment;
use mesh_adapt_run::io::MemoryStore;
use mesh_adapt_run::topology::point::PointId;
use std::thread;

pub fn pid(u: u64) -> PointId {
    PointId::new(u).unwrap()
}

/// Run `f` once per rank of a fresh in-process world, one thread per rank.
/// Results come back in rank order.
pub fn on_world<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(LocalComm) -> T + Send + Sync + Clone + 'static,
{
    let handles: Vec<_> = LocalComm::world(n)
        .into_iter()
        .map(|c| {
            let f = f.clone();
            thread::spawn(move || f(c))
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

/// A store holding a box mesh at `m.mesh` and a uniform size field of `h`
/// at `m.sol`, the default input paths.
pub fn box_store(cells: [usize; 3], extent: [f64; 3], h: f64) -> MemoryStore {
    let store = MemoryStore::new();
    let mesh = box_mesh(cells, extent).unwrap();
    store.insert_solution("m.sol", uniform_size_field(&mesh, h).unwrap());
    store.insert_mesh("m.mesh", mesh);
    store
}

/// Vertex coordinates snapped to a 1e-9 grid and sorted, for id-independent
/// comparison.
pub fn sorted_coords(f: &MeshFragment) -> Vec<[f64; 3]> {
    let snap = |x: f64| (x * 1e9).round() / 1e9;
    let mut c: Vec<[f64; 3]> = f
        .vertices
        .values()
        .map(|v| v.coords.map(snap))
        .collect();
    c.sort_by(|a, b| a.partial_cmp(b).unwrap());
    c
}

pub fn assert_coords_close(got: &[[f64; 3]], want: &[[f64; 3]], tol: f64) {
    assert_eq!(got.len(), want.len(), "vertex counts differ");
    for (a, b) in got.iter().zip(want) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() <= tol, "{a:?} vs {b:?}");
        }
    }
}
