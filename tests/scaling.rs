mod util;
use util::*;

use mesh_adapt_run::data::fragment::{MeshFragment, Vertex};
use mesh_adapt_run::data::solution::SolutionField;
use mesh_adapt_run::geometry::scaling::{BoundingBox, scale_fragment, unscale_fragment};
use proptest::prelude::*;

fn coord() -> impl Strategy<Value = [f64; 3]> {
    proptest::array::uniform3(-1.0e3f64..1.0e3)
}

proptest! {
    #[test]
    fn scaling_round_trips(
        points in proptest::collection::vec(coord(), 2..24),
        metric in proptest::array::uniform6(0.1f64..10.0),
    ) {
        let mut f = MeshFragment::new();
        // Two anchors keep the box away from degenerate.
        f.insert_vertex(pid(1), Vertex::new([-1.0e3, -1.0e3, -1.0e3]));
        f.insert_vertex(pid(2), Vertex::new([1.0e3, 1.0e3, 1.0e3]));
        let mut sol = SolutionField::new(6).unwrap();
        sol.set(pid(1), &metric).unwrap();
        sol.set(pid(2), &metric).unwrap();
        for (i, p) in points.iter().enumerate() {
            let id = pid(i as u64 + 3);
            f.insert_vertex(id, Vertex::new(*p));
            sol.set(id, &metric).unwrap();
        }
        f.solution = Some(sol);
        let before = f.clone();

        let frame = BoundingBox::of(&f).frame().unwrap();
        scale_fragment(&mut f, frame).unwrap();
        for v in f.vertices.values() {
            for c in v.coords {
                prop_assert!((-1e-12..=1.0 + 1e-12).contains(&c), "{}", c);
            }
        }
        unscale_fragment(&mut f).unwrap();
        prop_assert!(!f.scaling().is_scaled());

        for (id, v) in &before.vertices {
            let got = f.vertices[id].coords;
            for i in 0..3 {
                prop_assert!((got[i] - v.coords[i]).abs() <= 1e-9, "{:?} vs {:?}", got, v.coords);
            }
        }
        let (a, b) = (before.solution.unwrap(), f.solution.unwrap());
        for (id, m) in a.iter() {
            for (x, y) in m.iter().zip(b.get(id).unwrap()) {
                prop_assert!((x - y).abs() <= 1e-9 * x.abs());
            }
        }
    }
}

#[test]
fn scaling_twice_is_refused() {
    let mut f = MeshFragment::new();
    f.insert_vertex(pid(1), Vertex::new([0.0; 3]));
    f.insert_vertex(pid(2), Vertex::new([1.0; 3]));
    let frame = BoundingBox::of(&f).frame().unwrap();
    scale_fragment(&mut f, frame).unwrap();
    let scaled = f.clone();
    assert!(scale_fragment(&mut f, frame).is_err());
    assert_eq!(f, scaled);
}
