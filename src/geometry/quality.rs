//! Element quality and edge-length diagnostics.
//!
//! # Quality measure
//! For a tetrahedron with signed volume `V` and squared edge lengths `l_i²`
//! the quality is
//!
//! ```text
//! Q = 72·√3 · V / (Σ l_i²)^(3/2)
//! ```
//!
//! which is `1` for the regular tetrahedron, tends to `0` for flat elements
//! and is negative for inverted ones.
//!
//! # Histograms
//! Both histograms are diagnostics: they are logged on the root process and
//! never cause a phase to fail.

use crate::data::fragment::MeshFragment;
use crate::data::solution::SolutionField;
use crate::topology::adjacency::unique_edges;
use crate::topology::point::PointId;
use std::fmt;

const EPS: f64 = 1e-12;
const ALPHA: f64 = 124.707_658_144_959_6; // 72 * sqrt(3)

/// Number of quality bins: `[0, .2) [.2, .4) [.4, .6) [.6, .8) [.8, 1]`.
pub const QUALITY_BINS: usize = 5;

/// Upper bounds of the edge-length bins (the last bin is open).
pub const LENGTH_BOUNDS: [f64; 8] = [0.3, 0.6, 0.7071, 0.9, 1.3, 1.4142, 2.0, 5.0];

/// Number of edge-length bins.
pub const LENGTH_BINS: usize = 9;

/// Basic quality metrics for a single tetrahedron.
#[derive(Clone, Copy, Debug)]
pub struct TetraQuality {
    /// Normalized shape quality (see module docs).
    pub quality: f64,
    /// Signed volume; negative values indicate inverted orientation.
    pub volume: f64,
    /// Ratio of the longest edge length to the shortest edge length.
    pub aspect_ratio: f64,
}

/// Compute quality metrics from explicit vertex coordinates.
pub fn tetra_quality(v: &[[f64; 3]; 4]) -> TetraQuality {
    let volume = signed_volume(v[0], v[1], v[2], v[3]);
    let mut sum_sq = 0.0;
    let mut min_len = f64::INFINITY;
    let mut max_len = 0.0_f64;
    for (a, b) in TET_EDGES {
        let l2 = norm_sq(sub(v[b], v[a]));
        sum_sq += l2;
        min_len = min_len.min(l2.sqrt());
        max_len = max_len.max(l2.sqrt());
    }
    let quality = if sum_sq <= EPS * EPS {
        0.0
    } else {
        ALPHA * volume / (sum_sq * sum_sq.sqrt())
    };
    let aspect_ratio = if min_len <= EPS {
        f64::INFINITY
    } else {
        max_len / min_len
    };
    TetraQuality {
        quality,
        volume,
        aspect_ratio,
    }
}

/// Distribution of element qualities over a fragment.
#[derive(Clone, Debug, PartialEq)]
pub struct QualityHistogram {
    pub bins: [usize; QUALITY_BINS],
    pub n_elements: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Element with the lowest quality.
    pub worst: Option<PointId>,
    /// Elements with non-positive quality (inverted or flat).
    pub n_invalid: usize,
    /// Elements that could not be evaluated (missing vertices).
    pub n_skipped: usize,
}

impl Default for QualityHistogram {
    fn default() -> Self {
        Self {
            bins: [0; QUALITY_BINS],
            n_elements: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            mean: 0.0,
            worst: None,
            n_invalid: 0,
            n_skipped: 0,
        }
    }
}

impl QualityHistogram {
    fn record(&mut self, id: PointId, q: f64) {
        self.n_elements += 1;
        self.mean += q;
        if q < self.min {
            self.min = q;
            self.worst = Some(id);
        }
        self.max = self.max.max(q);
        if q <= 0.0 {
            self.n_invalid += 1;
        }
        let bin = ((q.max(0.0) * QUALITY_BINS as f64) as usize).min(QUALITY_BINS - 1);
        self.bins[bin] += 1;
    }

    fn finish(mut self) -> Self {
        if self.n_elements > 0 {
            self.mean /= self.n_elements as f64;
        }
        self
    }

    fn absorb(mut self, other: QualityHistogram) -> Self {
        for (a, b) in self.bins.iter_mut().zip(other.bins) {
            *a += b;
        }
        self.n_elements += other.n_elements;
        self.mean += other.mean;
        if other.min < self.min {
            self.min = other.min;
            self.worst = other.worst;
        }
        self.max = self.max.max(other.max);
        self.n_invalid += other.n_invalid;
        self.n_skipped += other.n_skipped;
        self
    }
}

impl QualityHistogram {
    /// Combine two finished histograms, e.g. those of two ranks.
    pub fn combine(self, other: QualityHistogram) -> QualityHistogram {
        let total = |h: &QualityHistogram| h.mean * h.n_elements as f64;
        let (a, b) = (total(&self), total(&other));
        QualityHistogram { mean: a, ..self }
            .absorb(QualityHistogram { mean: b, ..other })
            .finish()
    }
}

impl fmt::Display for QualityHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.n_elements == 0 {
            return write!(f, "  -- MESH QUALITY   (no elements)");
        }
        writeln!(f, "  -- MESH QUALITY   {}", self.n_elements)?;
        write!(
            f,
            "     BEST   {:8.6}  AVRG.   {:8.6}  WRST.   {:8.6}",
            self.max, self.mean, self.min
        )?;
        if let Some(w) = self.worst {
            write!(f, " ({w})")?;
        }
        for (i, n) in self.bins.iter().enumerate().rev() {
            let lo = i as f64 / QUALITY_BINS as f64;
            let hi = (i + 1) as f64 / QUALITY_BINS as f64;
            let pct = 100.0 * *n as f64 / self.n_elements as f64;
            write!(f, "\n     {lo:3.1} < Q < {hi:3.1}   {n:7}   {pct:6.2} %")?;
        }
        Ok(())
    }
}

/// Quality histogram of every tetrahedron in `fragment`.
pub fn quality_histogram(fragment: &MeshFragment) -> QualityHistogram {
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        let tets: Vec<_> = fragment.tetrahedra.iter().collect();
        tets.par_iter()
            .fold(QualityHistogram::default, |mut h, (id, t)| {
                match fragment.corners(**id, t) {
                    Ok(c) => h.record(**id, tetra_quality(&c).quality),
                    Err(_) => h.n_skipped += 1,
                }
                h
            })
            .reduce(QualityHistogram::default, QualityHistogram::absorb)
            .finish()
    }
    #[cfg(not(feature = "rayon"))]
    {
        let mut h = QualityHistogram::default();
        for (&id, t) in &fragment.tetrahedra {
            match fragment.corners(id, t) {
                Ok(c) => h.record(id, tetra_quality(&c).quality),
                Err(_) => h.n_skipped += 1,
            }
        }
        h.finish()
    }
}

/// Distribution of edge lengths measured in the solution metric.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LengthHistogram {
    /// `bins[i]` counts lengths below `LENGTH_BOUNDS[i]` (and at least the
    /// previous bound); the last bin counts everything above `5.0`.
    pub bins: [usize; LENGTH_BINS],
    pub n_edges: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl fmt::Display for LengthHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  -- RESULTING EDGE LENGTHS  {}", self.n_edges)?;
        write!(
            f,
            "     AVERAGE LENGTH   {:12.4}  SMALLEST {:12.4}  LARGEST {:12.4}",
            self.mean, self.min, self.max
        )?;
        let mut lo = 0.0;
        for (i, n) in self.bins.iter().enumerate() {
            let pct = if self.n_edges == 0 {
                0.0
            } else {
                100.0 * *n as f64 / self.n_edges as f64
            };
            match LENGTH_BOUNDS.get(i) {
                Some(hi) => {
                    write!(f, "\n     {lo:6.4} < L < {hi:6.4}  {n:8}   {pct:6.2} %")?;
                    lo = *hi;
                }
                None => write!(f, "\n     {lo:6.4} < L           {n:8}   {pct:6.2} %")?,
            }
        }
        Ok(())
    }
}

/// Length of edge `a → b` in the metric carried by `solution`.
///
/// Isotropic sizes vary linearly along the edge, giving
/// `|e| · ln(h_b / h_a) / (h_b - h_a)`; anisotropic metrics are averaged at
/// the endpoints and applied as `√(eᵀ M e)`.
pub fn metric_length(
    pa: [f64; 3],
    pb: [f64; 3],
    ma: &[f64],
    mb: &[f64],
    solution: &SolutionField,
) -> f64 {
    let e = sub(pb, pa);
    if solution.is_isotropic() {
        let (ha, hb) = (ma[0], mb[0]);
        let len = norm_sq(e).sqrt();
        if (hb - ha).abs() <= EPS * ha.abs().max(1.0) {
            len / ha
        } else {
            len * (hb / ha).ln() / (hb - ha)
        }
    } else {
        let m: Vec<f64> = ma.iter().zip(mb).map(|(a, b)| 0.5 * (a + b)).collect();
        let q = m[0] * e[0] * e[0]
            + m[3] * e[1] * e[1]
            + m[5] * e[2] * e[2]
            + 2.0 * (m[1] * e[0] * e[1] + m[2] * e[0] * e[2] + m[4] * e[1] * e[2]);
        q.max(0.0).sqrt()
    }
}

/// Edge-length histogram of `fragment` in its solution metric, or `None`
/// when the fragment carries no solution.
pub fn length_histogram(fragment: &MeshFragment) -> Option<LengthHistogram> {
    let sol = fragment.solution.as_ref()?;
    let mut h = LengthHistogram {
        min: f64::INFINITY,
        max: 0.0,
        ..Default::default()
    };
    for (a, b) in unique_edges(fragment) {
        let (Some(va), Some(vb)) = (fragment.vertices.get(&a), fragment.vertices.get(&b)) else {
            continue;
        };
        let (Some(ma), Some(mb)) = (sol.get(a), sol.get(b)) else {
            continue;
        };
        let l = metric_length(va.coords, vb.coords, ma, mb, sol);
        if !l.is_finite() {
            continue;
        }
        h.n_edges += 1;
        h.mean += l;
        h.min = h.min.min(l);
        h.max = h.max.max(l);
        let bin = LENGTH_BOUNDS
            .iter()
            .position(|&hi| l < hi)
            .unwrap_or(LENGTH_BOUNDS.len());
        h.bins[bin] += 1;
    }
    if h.n_edges > 0 {
        h.mean /= h.n_edges as f64;
    }
    Some(h)
}

pub(crate) fn signed_volume(a: [f64; 3], b: [f64; 3], c: [f64; 3], d: [f64; 3]) -> f64 {
    let ab = sub(b, a);
    let ac = sub(c, a);
    let ad = sub(d, a);
    dot(ab, cross(ac, ad)) / 6.0
}

pub(crate) fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn norm_sq(a: [f64; 3]) -> f64 {
    dot(a, a)
}

pub(crate) const TET_EDGES: [(usize, usize); 6] =
    [(0, 1), (1, 2), (2, 0), (0, 3), (1, 3), (2, 3)];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fragment::{Tetra, Vertex};

    fn regular() -> [[f64; 3]; 4] {
        let s = 1.0 / 2.0_f64.sqrt();
        [
            [1.0, 0.0, -s],
            [-1.0, 0.0, -s],
            [0.0, 1.0, s],
            [0.0, -1.0, s],
        ]
    }

    #[test]
    fn regular_tetra_has_unit_quality() {
        let q = tetra_quality(&regular());
        assert!((q.quality.abs() - 1.0).abs() < 1e-9, "{}", q.quality);
        assert!((q.aspect_ratio - 1.0).abs() < 1e-12);
    }

    #[test]
    fn inverted_tetra_is_negative() {
        let mut v = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        assert!(tetra_quality(&v).quality > 0.0);
        v.swap(1, 2);
        let q = tetra_quality(&v);
        assert!(q.quality < 0.0);
        assert!(q.volume < 0.0);
    }

    #[test]
    fn histogram_counts_every_element() {
        let p = |u| PointId::new(u).unwrap();
        let mut f = MeshFragment::new();
        f.insert_vertex(p(1), Vertex::new([0.0, 0.0, 0.0]));
        f.insert_vertex(p(2), Vertex::new([1.0, 0.0, 0.0]));
        f.insert_vertex(p(3), Vertex::new([0.0, 1.0, 0.0]));
        f.insert_vertex(p(4), Vertex::new([0.0, 0.0, 1.0]));
        f.insert_vertex(p(5), Vertex::new([0.0, 0.0, 1e-9]));
        f.insert_tetra(p(1), Tetra::new([p(1), p(2), p(3), p(4)]));
        f.insert_tetra(p(2), Tetra::new([p(1), p(2), p(3), p(5)]));
        f.insert_tetra(p(3), Tetra::new([p(1), p(2), p(3), p(9)]));
        let h = quality_histogram(&f);
        assert_eq!(h.n_elements, 2);
        assert_eq!(h.n_skipped, 1);
        assert_eq!(h.bins.iter().sum::<usize>(), 2);
        assert_eq!(h.worst, Some(p(2)));
        assert!(h.to_string().contains("MESH QUALITY"));
    }

    #[test]
    fn combined_histograms_weight_the_mean() {
        let a = QualityHistogram {
            n_elements: 1,
            mean: 1.0,
            min: 1.0,
            max: 1.0,
            ..Default::default()
        };
        let b = QualityHistogram {
            n_elements: 3,
            mean: 0.5,
            min: 0.2,
            max: 0.8,
            ..Default::default()
        };
        let c = a.combine(b);
        assert_eq!(c.n_elements, 4);
        assert!((c.mean - 0.625).abs() < 1e-12);
        assert_eq!((c.min, c.max), (0.2, 1.0));
        let empty = QualityHistogram::default().combine(QualityHistogram::default());
        assert_eq!(empty.n_elements, 0);
        assert_eq!(empty.mean, 0.0);
    }

    #[test]
    fn isotropic_metric_length() {
        let sol = SolutionField::new(1).unwrap();
        let l = metric_length([0.0; 3], [1.0, 0.0, 0.0], &[0.5], &[0.5], &sol);
        assert!((l - 2.0).abs() < 1e-12);
        let graded = metric_length([0.0; 3], [1.0, 0.0, 0.0], &[0.5], &[1.0], &sol);
        assert!(graded > 1.0 && graded < 2.0);
    }

    #[test]
    fn anisotropic_metric_length() {
        let sol = SolutionField::new(6).unwrap();
        let m = [4.0, 0.0, 0.0, 1.0, 0.0, 1.0];
        let lx = metric_length([0.0; 3], [1.0, 0.0, 0.0], &m, &m, &sol);
        let ly = metric_length([0.0; 3], [0.0, 1.0, 0.0], &m, &m, &sol);
        assert!((lx - 2.0).abs() < 1e-12);
        assert!((ly - 1.0).abs() < 1e-12);
    }
}
