//! Fixed, versioned, little-endian wire format for mesh fragments.
//!
//! A fragment travels as
//!
//! ```text
//! WireHdr | WireCounts | WireFrame | WireVertex* | WireTetra* | WireInterface* | solution
//! ```
//!
//! where `solution` is, per entry, a vertex id followed by `sol_size` values,
//! all as `u64` (values as `f64::to_bits`). Boundary triangles and analysis
//! results are process-local and never transmitted.
//!
//! The preprocessing diagnostics use three smaller payloads: a bounding box
//! ([`WireBox`]), a quality histogram ([`WireQuality`]) and a list of
//! per-vertex edge-length sums ([`WireEdgeSum`]).

use crate::data::fragment::{MeshFragment, Tetra, Vertex};
use crate::data::solution::SolutionField;
use crate::geometry::quality::{QUALITY_BINS, QualityHistogram};
use crate::geometry::scaling::{BoundingBox, ScalingFrame, ScalingState};
use crate::mesh_error::MeshAdaptError;
use crate::topology::point::PointId;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::collections::BTreeMap;
use std::mem::size_of;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Record kind of an encoded fragment.
pub const KIND_FRAGMENT: u16 = 1;

// ===== Records =============================================================

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32, // keep zero
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCounts {
    pub n_vertices_le: u64,
    pub n_tetra_le: u64,
    /// Number of `(vertex, rank)` interface pairs.
    pub n_interface_le: u64,
    pub n_solution_le: u64,
    /// Components per solution entry; zero when no solution is attached.
    pub sol_size_le: u32,
    pub scaled_le: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireFrame {
    pub origin_bits_le: [u64; 3],
    pub delta_bits_le: u64,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireVertex {
    pub id_le: u64,
    pub xyz_bits_le: [u64; 3],
    pub reference_le: i32,
    pub _pad: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireTetra {
    pub id_le: u64,
    pub vertices_le: [u64; 4],
    pub reference_le: i32,
    pub _pad: u32,
}

/// `rank_le` is u32 (never usize) on the wire.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireInterface {
    pub vertex_le: u64,
    pub rank_le: u32,
    pub _pad: u32,
}

/// Bounding box exchanged while computing the global scaling frame.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireBox {
    pub min_bits_le: [u64; 3],
    pub max_bits_le: [u64; 3],
}

/// Finished quality histogram of one rank.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireQuality {
    pub bins_le: [u64; QUALITY_BINS],
    pub n_elements_le: u64,
    pub n_invalid_le: u64,
    pub n_skipped_le: u64,
    /// Zero when there is no worst element.
    pub worst_le: u64,
    pub min_bits_le: u64,
    pub max_bits_le: u64,
    pub mean_bits_le: u64,
}

/// Partial sum of incident edge lengths at an interface vertex.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireEdgeSum {
    pub vertex_le: u64,
    pub sum_bits_le: u64,
    pub count_le: u64,
}

const_assert_eq!(size_of::<WireHdr>(), 8);
const_assert_eq!(size_of::<WireEdgeSum>(), 24);
const_assert_eq!(size_of::<WireBox>(), 48);
const_assert_eq!(size_of::<WireQuality>(), 8 * (QUALITY_BINS + 7));
const_assert_eq!(size_of::<WireCounts>(), 40);
const_assert_eq!(size_of::<WireFrame>(), 32);
const_assert_eq!(size_of::<WireVertex>(), 40);
const_assert_eq!(size_of::<WireTetra>(), 48);
const_assert_eq!(size_of::<WireInterface>(), 16);

#[inline]
fn f64_le(x: f64) -> u64 {
    x.to_bits().to_le()
}

#[inline]
fn le_f64(w: u64) -> f64 {
    f64::from_bits(u64::from_le(w))
}

fn wire_id(w: u64) -> Result<PointId, MeshAdaptError> {
    PointId::new(u64::from_le(w)).map_err(|_| MeshAdaptError::Wire("zero point id on wire".into()))
}

// ===== Encoding ============================================================

fn push<T: Pod>(out: &mut Vec<u8>, rec: &T) {
    out.extend_from_slice(bytemuck::bytes_of(rec));
}

/// Serialize a fragment (including its scaling state) to bytes.
pub fn encode_fragment(fragment: &MeshFragment) -> Result<Vec<u8>, MeshAdaptError> {
    let n_interface: usize = fragment.interface.values().map(|r| r.len()).sum();
    let (sol_size, n_solution) = fragment
        .solution
        .as_ref()
        .map_or((0, 0), |s| (s.size(), s.len()));
    let frame = fragment.scaling().frame();

    let mut out = Vec::with_capacity(
        size_of::<WireHdr>()
            + size_of::<WireCounts>()
            + size_of::<WireFrame>()
            + fragment.n_vertices() * size_of::<WireVertex>()
            + fragment.n_elements() * size_of::<WireTetra>()
            + n_interface * size_of::<WireInterface>()
            + n_solution * 8 * (1 + sol_size),
    );
    push(&mut out, &WireHdr::new(KIND_FRAGMENT));
    push(
        &mut out,
        &WireCounts {
            n_vertices_le: (fragment.n_vertices() as u64).to_le(),
            n_tetra_le: (fragment.n_elements() as u64).to_le(),
            n_interface_le: (n_interface as u64).to_le(),
            n_solution_le: (n_solution as u64).to_le(),
            sol_size_le: (sol_size as u32).to_le(),
            scaled_le: u32::from(frame.is_some()).to_le(),
        },
    );
    let frame = frame.unwrap_or(ScalingFrame {
        origin: [0.0; 3],
        delta: 0.0,
    });
    push(
        &mut out,
        &WireFrame {
            origin_bits_le: frame.origin.map(f64_le),
            delta_bits_le: f64_le(frame.delta),
        },
    );
    for (id, v) in &fragment.vertices {
        push(
            &mut out,
            &WireVertex {
                id_le: id.get().to_le(),
                xyz_bits_le: v.coords.map(f64_le),
                reference_le: v.reference.to_le(),
                _pad: 0,
            },
        );
    }
    for (id, t) in &fragment.tetrahedra {
        push(
            &mut out,
            &WireTetra {
                id_le: id.get().to_le(),
                vertices_le: t.vertices.map(|p| p.get().to_le()),
                reference_le: t.reference.to_le(),
                _pad: 0,
            },
        );
    }
    for (v, ranks) in &fragment.interface {
        for &rank in ranks {
            let rank = u32::try_from(rank)
                .map_err(|_| MeshAdaptError::Wire(format!("rank {rank} exceeds u32")))?;
            push(
                &mut out,
                &WireInterface {
                    vertex_le: v.get().to_le(),
                    rank_le: rank.to_le(),
                    _pad: 0,
                },
            );
        }
    }
    if let Some(sol) = &fragment.solution {
        for (v, vals) in sol.iter() {
            out.extend_from_slice(&v.get().to_le_bytes());
            for &x in vals {
                out.extend_from_slice(&x.to_bits().to_le_bytes());
            }
        }
    }
    Ok(out)
}

// ===== Decoding ============================================================

struct Reader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn take<T: Pod>(&mut self) -> Result<T, MeshAdaptError> {
        let end = self.at + size_of::<T>();
        let bytes = self.buf.get(self.at..end).ok_or_else(|| {
            MeshAdaptError::Wire(format!(
                "expected {} bytes at offset {}, buffer holds {}",
                size_of::<T>(),
                self.at,
                self.buf.len()
            ))
        })?;
        self.at = end;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    fn count(&self, raw_le: u64, record: usize) -> Result<usize, MeshAdaptError> {
        let n = u64::from_le(raw_le) as usize;
        // Reject counts that cannot fit before allocating for them.
        if n.saturating_mul(record) > self.buf.len() - self.at {
            return Err(MeshAdaptError::Wire(format!(
                "record count {n} exceeds remaining buffer"
            )));
        }
        Ok(n)
    }
}

/// Rebuild a fragment from [`encode_fragment`] output.
pub fn decode_fragment(buf: &[u8]) -> Result<MeshFragment, MeshAdaptError> {
    let mut r = Reader { buf, at: 0 };
    let hdr: WireHdr = r.take()?;
    if hdr.version() != WIRE_VERSION {
        return Err(MeshAdaptError::Wire(format!(
            "unsupported wire version {} (expected {WIRE_VERSION})",
            hdr.version()
        )));
    }
    if hdr.kind() != KIND_FRAGMENT {
        return Err(MeshAdaptError::Wire(format!(
            "unexpected record kind {}",
            hdr.kind()
        )));
    }
    let counts: WireCounts = r.take()?;
    let wf: WireFrame = r.take()?;

    let mut fragment = MeshFragment::new();
    let n_vertices = r.count(counts.n_vertices_le, size_of::<WireVertex>())?;
    for _ in 0..n_vertices {
        let w: WireVertex = r.take()?;
        fragment.insert_vertex(
            wire_id(w.id_le)?,
            Vertex {
                coords: w.xyz_bits_le.map(le_f64),
                reference: i32::from_le(w.reference_le),
            },
        );
    }
    let n_tetra = r.count(counts.n_tetra_le, size_of::<WireTetra>())?;
    for _ in 0..n_tetra {
        let w: WireTetra = r.take()?;
        let mut vertices = [PointId::new(1)?; 4];
        for (slot, raw) in vertices.iter_mut().zip(w.vertices_le) {
            *slot = wire_id(raw)?;
        }
        fragment.insert_tetra(
            wire_id(w.id_le)?,
            Tetra {
                vertices,
                reference: i32::from_le(w.reference_le),
            },
        );
    }
    let n_interface = r.count(counts.n_interface_le, size_of::<WireInterface>())?;
    for _ in 0..n_interface {
        let w: WireInterface = r.take()?;
        fragment
            .interface
            .entry(wire_id(w.vertex_le)?)
            .or_default()
            .insert(u32::from_le(w.rank_le) as usize);
    }

    let sol_size = u32::from_le(counts.sol_size_le) as usize;
    if sol_size > 0 {
        let mut sol = SolutionField::new(sol_size)?;
        let n_solution = r.count(counts.n_solution_le, 8 * (1 + sol_size))?;
        let mut vals = vec![0.0; sol_size];
        for _ in 0..n_solution {
            let id: u64 = r.take()?;
            for x in vals.iter_mut() {
                *x = le_f64(r.take()?);
            }
            sol.set(wire_id(id)?, &vals)?;
        }
        fragment.solution = Some(sol);
    }

    if u32::from_le(counts.scaled_le) != 0 {
        fragment.set_scaling(ScalingState::Scaled(ScalingFrame {
            origin: wf.origin_bits_le.map(le_f64),
            delta: le_f64(wf.delta_bits_le),
        }));
    }
    if r.at != buf.len() {
        return Err(MeshAdaptError::Wire(format!(
            "{} trailing bytes after fragment",
            buf.len() - r.at
        )));
    }
    Ok(fragment)
}

// ===== Diagnostics records =================================================

fn exact<T: Pod>(buf: &[u8]) -> Result<T, MeshAdaptError> {
    if buf.len() != size_of::<T>() {
        return Err(MeshAdaptError::Wire(format!(
            "expected {} bytes, got {}",
            size_of::<T>(),
            buf.len()
        )));
    }
    Ok(bytemuck::pod_read_unaligned(buf))
}

pub fn encode_box(b: &BoundingBox) -> Vec<u8> {
    bytemuck::bytes_of(&WireBox {
        min_bits_le: b.min.map(f64_le),
        max_bits_le: b.max.map(f64_le),
    })
    .to_vec()
}

pub fn decode_box(buf: &[u8]) -> Result<BoundingBox, MeshAdaptError> {
    let w: WireBox = exact(buf)?;
    Ok(BoundingBox {
        min: w.min_bits_le.map(le_f64),
        max: w.max_bits_le.map(le_f64),
    })
}

pub fn encode_quality(h: &QualityHistogram) -> Vec<u8> {
    bytemuck::bytes_of(&WireQuality {
        bins_le: h.bins.map(|n| (n as u64).to_le()),
        n_elements_le: (h.n_elements as u64).to_le(),
        n_invalid_le: (h.n_invalid as u64).to_le(),
        n_skipped_le: (h.n_skipped as u64).to_le(),
        worst_le: h.worst.map_or(0, |p| p.get()).to_le(),
        min_bits_le: f64_le(h.min),
        max_bits_le: f64_le(h.max),
        mean_bits_le: f64_le(h.mean),
    })
    .to_vec()
}

pub fn decode_quality(buf: &[u8]) -> Result<QualityHistogram, MeshAdaptError> {
    let w: WireQuality = exact(buf)?;
    Ok(QualityHistogram {
        bins: w.bins_le.map(|n| u64::from_le(n) as usize),
        n_elements: u64::from_le(w.n_elements_le) as usize,
        min: le_f64(w.min_bits_le),
        max: le_f64(w.max_bits_le),
        mean: le_f64(w.mean_bits_le),
        worst: PointId::new(u64::from_le(w.worst_le)).ok(),
        n_invalid: u64::from_le(w.n_invalid_le) as usize,
        n_skipped: u64::from_le(w.n_skipped_le) as usize,
    })
}

pub fn encode_edge_sums(sums: &BTreeMap<PointId, (f64, u64)>) -> Vec<u8> {
    let recs: Vec<WireEdgeSum> = sums
        .iter()
        .map(|(v, &(sum, count))| WireEdgeSum {
            vertex_le: v.get().to_le(),
            sum_bits_le: f64_le(sum),
            count_le: count.to_le(),
        })
        .collect();
    bytemuck::cast_slice(&recs).to_vec()
}

pub fn decode_edge_sums(buf: &[u8]) -> Result<Vec<(PointId, f64, u64)>, MeshAdaptError> {
    let rec = size_of::<WireEdgeSum>();
    if buf.len() % rec != 0 {
        return Err(MeshAdaptError::Wire(format!(
            "edge sum buffer of {} bytes is not a multiple of {rec}",
            buf.len()
        )));
    }
    buf.chunks_exact(rec)
        .map(|chunk| {
            let w: WireEdgeSum = bytemuck::pod_read_unaligned(chunk);
            Ok((
                wire_id(w.vertex_le)?,
                le_f64(w.sum_bits_le),
                u64::from_le(w.count_le),
            ))
        })
        .collect()
}
