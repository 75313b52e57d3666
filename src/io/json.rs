//! JSON mesh store.
//!
//! A mesh file holds `{ "vertices": [...], "tetrahedra": [...], "boundary": [...] }`;
//! a solution file holds `{ "size": 1 | 6, "values": [{ "id", "values" }] }`.

use super::MeshStore;
use crate::data::fragment::{BoundaryTriangle, MeshFragment, Tetra, Vertex};
use crate::data::solution::SolutionField;
use crate::mesh_error::MeshAdaptError;
use crate::topology::point::PointId;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

#[derive(Serialize, Deserialize)]
struct VertexRecord {
    id: PointId,
    coords: [f64; 3],
    #[serde(default)]
    reference: i32,
}

#[derive(Serialize, Deserialize)]
struct TetraRecord {
    id: PointId,
    vertices: [PointId; 4],
    #[serde(default)]
    reference: i32,
}

#[derive(Serialize, Deserialize)]
struct TriangleRecord {
    vertices: [PointId; 3],
    #[serde(default)]
    reference: i32,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MeshDocument {
    vertices: Vec<VertexRecord>,
    tetrahedra: Vec<TetraRecord>,
    #[serde(default)]
    boundary: Vec<TriangleRecord>,
}

#[derive(Serialize, Deserialize)]
struct SolutionRecord {
    id: PointId,
    values: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SolutionDocument {
    size: usize,
    values: Vec<SolutionRecord>,
}

/// File-backed store using `serde_json` documents.
#[derive(Clone, Debug, Default)]
pub struct JsonMeshStore {
    /// Pretty-print written documents.
    pub pretty: bool,
}

impl JsonMeshStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, MeshAdaptError> {
        let file = File::open(path).map_err(|e| MeshAdaptError::io(path, e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| MeshAdaptError::Serialization {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn write<T: Serialize>(&self, path: &Path, doc: &T) -> Result<(), MeshAdaptError> {
        let file = File::create(path).map_err(|e| MeshAdaptError::io(path, e))?;
        let mut out = BufWriter::new(file);
        let encoded = if self.pretty {
            serde_json::to_writer_pretty(&mut out, doc)
        } else {
            serde_json::to_writer(&mut out, doc)
        };
        encoded.map_err(|e| MeshAdaptError::Serialization {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        out.flush().map_err(|e| MeshAdaptError::io(path, e))
    }
}

impl MeshStore for JsonMeshStore {
    fn load_mesh(&mut self, path: &Path) -> Result<MeshFragment, MeshAdaptError> {
        let doc: MeshDocument = Self::read(path)?;
        let mut fragment = MeshFragment::new();
        for v in doc.vertices {
            if fragment.vertices.contains_key(&v.id) {
                return Err(MeshAdaptError::InvalidInput(format!(
                    "duplicate vertex id {} in {}",
                    v.id,
                    path.display()
                )));
            }
            fragment.insert_vertex(
                v.id,
                Vertex {
                    coords: v.coords,
                    reference: v.reference,
                },
            );
        }
        for t in doc.tetrahedra {
            if fragment.tetrahedra.contains_key(&t.id) {
                return Err(MeshAdaptError::InvalidInput(format!(
                    "duplicate element id {} in {}",
                    t.id,
                    path.display()
                )));
            }
            fragment.insert_tetra(
                t.id,
                Tetra {
                    vertices: t.vertices,
                    reference: t.reference,
                },
            );
        }
        fragment.boundary = doc
            .boundary
            .into_iter()
            .map(|b| BoundaryTriangle {
                vertices: b.vertices,
                reference: b.reference,
            })
            .collect();
        log::debug!(
            "read {} vertices and {} elements from {}",
            fragment.n_vertices(),
            fragment.n_elements(),
            path.display()
        );
        Ok(fragment)
    }

    fn load_solution(
        &mut self,
        path: &Path,
        fragment: &mut MeshFragment,
    ) -> Result<bool, MeshAdaptError> {
        match path.try_exists() {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(MeshAdaptError::io(path, e)),
        }
        let doc: SolutionDocument = Self::read(path)?;
        let mut sol = SolutionField::new(doc.size)?;
        for rec in doc.values {
            sol.set(rec.id, &rec.values)?;
        }
        fragment.solution = Some(sol);
        Ok(true)
    }

    fn save_mesh(&mut self, path: &Path, fragment: &MeshFragment) -> Result<(), MeshAdaptError> {
        let doc = MeshDocument {
            vertices: fragment
                .vertices
                .iter()
                .map(|(&id, v)| VertexRecord {
                    id,
                    coords: v.coords,
                    reference: v.reference,
                })
                .collect(),
            tetrahedra: fragment
                .tetrahedra
                .iter()
                .map(|(&id, t)| TetraRecord {
                    id,
                    vertices: t.vertices,
                    reference: t.reference,
                })
                .collect(),
            boundary: fragment
                .boundary
                .iter()
                .map(|b| TriangleRecord {
                    vertices: b.vertices,
                    reference: b.reference,
                })
                .collect(),
        };
        self.write(path, &doc)
    }

    fn save_solution(
        &mut self,
        path: &Path,
        fragment: &MeshFragment,
    ) -> Result<(), MeshAdaptError> {
        let sol = fragment.solution.as_ref().ok_or_else(|| {
            MeshAdaptError::InvalidInput("fragment carries no solution to save".into())
        })?;
        let doc = SolutionDocument {
            size: sol.size(),
            values: sol
                .iter()
                .map(|(id, values)| SolutionRecord {
                    id,
                    values: values.to_vec(),
                })
                .collect(),
        };
        self.write(path, &doc)
    }
}
