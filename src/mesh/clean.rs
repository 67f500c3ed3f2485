//! Topology cleaning: bowtie detection and splitting.
//!
//! A vertex is a *bowtie* when the triangles around it do not form a single
//! fan under edge adjacency, e.g. two cones touching at their tips. Splitting
//! a bowtie gives every fan after the first its own copy of the vertex.
//!
//! Fans are found with a small union-find over each vertex's incident faces.
//! Incident faces are listed in triangle order and fans are ordered by their
//! lowest face, so duplicate numbering depends only on the input order.

use log::{debug, info, warn};

use super::adjacency::AdjacencyTable;
use super::buffer::MeshBuffer;
use super::index::{FaceId, VertexId};
use crate::error::{AtlasError, Result};

/// A vertex whose incident faces split into several fans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bowtie {
    /// The shared vertex.
    pub vertex: VertexId,
    /// The fans, each sorted by face index, ordered by their first face.
    pub fans: Vec<Vec<FaceId>>,
}

/// Provenance of vertices appended by [`clean`].
///
/// Entry `i` is the original vertex that vertex `base_vertex_count + i` was
/// copied from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicationRecord {
    base_vertex_count: usize,
    sources: Vec<VertexId>,
}

impl DuplicationRecord {
    fn new(base_vertex_count: usize) -> Self {
        Self {
            base_vertex_count,
            sources: Vec::new(),
        }
    }

    /// Vertex count before cleaning.
    pub fn base_vertex_count(&self) -> usize {
        self.base_vertex_count
    }

    /// Number of appended vertices.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether cleaning appended nothing.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Source vertex of each appended vertex, in append order.
    pub fn sources(&self) -> &[VertexId] {
        &self.sources
    }

    /// The original vertex behind `v` (`v` itself if it was not appended).
    pub fn source_of(&self, v: VertexId) -> VertexId {
        v.index()
            .checked_sub(self.base_vertex_count)
            .and_then(|i| self.sources.get(i).copied())
            .unwrap_or(v)
    }

    /// Iterate over `(appended vertex, source vertex)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.sources
            .iter()
            .enumerate()
            .map(move |(i, &src)| (VertexId::new(self.base_vertex_count + i), src))
    }
}

/// Faces incident to each vertex, in compressed row form.
struct VertexFaces {
    offsets: Vec<usize>,
    faces: Vec<u32>,
}

impl VertexFaces {
    fn build(mesh: &MeshBuffer) -> Self {
        let mut offsets = vec![0usize; mesh.vertex_count() + 1];
        for tri in mesh.triangles() {
            for &v in tri {
                offsets[v as usize + 1] += 1;
            }
        }
        for i in 0..mesh.vertex_count() {
            offsets[i + 1] += offsets[i];
        }

        let mut cursor = offsets.clone();
        let mut faces = vec![0u32; offsets[mesh.vertex_count()]];
        for (f, tri) in mesh.triangles().iter().enumerate() {
            for &v in tri {
                faces[cursor[v as usize]] = f as u32;
                cursor[v as usize] += 1;
            }
        }

        Self { offsets, faces }
    }

    /// Faces around `v` in ascending order. A face touching `v` twice appears twice.
    fn of(&self, v: usize) -> &[u32] {
        &self.faces[self.offsets[v]..self.offsets[v + 1]]
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Split the faces around `v` into edge-connected fans.
fn fans_around(
    mesh: &MeshBuffer,
    adjacency: &AdjacencyTable,
    v: u32,
    incident: &[u32],
) -> Vec<Vec<FaceId>> {
    let mut faces = incident.to_vec();
    faces.dedup();

    let mut parent: Vec<usize> = (0..faces.len()).collect();
    for (i, &f) in faces.iter().enumerate() {
        let tri = mesh.triangle(FaceId::from_raw(f));
        for c in (0..3).filter(|&c| tri[c] == v) {
            // The two edges meeting at corner c.
            for edge in [c, (c + 2) % 3] {
                let Some(g) = adjacency.neighbor(FaceId::from_raw(f), edge) else {
                    continue;
                };
                if let Ok(j) = faces.binary_search(&g.raw()) {
                    let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
            }
        }
    }

    let mut fans: Vec<Vec<FaceId>> = Vec::new();
    let mut fan_of_root = vec![usize::MAX; faces.len()];
    for (i, &f) in faces.iter().enumerate() {
        let root = find(&mut parent, i);
        if fan_of_root[root] == usize::MAX {
            fan_of_root[root] = fans.len();
            fans.push(Vec::new());
        }
        fans[fan_of_root[root]].push(FaceId::from_raw(f));
    }
    fans
}

/// Find every bowtie vertex, in vertex order.
///
/// # Errors
///
/// - [`AtlasError::DegenerateMesh`] if the mesh is empty
/// - [`AtlasError::InvalidState`] if `adjacency` was built for a different mesh
pub fn find_bowties(mesh: &MeshBuffer, adjacency: &AdjacencyTable) -> Result<Vec<Bowtie>> {
    if mesh.face_count() == 0 || mesh.vertex_count() == 0 {
        return Err(AtlasError::DegenerateMesh("nothing to clean".into()));
    }
    adjacency.ensure_current(mesh)?;

    let incident = VertexFaces::build(mesh);
    let mut bowties = Vec::new();
    for v in 0..mesh.vertex_count() {
        let around = incident.of(v);
        if around.len() < 2 {
            continue;
        }
        let fans = fans_around(mesh, adjacency, v as u32, around);
        if fans.len() > 1 {
            bowties.push(Bowtie {
                vertex: VertexId::new(v),
                fans,
            });
        }
    }
    Ok(bowties)
}

/// Clean the mesh topology in place.
///
/// With `break_bowties`, each bowtie vertex keeps its first fan and every
/// further fan is re-pointed at a freshly appended copy of the vertex. The
/// returned record lists the source of every appended vertex. Without it the
/// mesh is left untouched and bowties are only reported in the log.
///
/// The adjacency table stays valid for the faces (duplicates sit on the same
/// point), but its vertex count is stale once anything was appended; rebuild
/// it before handing it to a later stage.
///
/// # Errors
///
/// Same as [`find_bowties`].
///
/// # Example
///
/// ```
/// use tessera::mesh::{clean, AdjacencyTable, MeshBuffer};
///
/// // Two triangles touching only at vertex 0.
/// let positions = [
///     [0.0, 0.0, 0.0],
///     [1.0, 0.0, 0.0],
///     [0.0, 1.0, 0.0],
///     [-1.0, 0.0, 0.0],
///     [0.0, -1.0, 0.0],
/// ];
/// let mut mesh = MeshBuffer::create(&positions, &[0, 1, 2, 0, 3, 4]).unwrap();
/// let adjacency = AdjacencyTable::build(&mesh, 0.0).unwrap();
///
/// let record = clean(&mut mesh, &adjacency, true).unwrap();
/// assert_eq!(mesh.vertex_count(), 6);
/// assert_eq!(record.sources().len(), 1);
/// assert_eq!(mesh.index_array(), vec![0, 1, 2, 5, 3, 4]);
/// ```
pub fn clean(
    mesh: &mut MeshBuffer,
    adjacency: &AdjacencyTable,
    break_bowties: bool,
) -> Result<DuplicationRecord> {
    let bowties = find_bowties(mesh, adjacency)?;
    let mut record = DuplicationRecord::new(mesh.vertex_count());

    if bowties.is_empty() {
        debug!("clean: no bowtie vertices");
        return Ok(record);
    }
    if !break_bowties {
        warn!("clean: leaving {} bowtie vertices unbroken", bowties.len());
        return Ok(record);
    }

    let extra: usize = bowties.iter().map(|b| b.fans.len() - 1).sum();
    if mesh.vertex_count() + extra >= u32::MAX as usize {
        return Err(AtlasError::InvalidState(format!(
            "splitting bowties would need {} vertices",
            mesh.vertex_count() + extra
        )));
    }
    record.sources.try_reserve_exact(extra)?;

    for bowtie in &bowties {
        let v = bowtie.vertex;
        for fan in &bowtie.fans[1..] {
            let dup = mesh.duplicate_vertex(v);
            record.sources.push(v);
            for &f in fan {
                let tri = mesh.triangle(f);
                for c in (0..3).filter(|&c| tri[c] == v.raw()) {
                    mesh.set_corner(f, c, dup);
                }
            }
        }
    }

    info!(
        "clean: split {} bowtie vertices into {} new vertices",
        bowties.len(),
        record.len()
    );
    Ok(record)
}
