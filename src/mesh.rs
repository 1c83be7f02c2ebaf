use nalgebra::{Matrix3, Matrix4};

use crate::{
    error::{ReefError, Result},
    types::{Point, Value, Vector},
};

/// Triangle mesh handed to rendering: positions, per-vertex normals and index triples.
///
/// Terrain meshes are flat: every triangle owns three vertex slots and its face
/// normal is repeated on each of them. Meshes grown elsewhere (algae, boid
/// templates) may share vertices between faces.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    /// Vertex positions: `[[x, y, z], ...]`
    pub vertices: Vec<[Value; 3]>,

    /// Per-vertex normals, same length as `vertices`.
    pub normals: Vec<[Value; 3]>,

    /// Triangle index triples into `vertices`: `[[v0, v1, v2], ...]`
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    /// Creates an empty mesh with no vertices, faces, or normals.
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// Builds a mesh and checks its invariants.
    pub fn new(
        vertices: Vec<[Value; 3]>,
        normals: Vec<[Value; 3]>,
        faces: Vec<[u32; 3]>,
    ) -> Result<Self> {
        let mesh = Self {
            vertices,
            normals,
            faces,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Builds a flat-shaded mesh from a triangle soup: every three consecutive
    /// positions form one triangle.
    ///
    /// A trailing partial triangle is dropped.
    pub fn from_triangle_soup(positions: &[Point]) -> Self {
        let mut mesh = Self::new_empty();
        mesh.reserve_triangles(positions.len() / 3);
        for tri in positions.chunks_exact(3) {
            mesh.push_flat_triangle([tri[0], tri[1], tri[2]]);
        }
        mesh
    }

    /// Reserves room for `count` more flat triangles.
    pub fn reserve_triangles(&mut self, count: usize) {
        self.vertices.reserve(count * 3);
        self.normals.reserve(count * 3);
        self.faces.reserve(count);
    }

    /// Appends a triangle with three fresh vertices sharing its face normal.
    pub fn push_flat_triangle(&mut self, tri: [Point; 3]) {
        let normal = face_normal(tri);
        let n = [normal.x, normal.y, normal.z];
        let base = self.vertices.len() as u32;
        for p in tri {
            self.vertices.push([p.x, p.y, p.z]);
            // Push the face normal once per vertex of the triangle.
            self.normals.push(n);
        }
        self.faces.push([base, base + 1, base + 2]);
    }

    /// Appends a vertex and returns its index.
    pub fn push_vertex(&mut self, position: Point, normal: Vector) -> u32 {
        self.vertices.push([position.x, position.y, position.z]);
        self.normals.push([normal.x, normal.y, normal.z]);
        self.vertices.len() as u32 - 1
    }

    /// Appends every vertex and face of `other`, re-basing its indices.
    pub fn append(&mut self, other: &Mesh) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.normals.extend_from_slice(&other.normals);
        self.faces
            .extend(other.faces.iter().map(|f| f.map(|i| i + base)));
    }

    pub fn triangle_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Checks that normals match vertices and every face index is in range.
    pub fn validate(&self) -> Result<()> {
        if self.normals.len() != self.vertices.len() {
            return Err(ReefError::MismatchedNormals);
        }
        let len = self.vertices.len();
        if self.faces.iter().flatten().any(|&i| i as usize >= len) {
            return Err(ReefError::InvalidIndex);
        }
        Ok(())
    }

    /// Returns a copy with positions moved by `transform` and normals by its
    /// rotation part.
    pub fn transformed(&self, transform: &Matrix4<Value>) -> Self {
        let rotation: Matrix3<Value> = transform.fixed_view::<3, 3>(0, 0).into_owned();
        Self {
            vertices: self
                .vertices
                .iter()
                .map(|v| {
                    let p = transform.transform_point(&Point::from(*v));
                    [p.x, p.y, p.z]
                })
                .collect(),
            normals: self
                .normals
                .iter()
                .map(|n| {
                    let n = rotation * Vector::from(*n);
                    [n.x, n.y, n.z]
                })
                .collect(),
            faces: self.faces.clone(),
        }
    }

    /// Uniformly scales every position about the origin.
    pub fn scaled(&self, factor: Value) -> Self {
        Self {
            vertices: self.vertices.iter().map(|v| v.map(|c| c * factor)).collect(),
            normals: self.normals.clone(),
            faces: self.faces.clone(),
        }
    }
}

/// `normalize(cross(v1 - v0, v2 - v0))`, or zero for a degenerate triangle.
pub fn face_normal([a, b, c]: [Point; 3]) -> Vector {
    let cross = (b - a).cross(&(c - a));
    let nrm = cross.norm();
    if nrm == 0.0 {
        Vector::zeros()
    } else {
        cross / nrm
    }
}
