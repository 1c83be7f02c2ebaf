use crate::{
    field::FieldSource,
    interp::vertex_interpolate,
    tables::{EDGE_CORNERS, EDGE_TABLE, TRI_TABLE},
    types::{Point, Value},
};

/// One voxel cell: 8 integer corner positions and the samples taken there.
///
/// Corners are ordered to match the standard marching cubes convention:
///
/// ```text
///     7----6
///    /|   /|          Z  Y
///   4----5 |          | /
///   | 3--|-2          |/
///   |/   |/           *-- X
///   0----1
///
///  0 = (x,   y,   z  )    4 = (x,   y,   z+1)
///  1 = (x+1, y,   z  )    5 = (x+1, y,   z+1)
///  2 = (x+1, y+1, z  )    6 = (x+1, y+1, z+1)
///  3 = (x,   y+1, z  )    7 = (x,   y+1, z+1)
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cube {
    pub corners: [[i64; 3]; 8],
    pub values: [Value; 8],
}

impl Cube {
    /// Builds the cell whose lowest corner is `(x, y, z)`, sampling `field` at each corner.
    ///
    /// When `open_sky` is set, samples on the field's top Z layer read as that
    /// constant instead, which caps the terrain with a flat lid.
    pub fn sample<F: FieldSource + ?Sized>(
        field: &F,
        x: i64,
        y: i64,
        z: i64,
        open_sky: Option<Value>,
    ) -> Self {
        let corners = corner_positions(x, y, z);
        let top = field.depth() as i64 - 1;
        let values = corners.map(|[cx, cy, cz]| match open_sky {
            Some(sky) if cz >= top => sky,
            _ => field.get(cx, cy, cz),
        });
        Self { corners, values }
    }

    /// World-space position of corner `i` for cells of edge length `scale`.
    #[inline]
    pub fn corner_point(&self, i: usize, scale: Value) -> Point {
        let [x, y, z] = self.corners[i];
        Point::new(x as Value * scale, y as Value * scale, z as Value * scale)
    }
}

/// Returns the 8 grid corner positions of the voxel at `(x, y, z)`.
#[inline]
pub fn corner_positions(x: i64, y: i64, z: i64) -> [[i64; 3]; 8] {
    [
        [x, y, z],
        [x + 1, y, z],
        [x + 1, y + 1, z],
        [x, y + 1, z],
        [x, y, z + 1],
        [x + 1, y, z + 1],
        [x + 1, y + 1, z + 1],
        [x, y + 1, z + 1],
    ]
}

/// Computes the marching cubes index for a voxel.
///
/// A bit is set when the corner's value is **strictly below** the isovalue
/// (i.e. inside the terrain):
///
/// ```text
/// corner index:  7  6  5  4  3  2  1  0
/// index bits:   [_][_][_][_][_][_][_][_]
///                                      ^-- corner 0 inside?
/// ```
#[inline]
pub fn cube_index(values: &[Value; 8], isovalue: Value) -> u8 {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < isovalue)
        .fold(0u8, |index, (i, _)| index | (1 << i))
}

/// Output of [`CubeEvaluator::evaluate`].
///
/// `triangles` index into `vertices`; every edge the surface crosses is populated.
#[derive(Clone, Debug, PartialEq)]
pub struct CubeEvaluation {
    pub index: u8,
    pub triangles: Vec<[usize; 3]>,
    pub vertices: [Option<Point>; 12],
    pub success: bool,
}

impl CubeEvaluation {
    /// Resolves triangle `tri` into its three positions.
    ///
    /// # Panics
    /// Panics if the triangle references an edge that was never interpolated,
    /// which would mean the lookup tables disagree.
    pub fn triangle_points(&self, tri: usize) -> [Point; 3] {
        self.triangles[tri].map(|e| self.vertices[e].expect("edge vertex missing"))
    }
}

/// Evaluates single cells against a fixed isovalue.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubeEvaluator {
    pub isovalue: Value,
    /// World-space size of each voxel edge.
    pub scale: Value,
}

impl Default for CubeEvaluator {
    fn default() -> Self {
        Self {
            isovalue: 0.,
            scale: 1.,
        }
    }
}

impl CubeEvaluator {
    pub fn new(isovalue: Value, scale: Value) -> Self {
        Self { isovalue, scale }
    }

    /// Runs marching cubes on one cell.
    ///
    /// ```text
    /// 1. cube_index            →  256-entry lookup key
    /// 2. EDGE_TABLE[index]     →  bitmask of intersected edges (0 = no surface)
    /// 3. vertex_interpolate    →  crossing point on each active edge
    /// 4. TRI_TABLE[index]      →  edge triples until the -1 sentinel
    /// ```
    pub fn evaluate(&self, cube: &Cube) -> CubeEvaluation {
        let index = cube_index(&cube.values, self.isovalue);
        let edges_mask = EDGE_TABLE[index as usize];

        let mut vertices: [Option<Point>; 12] = [None; 12];
        if edges_mask == 0 {
            return CubeEvaluation {
                index,
                triangles: Vec::new(),
                vertices,
                success: false,
            };
        }

        for (edge, [a, b]) in EDGE_CORNERS.iter().copied().enumerate() {
            if edges_mask & (1 << edge) == 0 {
                continue;
            }
            vertices[edge] = Some(vertex_interpolate(
                self.isovalue,
                cube.corner_point(a, self.scale),
                cube.corner_point(b, self.scale),
                cube.values[a],
                cube.values[b],
            ));
        }

        let triangles = TRI_TABLE[index as usize]
            .chunks_exact(3)
            .take_while(|tri| tri[0] != -1)
            .map(|tri| [tri[0] as usize, tri[1] as usize, tri[2] as usize])
            .collect();

        CubeEvaluation {
            index,
            triangles,
            vertices,
            success: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(values: [Value; 8]) -> Cube {
        Cube {
            corners: corner_positions(0, 0, 0),
            values,
        }
    }

    #[test]
    fn bottom_layer_inside_is_index_15() {
        let eval = CubeEvaluator::default().evaluate(&cube([-1., -1., -1., -1., 1., 1., 1., 1.]));
        assert_eq!(eval.index, 0b0000_1111);
        assert!(eval.success);

        let active: Vec<usize> = (0..12).filter(|&e| eval.vertices[e].is_some()).collect();
        assert_eq!(active, vec![8, 9, 10, 11]);
        assert_eq!(eval.triangles, vec![[9, 8, 10], [10, 8, 11]]);

        for e in active {
            assert_eq!(eval.vertices[e].unwrap().z, 0.5);
        }
    }

    #[test]
    fn uniform_cells_are_rejected() {
        let evaluator = CubeEvaluator::default();
        for v in [-1., 1.] {
            let eval = evaluator.evaluate(&cube([v; 8]));
            assert!(!eval.success);
            assert!(eval.triangles.is_empty());
        }
    }

    #[test]
    fn isovalue_is_exclusive() {
        assert_eq!(cube_index(&[0.; 8], 0.), 0);
        assert_eq!(cube_index(&[-0.1, 0., 0., 0., 0., 0., 0., -0.1], 0.), 0b1000_0001);
    }

    #[test]
    fn scale_stretches_vertices() {
        let eval = CubeEvaluator::new(0., 2.).evaluate(&cube([-1., 1., 1., 1., 1., 1., 1., 1.]));
        assert_eq!(eval.triangles.len(), 1);
        let [a, b, c] = eval.triangle_points(0);
        for p in [a, b, c] {
            assert!(p.iter().all(|&x| x == 0. || x == 1.));
        }
    }

    #[test]
    fn open_sky_caps_the_top_layer() {
        let field = crate::field::ScalarField::new(2, 2, 2, -1.).unwrap();
        let capped = Cube::sample(&field, 0, 0, 0, Some(1.));
        assert_eq!(capped.values, [-1., -1., -1., -1., 1., 1., 1., 1.]);
        let open = Cube::sample(&field, 0, 0, 0, None);
        assert_eq!(open.values, [-1.; 8]);
    }
}
