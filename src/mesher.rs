use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info_span, trace};

use crate::{
    cube::{Cube, CubeEvaluator},
    field::FieldSource,
    mesh::Mesh,
    types::{Point, Value},
};

/// Settings for [`TerrainMesher`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MesherSettings {
    /// Iso-surface threshold. Samples strictly below it are solid.
    pub isovalue: Value,
    /// World-space size of each voxel edge.
    pub scale: Value,
    /// Value forced onto the top Z layer so the volume is capped flat.
    /// `None` samples the field as-is.
    pub open_sky: Option<Value>,
    /// Split the cell loop into Z slabs and mesh them on the rayon pool.
    pub parallel: bool,
}

impl Default for MesherSettings {
    fn default() -> Self {
        Self {
            isovalue: 0.,
            scale: 1.,
            open_sky: None,
            parallel: true,
        }
    }
}

impl MesherSettings {
    pub fn with_isovalue(mut self, isovalue: Value) -> Self {
        self.isovalue = isovalue;
        self
    }

    pub fn with_scale(mut self, scale: Value) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_open_sky(mut self, open_sky: Option<Value>) -> Self {
        self.open_sky = open_sky;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Turns a density field into a flat-shaded terrain [`Mesh`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TerrainMesher {
    pub settings: MesherSettings,
}

impl TerrainMesher {
    pub fn new(settings: MesherSettings) -> Self {
        Self { settings }
    }

    /// Runs marching cubes over every cell of `field`.
    ///
    /// Cells are visited z-major (`z`, then `y`, then `x`). With
    /// [`parallel`](MesherSettings::parallel) each Z slab is meshed on its own and
    /// the slabs are concatenated in order, so both paths produce the same mesh.
    ///
    /// ```text
    /// Per cell:
    /// 1. Cube::sample           →  8 corners + 8 samples (top layer capped)
    /// 2. CubeEvaluator          →  0-5 triangles over interpolated edge points
    /// 3. push_flat_triangle     →  3 fresh vertices + replicated face normal
    /// ```
    pub fn build<F: FieldSource + ?Sized>(&self, field: &F) -> Mesh {
        let (w, h, d) = (field.width(), field.height(), field.depth());
        let _span = info_span!("terrain_build", w, h, d).entered();

        if w < 2 || h < 2 || d < 2 {
            debug!("field too thin to hold a cell, emitting empty mesh");
            return Mesh::new_empty();
        }

        let mesh = if self.settings.parallel {
            let slabs: Vec<Mesh> = (0..d - 1)
                .into_par_iter()
                .map(|z| self.build_slab(field, z))
                .collect();

            let mut mesh = Mesh::new_empty();
            mesh.reserve_triangles(slabs.iter().map(Mesh::triangle_count).sum());
            for slab in &slabs {
                mesh.append(slab);
            }
            mesh
        } else {
            let mut mesh = Mesh::new_empty();
            for z in 0..d - 1 {
                mesh.append(&self.build_slab(field, z));
            }
            mesh
        };

        debug!(
            cells = (w - 1) * (h - 1) * (d - 1),
            triangles = mesh.triangle_count(),
            "terrain mesh built"
        );
        mesh
    }

    /// Meshes the single layer of cells whose lowest corner sits at `z`.
    fn build_slab<F: FieldSource + ?Sized>(&self, field: &F, z: usize) -> Mesh {
        let evaluator = CubeEvaluator::new(self.settings.isovalue, self.settings.scale);
        let mut local = Mesh::new_empty();

        for y in 0..field.height() - 1 {
            for x in 0..field.width() - 1 {
                let cube = Cube::sample(field, x as i64, y as i64, z as i64, self.settings.open_sky);
                let eval = evaluator.evaluate(&cube);
                if !eval.success {
                    continue;
                }
                for tri in 0..eval.triangles.len() {
                    let points: [Point; 3] = eval.triangle_points(tri);
                    local.push_flat_triangle(points);
                }
            }
        }

        trace!(z, triangles = local.triangle_count(), "slab meshed");
        local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::ScalarField;

    fn plane_field(height: Value) -> ScalarField {
        ScalarField::from_fn(4, 4, 4, &move |_, _, z| z as Value - height).unwrap()
    }

    #[test]
    fn flat_ground_yields_one_quad_per_column() {
        let mesh = TerrainMesher::default().build(&plane_field(1.5));
        // 3×3 columns of cells, one quad (two triangles) each, at z = 1.5.
        assert_eq!(mesh.triangle_count(), 18);
        assert!(mesh.vertices.iter().all(|v| (v[2] - 1.5).abs() < 1e-6));
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn open_sky_closes_a_solid_volume() {
        let solid = ScalarField::new(3, 3, 3, -1.).unwrap();
        assert!(TerrainMesher::default().build(&solid).is_empty());

        let capped = TerrainMesher::new(MesherSettings::default().with_open_sky(Some(1.))).build(&solid);
        assert_eq!(capped.triangle_count(), 8);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let field = ScalarField::from_fn(6, 5, 7, &|x, y, z| {
            ((x as Value * 0.9).sin() + (y as Value * 1.3).cos()) * 0.5 - (z as Value - 3.) * 0.3
        })
        .unwrap();
        let par = TerrainMesher::default().build(&field);
        let seq = TerrainMesher::new(MesherSettings::default().with_parallel(false)).build(&field);
        assert_eq!(par, seq);
        assert!(!par.is_empty());
    }

    #[test]
    fn thin_fields_are_empty() {
        let field = ScalarField::new(1, 5, 5, -1.).unwrap();
        assert!(TerrainMesher::default().build(&field).is_empty());
    }
}
