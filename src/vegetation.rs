use rand::Rng;
use tracing::debug;

use crate::{
    mesh::Mesh,
    types::{Point, Value, Vector},
};

/// Rules for picking algae roots on a terrain mesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VegetationSettings {
    /// Direction treated as "up" for the steepness test.
    pub up: Vector,
    /// Only vertices whose normal has `dot(normal, up)` below this qualify.
    pub steepness: Value,
    /// Chance that a qualifying vertex is considered at all.
    pub probability: Value,
    /// Offset subtracted from the dot product before applying the bias.
    pub bias_offset: Value,
    /// Power applied to `dot - bias_offset`.
    pub bias_exponent: i32,
}

impl Default for VegetationSettings {
    fn default() -> Self {
        Self {
            up: Vector::z(),
            steepness: -0.2,
            probability: 0.002,
            bias_offset: 0.1,
            bias_exponent: 4,
        }
    }
}

impl VegetationSettings {
    pub fn with_probability(mut self, probability: Value) -> Self {
        self.probability = probability;
        self
    }

    pub fn with_steepness(mut self, steepness: Value) -> Self {
        self.steepness = steepness;
        self
    }

    /// Acceptance weight for a vertex whose normal has `dot` against `up`.
    pub fn bias(&self, dot: Value) -> Value {
        (dot - self.bias_offset).powi(self.bias_exponent)
    }
}

/// Picks algae roots among the vertices of `mesh`.
///
/// Vertices are visited in order. A qualifying vertex passes the probability gate
/// with one draw and the steepness bias with a second, so steeper faces win
/// far more often.
pub fn scatter<R: Rng + ?Sized>(mesh: &Mesh, settings: &VegetationSettings, rng: &mut R) -> Vec<Point> {
    let roots: Vec<Point> = mesh
        .vertices
        .iter()
        .zip(&mesh.normals)
        .filter_map(|(v, n)| {
            let dot = Vector::from(*n).dot(&settings.up);
            if dot >= settings.steepness {
                return None;
            }
            if rng.r#gen::<Value>() >= settings.probability {
                return None;
            }
            (rng.r#gen::<Value>() < settings.bias(dot)).then(|| Point::from(*v))
        })
        .collect();

    debug!(candidates = mesh.vertices.len(), roots = roots.len(), "algae scattered");
    roots
}
