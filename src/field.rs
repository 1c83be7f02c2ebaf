use ndarray::Array3;

use crate::{
    error::{ReefError, Result},
    interp::remap,
    types::{CompiledFunction, Value},
};

/// Read access to a dense 3D density grid.
///
/// Coordinates are signed so callers can step past the border; implementations
/// must clamp each axis to `[0, dim - 1]` rather than fail.
pub trait FieldSource: Sync {
    /// Number of samples along X.
    fn width(&self) -> usize;
    /// Number of samples along Y.
    fn height(&self) -> usize;
    /// Number of samples along Z (up).
    fn depth(&self) -> usize;
    /// Returns the edge-clamped sample at `(x, y, z)`.
    fn get(&self, x: i64, y: i64, z: i64) -> Value;
}

/// A dense grid of density samples, `width × height × depth`.
///
/// Values are stored as `values[[z, y, x]]`. Densities are expected in `[-1, 1]`,
/// with values below the mesher's isovalue (0 by default) counting as solid terrain.
///
/// The field is immutable once handed to a mesher. Regenerating terrain means
/// building a new field.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField {
    values: Array3<Value>,
}

impl ScalarField {
    /// Creates a field with every sample set to `fill`.
    pub fn new(width: usize, height: usize, depth: usize, fill: Value) -> Result<Self> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(ReefError::InvalidDimensions);
        }
        Ok(Self {
            values: Array3::from_elem((depth, height, width), fill),
        })
    }

    /// Wraps a flat buffer laid out `x + y * width + z * width * height`,
    /// the layout produced by reading back a stacked 2D noise texture.
    pub fn from_vec(width: usize, height: usize, depth: usize, data: Vec<Value>) -> Result<Self> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(ReefError::InvalidDimensions);
        }
        let values = Array3::from_shape_vec((depth, height, width), data)
            .map_err(|_| ReefError::InvalidDimensions)?;
        Ok(Self { values })
    }

    /// Fills a new field by evaluating `function` at every integer sample position.
    pub fn from_fn(
        width: usize,
        height: usize,
        depth: usize,
        function: &CompiledFunction,
    ) -> Result<Self> {
        let mut field = Self::new(width, height, depth, 0.)?;
        field.fill(function);
        Ok(field)
    }

    /// Re-evaluates `function` at every sample.
    pub fn fill(&mut self, function: &CompiledFunction) {
        self.values
            .indexed_iter_mut()
            .for_each(|((z, y, x), v)| *v = function(x, y, z));
    }

    /// Calls `f(x, y, z, &mut value)` for every sample in the grid.
    pub fn for_each_sample<F>(&mut self, mut f: F)
    where
        F: FnMut(usize, usize, usize, &mut Value),
    {
        for ((z, y, x), v) in self.values.indexed_iter_mut() {
            f(x, y, z, v);
        }
    }

    /// Returns a copy with every sample linearly mapped from `range_in` to `range_out`.
    ///
    /// Use this to bring a `[0, 1]` texture readback into the `[-1, 1]` convention.
    pub fn remapped(&self, range_in: [Value; 2], range_out: [Value; 2]) -> Self {
        Self {
            values: self.values.mapv(|v| remap(v, range_in, range_out)),
        }
    }

    /// Smallest and largest sample, or `None` for an all-NaN field.
    pub fn range(&self) -> Option<(Value, Value)> {
        self.values.iter().filter(|v| !v.is_nan()).fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

impl FieldSource for ScalarField {
    fn width(&self) -> usize {
        self.values.dim().2
    }

    fn height(&self) -> usize {
        self.values.dim().1
    }

    fn depth(&self) -> usize {
        self.values.dim().0
    }

    fn get(&self, x: i64, y: i64, z: i64) -> Value {
        let (depth, height, width) = self.values.dim();
        let x = x.clamp(0, width as i64 - 1) as usize;
        let y = y.clamp(0, height as i64 - 1) as usize;
        let z = z.clamp(0, depth as i64 - 1) as usize;
        self.values[[z, y, x]]
    }
}
