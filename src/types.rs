use nalgebra::{Point3, Vector3};

/// Scalar field value at a point in space.
pub type Value = f32;

/// A 3D point with [`Value`] components.
pub type Point = Point3<Value>;

/// A 3D vector with [`Value`] components.
pub type Vector = Vector3<Value>;

/// A scalar field function: maps integer grid coordinates to a [`Value`].
///
/// Return values **below** the mesher's isovalue are considered "inside" the terrain.
pub type CompiledFunction = dyn Fn(usize, usize, usize) -> Value + Sync;

/// Tolerance used by interpolation short-circuits.
pub const EPSILON: Value = 1e-6;
