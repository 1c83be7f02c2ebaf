pub mod algae;
pub mod boid;
pub mod cube;
pub mod error;
pub mod field;
pub mod interp;
pub mod mesh;
pub mod mesher;
pub mod plugin;
pub mod random;
pub mod tables;
pub mod types;
pub mod vegetation;

pub use plugin::ReefPlugin;
