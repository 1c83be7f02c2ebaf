use derive_more::Display;

pub type Result<T> = core::result::Result<T, ReefError>;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[display("{self:?}")]
pub enum ReefError {
    /// Field dimensions are zero or don't match the supplied sample count.
    InvalidDimensions,
    /// A face references a vertex past the end of the vertex buffer.
    InvalidIndex,
    /// Vertex and normal buffers differ in length.
    MismatchedNormals,
    /// A containment box has `lo > hi` on some axis.
    InvalidBox,
    /// A flock was spawned without any mesh template.
    EmptyTemplates,
}

impl std::error::Error for ReefError {}
