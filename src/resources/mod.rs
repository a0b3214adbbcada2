//! Resource management (meshes, materials)

mod material;
mod mesh;

pub use material::*;
pub use mesh::*;
