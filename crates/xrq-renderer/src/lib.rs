#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::float_cmp,
         clippy::collapsible_if, clippy::manual_range_contains, clippy::comparison_chain)]
// World loading and static light interaction precache

pub mod shader;
pub mod model_types;
pub mod curve;
pub mod stitch;
pub mod entities;
pub mod light;
pub mod sat;
pub mod interaction;
pub mod bsp;

#[cfg(test)]
pub(crate) mod test_map;

pub use bsp::{WorldLoader, WorldSlot};
pub use model_types::World;
pub use shader::{ShaderLookup, ShaderRegistry};
