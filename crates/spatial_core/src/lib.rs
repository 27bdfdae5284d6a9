//! spatial_core: bounding volumes (AABB / sphere) and a dynamic BVH used to
//! answer "which view volumes contain this point?" queries incrementally.

pub mod bound;
pub mod bvh;

pub use bound::{Aabb, Bound, Sphere};
pub use bvh::{touch_bound, touch_point, Bvh, LeafId};
