mod bounding_box;
mod model_types;
pub mod error;
pub mod gaussian_cloud;
pub mod positioning;

pub use bounding_box::BoundingBox;
pub use model_types::ObjectKind;
