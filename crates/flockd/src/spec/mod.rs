pub mod model;
pub mod store;

pub use model::{parse_image_label, ContainerSpec, FlockSpec, PortSpec};
pub use store::{SpecError, SpecStore};
