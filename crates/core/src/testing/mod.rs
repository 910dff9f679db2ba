pub mod overlay;
pub mod spy;

pub use overlay::{restore, snapshot, MockRegistry, TestContainer, TestContainerBuilder};
pub use spy::Spy;
