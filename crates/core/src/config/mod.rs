pub mod locator_config;
pub mod sources;
pub mod validation;

pub use locator_config::*;
pub use sources::*;
pub use validation::*;
