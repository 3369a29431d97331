pub mod core;
pub mod reporting;

pub use self::core::{CoreError, MultiError};
pub use reporting::{ErrorInformation, ErrorService, ErrorType};
