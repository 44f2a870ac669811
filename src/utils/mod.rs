//! The `utils` module holds the pieces shared by every other module: the
//! error taxonomy and tracing setup.

pub mod error;
pub mod logging;
