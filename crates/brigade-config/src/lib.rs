//! KDL configuration parsing for the Brigade build controller.
//!
//! The controller is configured once at startup. The resulting
//! [`ControllerConfig`] is immutable and shared by reference.

pub mod controller;
pub mod error;

pub use controller::{ControllerConfig, load_controller_config, parse_controller_config};
pub use error::{ConfigError, ConfigResult};
