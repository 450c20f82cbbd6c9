pub mod bridge;
pub mod configuration;
pub mod controller;
pub mod cover;
pub mod directory;
pub mod error;
pub mod logging;
pub mod mqtt;
pub mod poller;
pub mod protocol;
pub mod status;

pub use error::{BlindsError, Result};
