pub mod client;
pub mod error;
pub mod message;
pub mod project;
pub mod protein;
pub mod queue;
pub mod status;
pub mod work_unit;

pub use client::*;
pub use error::{Error, Result};
pub use message::*;
pub use project::*;
pub use protein::*;
pub use queue::*;
pub use status::*;
pub use work_unit::*;
