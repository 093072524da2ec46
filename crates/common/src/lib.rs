pub mod error;
pub mod types;
pub mod config;
pub mod utils;

pub use error::{Error, Result};
pub use types::*;
pub use config::*;
