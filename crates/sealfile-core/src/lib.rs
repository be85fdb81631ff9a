pub mod config;
pub mod error;

pub use config::SealConfig;
pub use error::{SealError, SealResult};
