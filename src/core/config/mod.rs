pub mod data;
pub mod defaults;
pub mod io;


pub use data::{Config, SamplingSettings};
pub use io::ConfigError;
