// crates/core/src/lib.rs
pub mod cache;
pub mod config;
pub mod error;
pub mod git;
pub mod paths;
pub mod remote;
pub mod render;
pub mod statusline;
pub mod summary;
pub mod tail;
pub mod transcript;
pub mod types;

pub use cache::CacheStore;
pub use config::*;
pub use error::*;
pub use statusline::*;
pub use types::*;
