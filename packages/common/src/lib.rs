pub mod cache;
pub mod config;
pub mod storage;

pub use cache::InvalidatingCache;
