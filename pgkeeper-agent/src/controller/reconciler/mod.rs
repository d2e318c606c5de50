pub mod cluster;
pub mod context;
pub mod delta;
pub mod error;
