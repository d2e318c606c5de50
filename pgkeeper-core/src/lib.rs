pub mod cluster;
pub mod config;
pub mod hash;
pub mod helpers;
pub mod kubernetes;
pub mod resources;
pub mod roles;
pub mod sharding;
