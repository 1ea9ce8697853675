pub mod cache;
pub mod config;
pub mod server;
pub mod tools;
