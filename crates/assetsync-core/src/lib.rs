pub mod config;
pub mod logging;

pub mod checksum;
pub mod decompress;
pub mod engine;
pub mod manifest;
pub mod retry;
pub mod scheduler;
pub mod transport;
