pub mod anchor;
pub mod commitment;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod proof;
pub mod storage;
pub mod telemetry;
pub mod verify;
