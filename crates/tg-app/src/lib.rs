pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod import;
pub mod job;
pub mod manager;
pub mod scene;
