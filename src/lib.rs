pub mod config;
pub mod dispatch;
pub mod download;
pub mod error;
pub mod progress;
pub mod response;
pub mod server;
pub mod status;
pub mod tools;
