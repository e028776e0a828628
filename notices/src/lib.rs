pub mod api;
pub mod api_key;
pub mod config;
pub mod endpoint;
pub mod parser;
pub mod payload;
pub mod prometheus;
pub mod report;
pub mod router;
pub mod server;
pub mod stores;
pub mod time;
pub mod version;
