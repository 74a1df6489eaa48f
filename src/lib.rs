pub mod config;
pub mod db;
pub mod health;
pub mod http;
pub mod model;
pub mod notebook;
pub mod publisher;
pub mod readeck;
pub mod scheduler;
pub mod sync;
