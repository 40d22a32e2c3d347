pub mod api;
pub mod auth;
pub mod catalog;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod mail;
pub mod model;
pub mod observability;
pub mod signature;
pub mod sql;
pub mod tls;
pub mod wal;
pub mod wire;
