pub mod auth;
pub mod booking;
pub mod calendar;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod sql;
pub mod team;
pub mod tls;
pub mod wal;
pub mod wire;
