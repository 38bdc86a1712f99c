pub mod config;
pub mod db;
pub mod detection;
pub mod error;
pub mod logging;
pub mod server;
pub mod service;
pub mod storage;

pub use error::{Error, Result};
