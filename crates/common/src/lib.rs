pub mod config;
pub mod error;
pub mod flipside;
pub mod observability;
pub mod types;
