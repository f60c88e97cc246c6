pub mod annotations;
pub mod config;
pub mod error;

