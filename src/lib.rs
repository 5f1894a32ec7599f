pub mod application;
pub mod config;
pub mod domain;
pub mod durable;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
