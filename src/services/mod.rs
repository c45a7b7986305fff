//! Built-in services.

pub mod demo;
