//! The _kmipsim_ library crate.
//!
//! An in-memory crypto manager that keeps a registry of KMIP key
//! providers, answers status queries about them, and records the keys
//! generated with them.

pub mod api;
pub mod cli;
pub mod commons;
pub mod config;
pub mod constants;
pub mod server;
