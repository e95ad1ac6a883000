//! Core types and trait definitions for the referrer graph engine.
//!
//! This crate has no HTTP and database dependencies.
//! Storage backends implement the traits in [`store`]; transports drive the
//! use cases in [`service`].

pub mod builder;
pub mod config;
pub mod digest;
pub mod envelope;
pub mod error;
pub mod referrer;
pub mod service;
pub mod store;
pub mod tenancy;

pub use error::{Error, Result};
