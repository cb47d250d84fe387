//! refract library crate
//!
//! The transform-and-preview pipeline behind the `refract` binary. Hosts
//! provide a `DocumentSurface`; `service::RefactorSession` does the rest.

pub mod config;
pub mod error;
pub mod keyring;
pub mod policy;
pub mod preview;
pub mod registry;
pub mod sanitize;
pub mod service;
pub mod surface;
pub mod tone;
pub mod transform;
