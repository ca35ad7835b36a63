//! Guildsync Core - capability interface for third-party service integrations
//!
//! Each external service (chat, forum, voice) is a [`ServiceIntegration`]
//! registered by name in a [`ServiceRegistry`]. Callers hold local state about
//! who should have which groups; integrations turn that into remote calls.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod registry;
mod service;

pub use error::*;
pub use registry::*;
pub use service::*;

pub use async_trait::async_trait;
