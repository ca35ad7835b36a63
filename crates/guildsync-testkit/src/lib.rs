//! Guildsync Test Kit - mock infrastructure for testing API integrations
//!
//! - [`MockApiServer`] - wiremock server with Discord-shaped response helpers
//! - [`fixtures`] - JSON bodies for roles, members and guilds
//! - Tracing configuration for test output
//!
//! # Example
//!
//! ```rust,ignore
//! use guildsync_testkit::{fixtures, MockApiServer};
//!
//! #[tokio::test]
//! async fn test_roles() {
//!     guildsync_testkit::init_test_tracing();
//!
//!     let mock = MockApiServer::start().await;
//!     mock.expect_get("/guilds/1/roles", fixtures::roles(&[(10, "Member")])).await;
//!
//!     // point the client at mock.base_url() ...
//!     mock.assert_request_count(1).await;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod fixtures;
mod mock_server;
mod tracing_config;

pub use mock_server::*;
pub use tracing_config::*;
