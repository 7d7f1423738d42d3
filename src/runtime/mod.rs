//! # Runtime
//!
//! Process startup and the controller watch loop.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server and client setup
//! - `watch_loop`: runs the `DopplerSecret` controller and restarts it when the stream ends
//! - `error_policy`: requeue decisions for failed reconciliations and watch errors

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
