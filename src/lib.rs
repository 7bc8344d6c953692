//! Relaymesh is a dynamically configured load-balancing reverse proxy.
//!
//! It receives HTTP requests, matches their path against a runtime routing
//! table by longest prefix, and forwards each request to one backend of the
//! matched pool, chosen by round-robin among the backends currently marked
//! alive. Routes are installed and replaced while traffic flows, driven by
//! a config source (a Redis registry or a watched route file), and every
//! backend is probed periodically to keep its liveness current.
//!
//! # Architecture
//!
//! - [`balancer`] -- Backends, round-robin pools, and per-pool health monitors.
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate, health).
//! - [`config`] -- Route events, the [`ConfigSource`](config::ConfigSource)
//!   trait with its file, Redis and in-memory implementations, and the
//!   [`ConfigApplier`](config::applier::ConfigApplier) that installs routes.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /_mesh/health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`proxy`] -- Request dispatch: the routing table, header construction, and
//!   forwarding to the selected backend.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML route file support _(enabled by default)_ |
//! | `json` | JSON route file support |
//! | `toml` | TOML route file support |
//! | `redis` | Redis route registry |
//! | `file-backends` | All file format backends |
//! | `full` | All features |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod balancer;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod proxy;
pub mod server;
