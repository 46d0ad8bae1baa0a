//! Resource provider frontend runtime.
//!
//! Wires the document store, the change feed caches and the API together. Every mutating request
//! is applied to the cluster document through a retried conditional update; once committed, an
//! operation record is created and the client polls it through the `operationsstatus` and
//! `operationresults` endpoints.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use rp_frontend_changefeed as changefeed;
pub use rp_frontend_core as core;
pub use rp_frontend_database as database;

mod admin;
pub mod api;
mod args;
pub mod clusters;
mod config;
pub mod operations;
mod server;

pub use self::{
    admin::Admin,
    api::Api,
    args::Args,
    clusters::{Accepted, Clusters},
    config::FrontendConfig,
    operations::{resolve_status, OperationResult, Tracker},
};

#[cfg(test)]
mod test_util;
