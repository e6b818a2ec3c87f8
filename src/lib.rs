//! folio-offline library
//!
//! Offline cache manager for the portfolio site: a versioned cache bucket
//! populated on install, pruned on activate and served cache-first on fetch.

pub mod cache;
pub mod cli;
pub mod config;
pub mod host;
pub mod http;
pub mod network;
pub mod policy;
pub mod worker;
