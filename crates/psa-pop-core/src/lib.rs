//! Core types and trait definitions for the PSA population store.
//!
//! This crate is deliberately free of database dependencies. Storage backends
//! implement [`store::PopulationStore`]; the CLI depends only on that trait and
//! the types below.

// We intentionally use native `async fn` in trait impls (stabilised in Rust
// 1.75). Suppress the advisory lint about `Send` bounds on the futures.
#![allow(async_fn_in_trait)]

pub mod card;
pub mod error;
pub mod grade;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
