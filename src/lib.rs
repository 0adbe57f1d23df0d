#![deny(clippy::all)]

//! A lock-free pool of reusable decompressors.
//!
//! [`ResourcePool`] keeps idle instances of any [`Reusable`] type under one
//! of three [`Capacity`] policies; [`InflaterPool`] specializes it for
//! zlib/deflate [`Inflater`]s. Share a pool between threads with an `Arc`.

mod config;
mod error;
mod inflater;
#[cfg(feature = "node")]
mod node;
mod pool;

pub use crate::config::{Capacity, InflaterPoolConfig, DEFAULT_CAPACITY};
pub use crate::error::InflateError;
pub use crate::inflater::{Inflater, InflaterPool, Progress};
pub use crate::pool::{Pooled, ResourcePool, Reusable};
