//! Batch uploader for publishing local media to a CDN
//!
//! Files are uploaded in parallel through a pluggable [`cdn::CdnService`]
//! backend, optionally behind a content-addressed [`cache::MediaCache`] so
//! identical bytes are only ever uploaded once. Uploaded images can also be
//! published together as a Telegraph gallery page ([`page`]).

pub mod cache;
pub mod cdn;
pub mod error;
pub mod media;
pub mod models;
pub mod output;
pub mod page;
pub mod uploader;

pub use error::{Error, Result};
