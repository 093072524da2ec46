//! BigQuery access for the mirror
//!
//! This crate handles:
//! - REST v2 resource types (tables, query jobs)
//! - Decoding schemas and rows into typed values
//! - Bearer token resolution
//! - The HTTP client with bounded retries

pub mod auth;
pub mod client;
pub mod codec;
pub mod messages;

pub use auth::TokenProvider;
pub use client::{BigQueryClient, ClientConfig, DEFAULT_API_BASE_URL};
pub use codec::{decode_batch, decode_schema};
pub use messages::*;
