//! CQL translation service integration
//!
//! This module provides:
//! - Client for submitting CQL source sets to the translation service
//! - Dispatch of the response body to the multipart or single-JSON
//!   decoding path

pub mod client;
pub mod response;

pub use client::{collect_cql_sources, CqlSource, TranslatorClient};
pub use response::decode_response;
