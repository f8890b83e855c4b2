//! CQL -> ELM processing for FHIR Library/Measure resources
//!
//! This crate round-trips computational content between the authored CQL
//! source embedded in a FHIR resource and the compiled ELM produced by an
//! external `cql-translation-service`:
//!
//! - tolerant decoding of the service's loosely formed multipart
//!   responses ([`multipart`], [`translator::response`])
//! - the extract -> translate -> merge pipeline ([`processor`])
//! - direct ELM injection into a resource file ([`inject`])

pub mod config;
pub mod elm;
pub mod error;
pub mod inject;
pub mod multipart;
pub mod processor;
pub mod resource;
pub mod translator;

pub use config::{ProcessorConfig, TranslatorOptions};
pub use elm::{ElmIdentity, ElmLibraryMap};
pub use error::{ProcessorError, Result};
pub use processor::{Processor, ProcessorOutcome};
pub use resource::LibraryResource;
