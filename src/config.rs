//! Processor configuration
//!
//! Explicit configuration for the CQL -> ELM pipeline: where the
//! translation service lives, where CQL dependencies and FHIR resources
//! are read from, and where outputs are written.

use std::path::PathBuf;

const DEFAULT_TRANSLATOR_URL: &str = "http://localhost:8081/cql/translator";

/// Options forwarded to the translation service as query parameters
#[derive(Debug, Clone)]
pub struct TranslatorOptions {
    pub annotations: bool,
    pub locators: bool,
    pub result_types: bool,
    pub detailed_errors: bool,
    pub date_range_optimization: bool,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            annotations: true,
            locators: true,
            result_types: true,
            detailed_errors: true,
            date_range_optimization: true,
        }
    }
}

impl TranslatorOptions {
    /// Render the options as query parameters, in a fixed order so the
    /// outbound request is deterministic.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("annotations", self.annotations.to_string()),
            ("locators", self.locators.to_string()),
            ("result-types", self.result_types.to_string()),
            ("detailed-errors", self.detailed_errors.to_string()),
            (
                "date-range-optimization",
                self.date_range_optimization.to_string(),
            ),
        ]
    }
}

/// Configuration for a [`Processor`](crate::processor::Processor)
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Translation service endpoint
    pub translator_url: String,
    /// Directory holding the dependency `.cql` files
    pub cql_dir: PathBuf,
    /// Directory searched when a resource is given by bare name
    pub resources_dir: PathBuf,
    /// Directory the updated resource is written to
    pub output_dir: PathBuf,
    /// Directory the per-library ELM dumps are written to
    pub elm_output_dir: PathBuf,
    /// Translator flags
    pub options: TranslatorOptions,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            translator_url: DEFAULT_TRANSLATOR_URL.to_string(),
            cql_dir: PathBuf::from("input/cql"),
            resources_dir: PathBuf::from("input/resources/library"),
            output_dir: PathBuf::from("output/resources/library"),
            elm_output_dir: PathBuf::from("output/elm"),
            options: TranslatorOptions::default(),
        }
    }
}
