//! Resource processing pipeline
//!
//! Orchestrates one unit of work: load a FHIR resource, extract its CQL,
//! submit the source set to the translation service, decode the compiled
//! result, merge the main library back into the resource, and persist
//! the outputs. Persistence is the last step; nothing is written when any
//! earlier stage fails.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::config::ProcessorConfig;
use crate::elm::{self, ElmLibraryMap};
use crate::error::{ProcessorError, Result};
use crate::resource::LibraryResource;
use crate::translator::{collect_cql_sources, TranslatorClient};

/// Suffix appended to the input basename for the updated resource file
const OUTPUT_SUFFIX: &str = "_with_elm";

/// Result of processing one resource
#[derive(Debug)]
pub struct ProcessorOutcome {
    /// Path the updated resource was written to
    pub resource_path: PathBuf,
    /// Directory holding the per-library ELM dumps
    pub elm_output_dir: PathBuf,
    /// Name the main library was resolved to
    pub main_library_name: String,
    /// The compiled main library
    pub main_library: Value,
    /// Every library decoded from the translation response
    pub libraries: ElmLibraryMap,
}

pub struct Processor {
    config: ProcessorConfig,
    client: TranslatorClient,
}

impl Processor {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        let client =
            TranslatorClient::new(config.translator_url.clone(), config.options.clone())?;
        Ok(Self { config, client })
    }

    /// Process a resource given by name or path.
    pub async fn process_resource(&self, name: &str) -> Result<ProcessorOutcome> {
        let path = LibraryResource::resolve_path(name, &self.config.resources_dir)?;
        info!(path = %path.display(), "processing FHIR resource");

        let mut resource = LibraryResource::load(&path)?;
        let cql = resource.extract_cql()?;

        let main_filename = resource.main_cql_filename(&cql);
        info!(file = %main_filename, "main CQL library");

        let mut sources = collect_cql_sources(&self.config.cql_dir)?;
        let main_field = main_filename.trim_end_matches(".cql");
        if !sources.iter().any(|(field, _)| field == main_field) {
            // The dependency directory normally carries the main source
            // too; when it does not, submit the embedded copy.
            warn!(field = %main_field, "main CQL not in dependency directory, submitting embedded copy");
            sources.push((main_field.to_string(), cql.clone()));
            sources.sort_by(|a, b| a.0.cmp(&b.0));
        }

        let libraries = self.client.translate(sources).await?;

        self.apply_translation(&mut resource, &path, &cql, libraries)
    }

    /// The post-exchange half of the pipeline: select the main library,
    /// merge it into the resource, and persist all outputs.
    pub fn apply_translation(
        &self,
        resource: &mut LibraryResource,
        resource_path: &Path,
        cql: &str,
        libraries: ElmLibraryMap,
    ) -> Result<ProcessorOutcome> {
        let main_name = resource.main_library_name(cql);
        let main_library = select_main_library(&libraries, &main_name)?.clone();
        resource.merge_elm(&main_library)?;

        self.save_libraries(&libraries)?;
        let output_path = self.save_resource(resource, resource_path)?;
        info!(path = %output_path.display(), "processed resource saved");

        Ok(ProcessorOutcome {
            resource_path: output_path,
            elm_output_dir: self.config.elm_output_dir.clone(),
            main_library_name: main_name,
            main_library,
            libraries,
        })
    }

    /// Write one pretty-printed JSON file per decoded library.
    fn save_libraries(&self, libraries: &ElmLibraryMap) -> Result<()> {
        std::fs::create_dir_all(&self.config.elm_output_dir)?;

        for (name, value) in libraries {
            let path = self.config.elm_output_dir.join(format!("{name}.json"));
            std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
            let version = elm::identity(value)
                .map(|identity| identity.version)
                .unwrap_or_else(|| elm::UNKNOWN_VERSION.to_string());
            info!(file = %path.display(), version = %version, "saved ELM library");
        }
        Ok(())
    }

    /// Write the updated resource into the configured output directory,
    /// suffixing the original basename.
    fn save_resource(&self, resource: &LibraryResource, original: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let stem = original
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("resource");
        let path = self
            .config
            .output_dir
            .join(format!("{stem}{OUTPUT_SUFFIX}.json"));
        std::fs::write(&path, resource.to_pretty_json()?)?;
        Ok(path)
    }
}

/// Pick the main library out of the decoded mapping: the entry matching
/// the resolved name, else the first entry in decode order.
pub fn select_main_library<'a>(libraries: &'a ElmLibraryMap, name: &str) -> Result<&'a Value> {
    if let Some(value) = libraries.get(name) {
        return Ok(value);
    }
    if let Some((fallback, value)) = libraries.first() {
        warn!(
            wanted = %name,
            using = %fallback,
            "main library not in translation result, using first entry"
        );
        return Ok(value);
    }
    Err(ProcessorError::MainArtifactNotFound {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_prefers_named_entry() {
        let mut libraries = ElmLibraryMap::new();
        libraries.insert("Helpers".to_string(), json!({"n": 1}));
        libraries.insert("Foo".to_string(), json!({"n": 2}));

        let picked = select_main_library(&libraries, "Foo").unwrap();
        assert_eq!(picked["n"], json!(2));
    }

    #[test]
    fn test_select_falls_back_to_first_entry() {
        let mut libraries = ElmLibraryMap::new();
        libraries.insert("Helpers".to_string(), json!({"n": 1}));
        libraries.insert("Other".to_string(), json!({"n": 2}));

        let picked = select_main_library(&libraries, "Missing").unwrap();
        assert_eq!(picked["n"], json!(1));
    }

    #[test]
    fn test_select_empty_mapping_is_error() {
        let libraries = ElmLibraryMap::new();
        let err = select_main_library(&libraries, "Foo").unwrap_err();
        assert!(matches!(err, ProcessorError::MainArtifactNotFound { .. }));
    }
}
