//! CQL -> ELM processing CLI
//!
//! Usage:
//!   cargo run --bin elm_cli -- process library-CMS138FHIRPreventiveTobaccoCessation-0.2.001 \
//!     --translator-url http://localhost:8081/cql/translator \
//!     --cql-dir input/cql
//!
//!   cargo run --bin elm_cli -- inject output/elm/Foo.json input/resources/library/library-foo.json

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cql_elm::elm;
use cql_elm::inject::inject_elm_file;
use cql_elm::{Processor, ProcessorConfig, TranslatorOptions};

/// Process FHIR Library/Measure resources against a CQL translation service
#[derive(Parser, Debug)]
#[command(name = "elm_cli")]
#[command(about = "Extract CQL from a FHIR resource, translate it to ELM, merge it back")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full extract -> translate -> merge pipeline for one resource
    Process {
        /// Resource name or path (bare names are looked up in --resources-dir)
        resource: String,

        /// CQL translation service URL
        #[arg(long, default_value = "http://localhost:8081/cql/translator")]
        translator_url: String,

        /// Directory containing the dependency CQL files
        #[arg(long, default_value = "input/cql")]
        cql_dir: PathBuf,

        /// Directory containing FHIR resources
        #[arg(long, default_value = "input/resources/library")]
        resources_dir: PathBuf,

        /// Output directory for the updated resource
        #[arg(long, default_value = "output/resources/library")]
        output_dir: PathBuf,

        /// Output directory for the per-library ELM dumps
        #[arg(long, default_value = "output/elm")]
        elm_output_dir: PathBuf,

        /// Disable locator annotations
        #[arg(long)]
        no_locators: bool,

        /// Disable result type annotations
        #[arg(long)]
        no_result_types: bool,
    },

    /// Splice an existing ELM JSON file into a resource's elm+json entry
    Inject {
        /// Path to the ELM JSON file
        elm: PathBuf,

        /// Path to the library resource file (updated in place)
        resource: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(error) = run(cli.command).await {
        eprintln!("Processing failed: {error}");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Process {
            resource,
            translator_url,
            cql_dir,
            resources_dir,
            output_dir,
            elm_output_dir,
            no_locators,
            no_result_types,
        } => {
            let config = ProcessorConfig {
                translator_url,
                cql_dir,
                resources_dir,
                output_dir,
                elm_output_dir,
                options: TranslatorOptions {
                    locators: !no_locators,
                    result_types: !no_result_types,
                    ..Default::default()
                },
            };

            let processor = Processor::new(config)?;
            let outcome = processor.process_resource(&resource).await?;

            println!(
                "Processed {} libraries (main: {})",
                outcome.libraries.len(),
                outcome.main_library_name
            );
            for (name, value) in &outcome.libraries {
                let version = elm::identity(value)
                    .map(|identity| identity.version)
                    .unwrap_or_else(|| elm::UNKNOWN_VERSION.to_string());
                println!("  - {name} (v{version})");
            }
            println!("Updated resource: {}", outcome.resource_path.display());
            println!("ELM output: {}", outcome.elm_output_dir.display());
        }

        Command::Inject { elm, resource } => {
            let summary = inject_elm_file(&elm, &resource)?;
            println!(
                "Updated {} (ELM {} bytes, base64 {} -> {} chars)",
                resource.display(),
                summary.elm_bytes,
                summary.old_data_len,
                summary.new_data_len
            );
        }
    }

    Ok(())
}
