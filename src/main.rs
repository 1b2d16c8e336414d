//! Demonstration binary: restores (or seeds) a document, evaluates every
//! global entity and prints the results with their fault annotations, then
//! optionally saves a snapshot back to disk.

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use propsheet::construct::{Document, GLOBAL_SCOPE, ScopedReference};
use propsheet::error::Result;
use propsheet::evaluate::Engine;
use propsheet::persist;

#[derive(Debug, Deserialize)]
struct Settings {
    /// Path of the snapshot file; unset means a transient session.
    #[serde(default)]
    snapshot: Option<String>,
    save_on_exit: bool,
    log: String,
}

fn settings() -> Result<Settings> {
    let settings = Config::builder()
        .set_default("save_on_exit", false)?
        .set_default("log", "info")?
        .add_source(File::with_name("propsheet").required(false))
        .add_source(Environment::with_prefix("PROPSHEET").try_parsing(true))
        .build()?
        .try_deserialize()?;
    Ok(settings)
}

fn main() -> Result<()> {
    let settings = settings()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&settings.log).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let document = match settings.snapshot.as_deref() {
        Some(path) => match persist::load(path) {
            Ok(document) => document,
            Err(e) => {
                warn!(path, error = %e, "snapshot not usable, seeding defaults");
                Document::with_defaults()
            }
        },
        None => Document::with_defaults(),
    };

    let engine = Engine::new(&document);

    println!("Properties:");
    for property in document.properties_in(GLOBAL_SCOPE) {
        let reference = ScopedReference::property(&property.scope, property.id);
        let value = engine.evaluate(&reference)?;
        let evaluated = document.property(&reference)?;
        print!("  {} ({}) = {}", evaluated.name, evaluated.semantic_type, value);
        if let Some(error) = &evaluated.error {
            print!("  [error at {}: {}]", error.index, error.message);
        }
        if let Some(warning) = &evaluated.warning {
            print!("  [warning at {}: {}]", warning.index, warning.message);
        }
        println!();
    }

    println!("Variables:");
    for variable in document.variables_in(GLOBAL_SCOPE) {
        let reference = ScopedReference::variable(&variable.scope, variable.id);
        let value = engine.evaluate(&reference)?;
        let effective = engine.effective_type(&reference)?;
        println!("  {} ({}) = {}", variable.name, effective, value);
    }

    if let Some(selection) = document.selection() {
        info!(%selection, "current selection");
    }

    if settings.save_on_exit {
        match settings.snapshot.as_deref() {
            Some(path) => persist::save(&document, path)?,
            None => warn!("save_on_exit set but no snapshot path configured"),
        }
    }

    Ok(())
}
