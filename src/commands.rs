use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::mcp::{CollectionResources, FirestoreTools, McpServer};
use crate::store::{MemoryStore, StoreConnector};

const SERVER_NAME: &str = "firestore-mcp";
const INSTRUCTIONS: &str = "Read and write Cloud Firestore collections. Use list-collections to \
discover collections, get-collection or query-collection to read documents and \
create-document to add one. Collections are also readable as firestore://<collection> resources.";

/// Wire the tool and resource handlers around one shared connector
#[inline]
pub fn build_server(connector: Arc<StoreConnector>) -> Result<McpServer> {
    let tools = Arc::new(FirestoreTools::new(Arc::clone(&connector)));
    let resources = Arc::new(CollectionResources::new(connector));

    Ok(
        McpServer::new(SERVER_NAME, env!("CARGO_PKG_VERSION"), tools, resources)?
            .with_instructions(INSTRUCTIONS),
    )
}

/// Connector for `serve`. Configuration failures disable the store instead
/// of stopping the server.
fn serve_connector(config_path: Option<&Path>, in_memory: bool) -> StoreConnector {
    if in_memory {
        info!("Serving from an in-memory document store");
        return StoreConnector::new(Arc::new(MemoryStore::new()));
    }

    match Config::load(config_path) {
        Ok(config) => {
            let connector = StoreConnector::connect(&config.firebase);
            if !connector.is_available() {
                warn!("Firebase not properly initialized; store tools will report errors");
            }
            connector
        }
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            StoreConnector::unavailable(format!("Failed to load configuration: {:#}", e))
        }
    }
}

/// Start the MCP server on stdio.
///
/// Stdout carries the protocol, so nothing here may print to it.
#[inline]
pub async fn serve_mcp(config_path: Option<&Path>, in_memory: bool) -> Result<()> {
    let connector = serve_connector(config_path, in_memory);
    let server = Arc::new(build_server(Arc::new(connector))?);
    server.serve_stdio().await
}

/// Probe the configured store by listing its collections
#[inline]
pub async fn check_store(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    config
        .firebase
        .validate()
        .context("Firestore configuration is incomplete")?;

    let connector = StoreConnector::connect(&config.firebase);
    let endpoint = config.firebase.endpoint()?;
    println!("Firestore Status:");
    println!(
        "   Project: {}",
        config.firebase.project_id.as_deref().unwrap_or_default()
    );
    println!("   Database: {}", config.firebase.database_id);
    println!("   Endpoint: {}", endpoint);

    match connector.list_collections().await {
        Ok(collections) => {
            println!("   Connected, {} collections", collections.len());
            for collection in collections {
                println!("     - {}", collection.name);
            }
            Ok(())
        }
        Err(e) => {
            error!("Firestore check failed: {}", e);
            println!("   Failed to reach Firestore: {}", e);
            Err(e).context("Firestore check failed")
        }
    }
}

/// Print the effective configuration with secrets masked
#[inline]
pub fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let redacted = Config {
        firebase: config.firebase.redacted(),
    };

    match config_path {
        Some(path) => println!("Config file: {}", path.display()),
        None => match Config::config_file_path() {
            Ok(path) if path.exists() => println!("Config file: {}", path.display()),
            Ok(path) => println!("Config file: {} (not present)", path.display()),
            Err(e) => println!("Config file: unavailable ({})", e),
        },
    }
    println!();
    print!(
        "{}",
        toml::to_string_pretty(&redacted).context("Failed to render configuration")?
    );

    if let Err(e) = config.firebase.validate() {
        println!();
        println!("Warning: {}", e);
    }
    Ok(())
}
