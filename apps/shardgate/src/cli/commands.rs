//! # CLI Command Implementations

use super::Backend;
use crate::config::NodeConfig;
use crate::node::NodeHandle;
use shardgate_core::{
    Assignment, MemoryShard, Record, RedbShard, ShardEntry, ShardStorage, ShardgateError,
    partition_for,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// FILE LIMITS
// =============================================================================

/// Maximum size of a record file for `load` (100 MB).
const MAX_LOAD_FILE_SIZE: u64 = 100 * 1024 * 1024;

fn validate_file_size(path: &Path, max_size: u64) -> Result<(), ShardgateError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| ShardgateError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(ShardgateError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve `path` to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, ShardgateError> {
    let canonical = path.canonicalize().map_err(|e| {
        ShardgateError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(ShardgateError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

// =============================================================================
// SHARED SETUP
// =============================================================================

/// Read the config file (if any) and the environment.
pub fn load_config(path: Option<&Path>) -> Result<NodeConfig, ShardgateError> {
    NodeConfig::load(path)
}

/// Open the local shard for `stores`.
pub fn open_storage(
    database: &Path,
    backend: Backend,
    stores: &[String],
) -> Result<Arc<dyn ShardStorage>, ShardgateError> {
    match backend {
        Backend::Redb => {
            let names: Vec<&str> = stores.iter().map(String::as_str).collect();
            Ok(Arc::new(RedbShard::open(database, &names)?))
        }
        Backend::Memory => {
            tracing::warn!("Using in-memory shard storage: the shard starts empty and is lost on exit");
            Ok(Arc::new(MemoryShard::new()))
        }
    }
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// SERVE COMMAND
// =============================================================================

/// Join the cluster and serve until Ctrl-C.
pub async fn cmd_serve(
    mut config: NodeConfig,
    database: &Path,
    backend: Backend,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), ShardgateError> {
    if let Some(host) = host {
        config.node.host = host;
    }
    if let Some(port) = port {
        config.node.port = port;
    }

    let stores = config.registry()?.stores();
    let storage = open_storage(database, backend, &stores)?;
    let node = NodeHandle::build(config, storage)?;
    node.start()?;

    let config = node.config();
    println!("shardgate node starting...");
    println!();
    println!("Configuration:");
    println!("  Bind:        {}", config.bind_address());
    println!("  Advertised:  {}", config.self_address());
    println!("  Members:     {}", config.members()?.len());
    println!("  Partitions:  {}", config.cluster.partitions);
    println!("  Backend:     {:?}", backend);
    println!("  Database:    {:?}", database);
    println!();
    println!("Endpoints:");
    println!("  GET /health");
    for spec in node.router().resources().iter() {
        println!("  GET /{0}  GET /{0}/{{id}}", spec.name);
    }
    println!("  GET /_meta/{{resource}}[/{{id}}]");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    node.serve(shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

/// Arguments of `load`.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub resource: String,
    pub file: PathBuf,
    pub all: bool,
    pub compact: bool,
}

/// Counts reported by `load`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub stored: usize,
    pub skipped: usize,
}

/// Load a JSON array of records into the redb shard at `database`.
pub fn load_records(
    config: &NodeConfig,
    database: &Path,
    options: &LoadOptions,
) -> Result<LoadReport, ShardgateError> {
    config.validate()?;
    let registry = config.registry()?;
    let spec = registry.get(&options.resource).ok_or_else(|| {
        ShardgateError::Config(format!("Unknown resource: {}", options.resource))
    })?;

    let path = validate_file_path(&options.file)?;
    validate_file_size(&path, MAX_LOAD_FILE_SIZE)?;
    let content = std::fs::read_to_string(&path)
        .map_err(|e| ShardgateError::Io(format!("Cannot read {}: {}", path.display(), e)))?;
    let items: Vec<serde_json::Value> = serde_json::from_str(&content)
        .map_err(|e| ShardgateError::Serialization(format!("Expected a JSON array: {}", e)))?;

    let partitions = config.cluster.partitions;
    let assignment = Assignment::round_robin(partitions, &config.members()?)?;
    let owned = assignment.owned_by(&config.self_address());

    let mut report = LoadReport::default();
    let mut entries: Vec<ShardEntry> = Vec::with_capacity(items.len());
    for item in items {
        let record = Record(item);
        let key = record.key_field(&spec.key_field, spec.key)?;
        let partition = partition_for(&key, partitions);
        if !options.all && !owned.contains(&partition) {
            report.skipped += 1;
            continue;
        }
        let bytes = record.to_vec()?;
        entries.push((partition, key, bytes));
    }
    report.stored = entries.len();

    let stores = registry.stores();
    let names: Vec<&str> = stores.iter().map(String::as_str).collect();
    let mut shard = RedbShard::open(database, &names)?;
    shard.put_batch(&spec.store, &entries)?;

    if options.compact {
        let compacted = shard.compact()?;
        tracing::debug!(compacted, "Compacted shard");
    }

    tracing::info!(
        resource = %spec.name,
        stored = report.stored,
        skipped = report.skipped,
        "Loaded records"
    );
    Ok(report)
}

/// `load` command.
pub fn cmd_load(
    config: &NodeConfig,
    database: &Path,
    backend: Backend,
    json_mode: bool,
    options: &LoadOptions,
) -> Result<(), ShardgateError> {
    if backend != Backend::Redb {
        return Err(ShardgateError::Config(
            "load writes a redb shard; use --backend redb".to_string(),
        ));
    }
    let report = load_records(config, database, options)?;

    if json_mode {
        print_json(&serde_json::json!({
            "resource": options.resource,
            "database": database.to_string_lossy(),
            "stored": report.stored,
            "skipped": report.skipped,
        }));
    } else {
        println!("Loaded {} into {:?}", options.resource, database);
        println!("  Stored:  {}", report.stored);
        println!("  Skipped: {} (owned by other nodes)", report.skipped);
    }
    Ok(())
}

// =============================================================================
// ASSIGNMENT COMMAND
// =============================================================================

/// Print the partition -> owner table for the configured cluster.
pub fn cmd_assignment(config: &NodeConfig, json_mode: bool) -> Result<(), ShardgateError> {
    config.validate()?;
    let me = config.self_address();
    let assignment = Assignment::round_robin(config.cluster.partitions, &config.members()?)?;

    if json_mode {
        let owners: serde_json::Map<String, serde_json::Value> = assignment
            .iter()
            .map(|(p, owner)| (p.to_string(), serde_json::Value::String(owner.to_string())))
            .collect();
        print_json(&serde_json::json!({
            "self": me.to_string(),
            "partitions": assignment.partitions(),
            "owners": owners,
        }));
        return Ok(());
    }

    println!("Partition Assignment");
    println!("====================");
    println!("Node:       {}", me);
    println!("Partitions: {}", assignment.partitions());
    println!();
    for (partition, owner) in assignment.iter() {
        let marker = if *owner == me { "  (this node)" } else { "" };
        println!("  {:>4}  {}{}", partition, owner, marker);
    }
    Ok(())
}
