// SPDX-License-Identifier: MIT

//! Database schema description and the shared schema cache
//!
//! The cache is the only state shared between concurrent workflow runs.
//! Reads take a shared lock; a cold key is populated by at most one
//! caller at a time through a per-key gate.

use crate::adk::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Identity of a database connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionHandle {
    url: String,
}

impl ConnectionHandle {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The raw connection string
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Filesystem path for SQLite URLs (`sqlite:///x`, `sqlite+aiosqlite:///x`, or a bare path)
    pub fn sqlite_path(&self) -> &str {
        ["sqlite+aiosqlite:///", "sqlite:///", "sqlite://", "file:"]
            .iter()
            .find_map(|prefix| self.url.strip_prefix(prefix))
            .unwrap_or(&self.url)
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// A single column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            primary_key: false,
            nullable: true,
        }
    }
}

/// Mapping of table name to column definitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: BTreeMap<String, Vec<ColumnDef>>,
}

impl SchemaDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style table insertion
    pub fn with_table(mut self, name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        self.tables.insert(name.into(), columns);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&[ColumnDef]> {
        self.tables.get(name).map(|c| c.as_slice())
    }

    /// Render the schema as text for prompts
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (table, columns) in &self.tables {
            out.push_str(&format!("Table '{}':\n", table));
            for col in columns {
                let mut flags = Vec::new();
                if col.primary_key {
                    flags.push("PRIMARY KEY");
                }
                if !col.nullable {
                    flags.push("NOT NULL");
                }
                if flags.is_empty() {
                    out.push_str(&format!("  - {}: {}\n", col.name, col.data_type));
                } else {
                    out.push_str(&format!(
                        "  - {}: {} ({})\n",
                        col.name,
                        col.data_type,
                        flags.join(", ")
                    ));
                }
            }
        }
        out
    }
}

/// Supplies the schema for a database connection
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Fetch the schema. Fails with `Nl2SqlError::Connectivity` when the
    /// database cannot be reached.
    async fn fetch(&self, connection: &ConnectionHandle) -> Result<SchemaDescription>;
}

/// Read-mostly schema cache keyed by connection identity
#[derive(Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<ConnectionHandle, Arc<SchemaDescription>>>,
    gates: Mutex<HashMap<ConnectionHandle, Arc<Mutex<()>>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached schema for a connection, if any
    pub async fn get(&self, connection: &ConnectionHandle) -> Option<Arc<SchemaDescription>> {
        self.entries.read().await.get(connection).cloned()
    }

    /// Store a schema, e.g. one pre-loaded by the caller
    pub async fn insert(&self, connection: ConnectionHandle, schema: SchemaDescription) {
        self.entries
            .write()
            .await
            .insert(connection, Arc::new(schema));
    }

    /// Drop the cached schema for a connection
    pub async fn invalidate(&self, connection: &ConnectionHandle) {
        self.entries.write().await.remove(connection);
    }

    /// Return the cached schema or fetch it through `provider`.
    ///
    /// Concurrent misses on the same key wait on a shared gate so only one
    /// fetch runs; a failed or cancelled fetch leaves the cache unchanged.
    /// The gate is dropped once the entry is populated.
    pub async fn get_or_fetch(
        &self,
        connection: &ConnectionHandle,
        provider: &dyn SchemaProvider,
    ) -> Result<Arc<SchemaDescription>> {
        if let Some(schema) = self.get(connection).await {
            return Ok(schema);
        }

        let gate = {
            let mut gates = self.gates.lock().await;
            gates
                .entry(connection.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = gate.lock().await;

        // Another caller may have populated the entry while we waited
        if let Some(schema) = self.get(connection).await {
            self.gates.lock().await.remove(connection);
            return Ok(schema);
        }

        log::info!("Schema cache miss for {}, fetching", connection);
        let schema = Arc::new(provider.fetch(connection).await?);
        self.entries
            .write()
            .await
            .insert(connection.clone(), schema.clone());
        // Waiters holding a clone still find the entry after the gate is gone
        self.gates.lock().await.remove(connection);
        Ok(schema)
    }
}
