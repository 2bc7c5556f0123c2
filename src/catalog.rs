//! Heuristic catalog definition and seeding
//!
//! The catalog ships inside the binary (`catalog/heuristics.toml`) and is
//! written to the store by the explicit `seed` command, never on server start.

use serde::Deserialize;
use tracing::info;

use crate::db::{catalog, SurveyDb};
use crate::error::StorageError;

/// Embedded catalog source
pub const BUILTIN_CATALOG: &str = include_str!("../catalog/heuristics.toml");

/// Parsed catalog file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogDefinition {
    pub heuristics: Vec<HeuristicDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeuristicDefinition {
    pub code: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub subprinciples: Vec<SubprincipleDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubprincipleDefinition {
    pub code: String,
    pub subtitle: String,
    pub description: String,
    pub example: String,
}

/// Counts written by a seed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SeedReport {
    pub heuristics: usize,
    pub subprinciples: usize,
}

impl CatalogDefinition {
    /// Parse and check a catalog document
    pub fn parse(source: &str) -> Result<Self, StorageError> {
        let definition: CatalogDefinition = toml::from_str(source)
            .map_err(|e| StorageError::Config(format!("Invalid heuristic catalog: {}", e)))?;
        definition.validate()?;
        Ok(definition)
    }

    /// The catalog compiled into the binary
    pub fn builtin() -> Result<Self, StorageError> {
        Self::parse(BUILTIN_CATALOG)
    }

    /// Codes must be unique and every subprinciple code must extend its heuristic code
    fn validate(&self) -> Result<(), StorageError> {
        let mut seen = std::collections::HashSet::new();
        for h in &self.heuristics {
            if !seen.insert(h.code.as_str()) {
                return Err(StorageError::Config(format!("Duplicate heuristic code {}", h.code)));
            }
            for s in &h.subprinciples {
                if !s.code.starts_with(&h.code) {
                    return Err(StorageError::Config(format!(
                        "Subprinciple {} does not belong to heuristic {}",
                        s.code, h.code
                    )));
                }
                if !seen.insert(s.code.as_str()) {
                    return Err(StorageError::Config(format!("Duplicate subprinciple code {}", s.code)));
                }
            }
        }
        Ok(())
    }

    pub fn subprinciple_count(&self) -> usize {
        self.heuristics.iter().map(|h| h.subprinciples.len()).sum()
    }
}

/// Write the catalog into the store in one transaction
///
/// Upserts by code, so rerunning refreshes text and keeps ids.
pub fn seed_catalog(db: &SurveyDb, definition: &CatalogDefinition) -> Result<SeedReport, StorageError> {
    let report = db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        let mut report = SeedReport { heuristics: 0, subprinciples: 0 };

        for h in &definition.heuristics {
            let heuristic_id = catalog::upsert_heuristic(&tx, &h.code, &h.title, &h.description)?;
            report.heuristics += 1;

            for s in &h.subprinciples {
                catalog::upsert_subprinciple(
                    &tx,
                    heuristic_id,
                    &s.code,
                    &s.subtitle,
                    &s.description,
                    &s.example,
                )?;
                report.subprinciples += 1;
            }
        }

        tx.commit()?;
        Ok(report)
    })?;

    info!(
        heuristics = report.heuristics,
        subprinciples = report.subprinciples,
        "Heuristic catalog seeded"
    );

    Ok(report)
}
