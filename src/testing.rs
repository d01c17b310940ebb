//! Shared fixture for unit tests, loaded from `tests/fixtures`.

use chrono::NaiveDate;

use crate::catalog::{Catalog, RoleBasedSecurity};
use crate::config::EngineConfig;
use crate::context::{Actor, EvalContext};
use crate::engine::QueryEngine;
use crate::storage::{Dialect, SqliteStorage};

const CATALOG: &str = include_str!("../tests/fixtures/catalog.json");
const SCHEMA: &str = include_str!("../tests/fixtures/schema.sql");

pub fn catalog() -> Catalog {
    serde_json::from_str(CATALOG).unwrap()
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2011, 7, 10).unwrap()
}

pub fn ctx(actor: Actor) -> EvalContext {
    EvalContext::at(actor, today())
}

/// Catalog, security and an in-memory SQLite database holding the same data.
pub struct Fixture {
    pub config: EngineConfig,
    pub catalog: &'static Catalog,
    pub security: RoleBasedSecurity<'static, Catalog>,
    pub storage: SqliteStorage,
}

impl Fixture {
    pub fn new() -> Self {
        let catalog: &'static Catalog = Box::leak(Box::new(catalog()));
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.execute_batch(SCHEMA).unwrap();
        Self {
            config: EngineConfig {
                dialect: Dialect::Sqlite,
                ..EngineConfig::default()
            },
            catalog,
            security: RoleBasedSecurity::new(catalog),
            storage,
        }
    }

    pub fn engine(&self) -> QueryEngine<'_> {
        QueryEngine::new(&self.config, self.catalog, self.catalog, &self.security)
    }
}
