#![allow(dead_code)]

use chrono::NaiveDate;
use tracker_query::{
    Actor, Catalog, Dialect, EngineConfig, EvalContext, Query, QueryEngine, RoleBasedSecurity,
    SqliteStorage,
};

const CATALOG: &str = include_str!("../fixtures/catalog.json");
const SCHEMA: &str = include_str!("../fixtures/schema.sql");

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2011, 7, 10).unwrap()
}

pub fn ctx(actor: Actor) -> EvalContext {
    EvalContext::at(actor, today())
}

pub struct Fixture {
    pub config: EngineConfig,
    pub catalog: &'static Catalog,
    pub security: RoleBasedSecurity<'static, Catalog>,
    pub storage: SqliteStorage,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_catalog(serde_json::from_str(CATALOG).unwrap())
    }

    pub fn with_catalog(catalog: Catalog) -> Self {
        let catalog: &'static Catalog = Box::leak(Box::new(catalog));
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

    /// Matching ids in ascending order.
    pub fn ids(&self, query: &Query, actor: Actor) -> Vec<i64> {
        let mut ids = self
            .engine()
            .results(&self.storage, query, &ctx(actor), None, None)
            .unwrap();
        ids.sort_unstable();
        ids
    }

    pub fn filtered(&self, field: &str, operator: &str, values: &[&str], actor: Actor) -> Vec<i64> {
        let mut query = Query::new(tracker_query::EntityKind::Issue);
        query.add_filter(field, operator, values.iter().copied());
        self.ids(&query, actor)
    }
}

pub fn admin() -> Actor {
    Actor::admin(1)
}
