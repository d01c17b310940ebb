//! Query engine: validation, compilation and evaluation against a storage.

use indexmap::IndexMap;
use sea_query::{Alias, Asterisk, Expr, SelectStatement, SimpleExpr};
use tracing::{debug, info, warn};

use crate::catalog::{IdentityProvider, MetadataProvider, SecurityProvider, Visibility};
use crate::compiler::{compile_predicate, CompiledPredicate};
use crate::config::EngineConfig;
use crate::context::EvalContext;
use crate::error::{FieldError, QueryError, QueryResult, StorageError};
use crate::model::ItemId;
use crate::operators::DateEnv;
use crate::query::Query;
use crate::registry::QueryColumn;
use crate::sort::{ordering, ColumnExprs, GroupKey};
use crate::storage::{Cell, Storage};
use crate::totals::{round_total, sum, total_from_cell};
use crate::validator::validate_query;

/// Entry point tying configuration and collaborators together.
#[derive(Clone, Copy)]
pub struct QueryEngine<'a> {
    pub config: &'a EngineConfig,
    pub metadata: &'a dyn MetadataProvider,
    pub identity: &'a dyn IdentityProvider,
    pub security: &'a dyn SecurityProvider,
}

impl<'a> QueryEngine<'a> {
    pub fn new(
        config: &'a EngineConfig,
        metadata: &'a dyn MetadataProvider,
        identity: &'a dyn IdentityProvider,
        security: &'a dyn SecurityProvider,
    ) -> Self {
        Self {
            config,
            metadata,
            identity,
            security,
        }
    }

    pub fn date_env(&self, ctx: &EvalContext) -> DateEnv {
        DateEnv {
            today: ctx.today,
            first_day_of_week: self.config.first_day_of_week,
            actor_tz: ctx.actor.time_zone,
            storage_tz: self.config.storage_time_zone,
        }
    }

    /// Every field error of `query` for the actor of `ctx`.
    pub fn validate(&self, query: &Query, ctx: &EvalContext) -> Vec<FieldError> {
        let filters = self.query_filters(query, &ctx.actor);
        let columns = self.query_columns(query, &ctx.actor);
        validate_query(query, &filters, &columns, &self.date_env(ctx)).errors
    }

    pub fn compile(&self, query: &Query, ctx: &EvalContext) -> QueryResult<CompiledPredicate> {
        let filters = self.query_filters(query, &ctx.actor);
        let columns = self.query_columns(query, &ctx.actor);
        let validation = validate_query(query, &filters, &columns, &self.date_env(ctx));
        if !validation.is_valid() {
            warn!(
                kind = %query.kind,
                errors = validation.errors.len(),
                "query rejected by validation"
            );
            return Err(QueryError::Invalid(validation.errors));
        }
        let predicate = compile_predicate(self, query, ctx, &validation.clauses);
        debug!(
            kind = %query.kind,
            clauses = validation.clauses.len(),
            joins = predicate.joins().len(),
            "compiled predicate"
        );
        Ok(predicate)
    }

    /// Validates and compiles `query`, ready to be read from `storage`.
    pub fn evaluate<'e>(
        &'e self,
        storage: &'e dyn Storage,
        query: &'e Query,
        ctx: &'e EvalContext,
    ) -> QueryResult<Evaluation<'e, 'a>> {
        self.check_dialect(storage)?;
        let predicate = self.compile(query, ctx)?;
        self.evaluate_compiled(storage, query, ctx, predicate)
    }

    /// Evaluates an already compiled predicate. The predicate must have been
    /// compiled for the same actor, kind and dialect, with its visibility.
    pub fn evaluate_compiled<'e>(
        &'e self,
        storage: &'e dyn Storage,
        query: &'e Query,
        ctx: &'e EvalContext,
        predicate: CompiledPredicate,
    ) -> QueryResult<Evaluation<'e, 'a>> {
        self.check_dialect(storage)?;
        if !predicate.is_sealed_for(&ctx.actor, query.kind, storage.dialect()) {
            return Err(QueryError::SecurityInvariant(
                "predicate was compiled for another actor, kind or dialect".to_string(),
            ));
        }
        match predicate.visibility() {
            Some(Visibility::Unrestricted) if !ctx.actor.admin => {
                warn!(actor = ?ctx.actor.id, "unrestricted visibility for a non-admin actor");
            }
            Some(_) => {}
            None => {
                return Err(QueryError::SecurityInvariant(
                    "visibility predicate missing".to_string(),
                ))
            }
        }
        Ok(Evaluation {
            engine: self,
            storage,
            query,
            columns: self.query_columns(query, &ctx.actor),
            predicate,
        })
    }

    fn check_dialect(&self, storage: &dyn Storage) -> QueryResult<()> {
        if storage.dialect() != self.config.dialect {
            return Err(StorageError::DialectMismatch {
                expected: self.config.dialect,
                actual: storage.dialect(),
            }
            .into());
        }
        Ok(())
    }

    pub fn results(
        &self,
        storage: &dyn Storage,
        query: &Query,
        ctx: &EvalContext,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> QueryResult<Vec<ItemId>> {
        self.evaluate(storage, query, ctx)?.results(offset, limit)
    }

    pub fn count(&self, storage: &dyn Storage, query: &Query, ctx: &EvalContext) -> QueryResult<i64> {
        self.evaluate(storage, query, ctx)?.count()
    }

    pub fn count_by_group(
        &self,
        storage: &dyn Storage,
        query: &Query,
        ctx: &EvalContext,
    ) -> QueryResult<IndexMap<GroupKey, i64>> {
        self.evaluate(storage, query, ctx)?.count_by_group()
    }

    pub fn total_for(
        &self,
        storage: &dyn Storage,
        query: &Query,
        ctx: &EvalContext,
        column: &str,
    ) -> QueryResult<f64> {
        self.evaluate(storage, query, ctx)?.total_for(column)
    }

    pub fn total_by_group_for(
        &self,
        storage: &dyn Storage,
        query: &Query,
        ctx: &EvalContext,
        column: &str,
    ) -> QueryResult<IndexMap<GroupKey, f64>> {
        self.evaluate(storage, query, ctx)?.total_by_group_for(column)
    }
}

/// A validated, compiled query bound to a storage. Every read goes through
/// the same predicate, so counts, totals and result pages agree.
pub struct Evaluation<'e, 'a> {
    engine: &'e QueryEngine<'a>,
    storage: &'e dyn Storage,
    query: &'e Query,
    columns: IndexMap<String, QueryColumn>,
    predicate: CompiledPredicate,
}

impl<'e, 'a> Evaluation<'e, 'a> {
    pub fn predicate(&self) -> &CompiledPredicate {
        &self.predicate
    }

    pub fn columns(&self) -> &IndexMap<String, QueryColumn> {
        &self.columns
    }

    fn exprs(&self) -> ColumnExprs<'e, 'a> {
        ColumnExprs::new(self.engine, self.query.kind, self.predicate.joins())
    }

    fn base(&self, exprs: &ColumnExprs<'_, '_>) -> SelectStatement {
        self.predicate.select_with(self.engine.config, &exprs.joins)
    }

    fn fetch(&self, select: &SelectStatement) -> QueryResult<Vec<Vec<Cell>>> {
        Ok(self.storage.fetch_rows(select)?)
    }

    /// Ordered item ids. An offset without a limit reads to the end.
    pub fn results_statement(&self, offset: Option<u64>, limit: Option<u64>) -> SelectStatement {
        let mut exprs = self.exprs();
        let ordering = ordering(&mut exprs, self.query, &self.columns);
        let mut select = self.base(&exprs);
        select.column((Alias::new(self.query.kind.table()), Alias::new("id")));
        for (expr, order) in ordering.order {
            select.order_by_expr(expr, order);
        }
        match (offset, limit) {
            (_, Some(limit)) => {
                select.limit(limit);
            }
            (Some(_), None) => {
                select.limit(i64::MAX as u64);
            }
            (None, None) => {}
        }
        if let Some(offset) = offset {
            select.offset(offset);
        }
        select
    }

    pub fn results(&self, offset: Option<u64>, limit: Option<u64>) -> QueryResult<Vec<ItemId>> {
        let rows = self.fetch(&self.results_statement(offset, limit))?;
        let ids = rows
            .iter()
            .map(|row| {
                row.first().and_then(Cell::as_i64).ok_or_else(|| {
                    QueryError::from(StorageError::Decode {
                        column: 0,
                        found: format!("{:?}", row.first()),
                    })
                })
            })
            .collect::<QueryResult<Vec<_>>>()?;
        info!(kind = %self.query.kind, rows = ids.len(), "fetched results");
        Ok(ids)
    }

    pub fn count_statement(&self) -> SelectStatement {
        let mut select = self.predicate.select(self.engine.config);
        select.expr(Expr::col(Asterisk).count());
        select
    }

    pub fn count(&self) -> QueryResult<i64> {
        let rows = self.fetch(&self.count_statement())?;
        let Some(cell) = rows.first().and_then(|row| row.first()) else {
            return Ok(0);
        };
        cell.as_i64().ok_or_else(|| {
            StorageError::Decode {
                column: 0,
                found: format!("{cell:?}"),
            }
            .into()
        })
    }

    /// Grouped aggregate of `value`, keyed and ordered by the group column.
    fn by_group<T, F>(&self, value: F) -> QueryResult<IndexMap<GroupKey, T>>
    where
        T: Default + std::ops::AddAssign,
        F: FnOnce(&mut ColumnExprs<'e, 'a>) -> QueryResult<(SimpleExpr, fn(Option<&Cell>) -> T)>,
    {
        let mut exprs = self.exprs();
        let (aggregate, read) = value(&mut exprs)?;
        let ordering = ordering(&mut exprs, self.query, &self.columns);
        let Some((key, group_order)) = ordering.group else {
            return Err(QueryError::NotGrouped);
        };
        let mut select = self.base(&exprs);
        select.expr(key.clone()).expr(aggregate);
        let mut group_by = vec![key];
        group_by.extend(group_order.iter().map(|(e, _)| e.clone()));
        select.add_group_by(group_by);
        for (expr, order) in group_order {
            select.order_by_expr(expr, order);
        }

        let mut groups: IndexMap<GroupKey, T> = IndexMap::new();
        for row in self.fetch(&select)? {
            let key = row.first().map(GroupKey::from_cell).unwrap_or(GroupKey::None);
            *groups.entry(key).or_default() += read(row.get(1));
        }
        Ok(groups)
    }

    pub fn count_by_group(&self) -> QueryResult<IndexMap<GroupKey, i64>> {
        self.by_group(|_| {
            let read: fn(Option<&Cell>) -> i64 = |cell| cell.and_then(Cell::as_i64).unwrap_or(0);
            Ok((Expr::col(Asterisk).count(), read))
        })
    }

    fn totalable(&self, name: &str) -> QueryResult<&QueryColumn> {
        self.columns
            .get(name)
            .filter(|c| c.totalable)
            .ok_or_else(|| QueryError::NotTotalable(name.to_string()))
    }

    pub fn total_for(&self, name: &str) -> QueryResult<f64> {
        let column = self.totalable(name)?;
        let mut exprs = self.exprs();
        let expr = exprs
            .total_expr(column)
            .ok_or_else(|| QueryError::NotTotalable(name.to_string()))?;
        let mut select = self.base(&exprs);
        select.expr(sum(expr));
        let rows = self.fetch(&select)?;
        Ok(total_from_cell(rows.first().and_then(|row| row.first())))
    }

    /// Totals of every requested column that is still available.
    pub fn totals(&self) -> QueryResult<IndexMap<String, f64>> {
        self.query
            .totalable_names
            .iter()
            .filter(|name| self.columns.get(name.as_str()).is_some_and(|c| c.totalable))
            .map(|name| Ok((name.clone(), self.total_for(name)?)))
            .collect()
    }

    pub fn total_by_group_for(&self, name: &str) -> QueryResult<IndexMap<GroupKey, f64>> {
        let column = self.totalable(name)?;
        let totals = self.by_group(|exprs| {
            let expr = exprs
                .total_expr(column)
                .ok_or_else(|| QueryError::NotTotalable(name.to_string()))?;
            let read: fn(Option<&Cell>) -> f64 = total_from_cell;
            Ok((sum(expr), read))
        })?;
        Ok(totals
            .into_iter()
            .map(|(key, total)| (key, round_total(total)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, RoleBasedSecurity};
    use crate::context::Actor;
    use crate::model::EntityKind;
    use crate::storage::{Dialect, SqliteStorage};
    use crate::testing;

    #[test]
    fn dialect_mismatch_is_an_execution_error() {
        let catalog: Catalog = testing::catalog();
        let security = RoleBasedSecurity::new(&catalog);
        let config = EngineConfig::default();
        assert_eq!(config.dialect, Dialect::Postgres);
        let engine = QueryEngine::new(&config, &catalog, &catalog, &security);
        let storage = SqliteStorage::open_in_memory().unwrap();
        let query = Query::new(EntityKind::Issue);
        let ctx = testing::ctx(Actor::admin(1));
        let err = engine.count(&storage, &query, &ctx).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Execution(StorageError::DialectMismatch { .. })
        ));
    }

    #[test]
    fn stripped_visibility_is_refused() {
        let fixture = testing::Fixture::new();
        let engine = fixture.engine();
        let query = Query::new(EntityKind::Issue);
        let ctx = testing::ctx(Actor::user(3));
        let predicate = engine.compile(&query, &ctx).unwrap().without_visibility();
        let err = engine
            .evaluate_compiled(&fixture.storage, &query, &ctx, predicate)
            .err()
            .unwrap();
        assert!(matches!(err, QueryError::SecurityInvariant(_)));
    }

    #[test]
    fn predicate_for_another_actor_is_refused() {
        let fixture = testing::Fixture::new();
        let engine = fixture.engine();
        let query = Query::new(EntityKind::Issue);
        let predicate = engine
            .compile(&query, &testing::ctx(Actor::admin(1)))
            .unwrap();
        let ctx = testing::ctx(Actor::user(3));
        let err = engine
            .evaluate_compiled(&fixture.storage, &query, &ctx, predicate)
            .err()
            .unwrap();
        assert!(matches!(err, QueryError::SecurityInvariant(_)));
    }

    #[test]
    fn invalid_query_is_not_executed() {
        let fixture = testing::Fixture::new();
        let engine = fixture.engine();
        let mut query = Query::new(EntityKind::Issue);
        query.add_filter("due_date", "=", ["not a date"]);
        let err = engine
            .count(&fixture.storage, &query, &testing::ctx(Actor::admin(1)))
            .unwrap_err();
        assert_eq!(err.field_errors().len(), 1);
    }

    #[test]
    fn count_matches_results_and_groups() {
        let fixture = testing::Fixture::new();
        let engine = fixture.engine();
        let mut query = Query::with_default_filters(EntityKind::Issue);
        query.group_by = Some("tracker".into());
        for actor in [Actor::admin(1), Actor::user(2), Actor::user(3), Actor::anonymous()] {
            let ctx = testing::ctx(actor);
            let evaluation = engine.evaluate(&fixture.storage, &query, &ctx).unwrap();
            let count = evaluation.count().unwrap();
            assert_eq!(evaluation.results(None, None).unwrap().len() as i64, count);
            assert_eq!(evaluation.count_by_group().unwrap().values().sum::<i64>(), count);
        }
    }

    #[test]
    fn ungrouped_query_has_no_group_counts() {
        let fixture = testing::Fixture::new();
        let engine = fixture.engine();
        let query = Query::new(EntityKind::Issue);
        let ctx = testing::ctx(Actor::admin(1));
        let err = engine
            .count_by_group(&fixture.storage, &query, &ctx)
            .unwrap_err();
        assert!(matches!(err, QueryError::NotGrouped));
        let err = engine
            .total_for(&fixture.storage, &query, &ctx, "subject")
            .unwrap_err();
        assert!(matches!(err, QueryError::NotTotalable(ref c) if c == "subject"));
    }

    #[test]
    fn paging() {
        let fixture = testing::Fixture::new();
        let engine = fixture.engine();
        let query = Query::new(EntityKind::Issue);
        let ctx = testing::ctx(Actor::admin(1));
        let evaluation = engine.evaluate(&fixture.storage, &query, &ctx).unwrap();
        let all = evaluation.results(None, None).unwrap();
        assert_eq!(evaluation.results(Some(2), None).unwrap(), all[2..].to_vec());
        assert_eq!(evaluation.results(Some(1), Some(2)).unwrap(), all[1..3].to_vec());
        // default order is id descending
        let mut sorted = all.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(all, sorted);
    }

    /// Answers every statement with a single text cell.
    struct TextCount;

    impl Storage for TextCount {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        fn fetch_rows(&self, _statement: &SelectStatement) -> Result<Vec<Vec<Cell>>, StorageError> {
            Ok(vec![vec![Cell::Text("many".into())]])
        }
    }

    #[test]
    fn undecodable_count_is_an_error() {
        let fixture = testing::Fixture::new();
        let engine = fixture.engine();
        let query = Query::new(EntityKind::Issue);
        let err = engine
            .count(&TextCount, &query, &testing::ctx(Actor::admin(1)))
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Execution(StorageError::Decode { column: 0, .. })
        ));
    }
}
