use std::env;

use anyhow::{bail, Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use sea_query::SelectStatement;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tracker_query::error::StorageError;
use tracker_query::parser::parse_query_string;
use tracker_query::storage::Cell;
use tracker_query::{
    Actor, Catalog, Dialect, EngineConfig, EntityKind, EvalContext, Query, QueryEngine, QueryError,
    RoleBasedSecurity, SqliteStorage, Storage,
};

/// 只渲染 SQL、不访问数据库的存储
struct RenderOnly(Dialect);

impl Storage for RenderOnly {
    fn dialect(&self) -> Dialect {
        self.0
    }

    fn fetch_rows(&self, _statement: &SelectStatement) -> Result<Vec<Vec<Cell>>, StorageError> {
        Ok(Vec::new())
    }
}

/// 控制台会话状态
struct Session {
    actor: Actor,
    kind: EntityKind,
    project_id: Option<i64>,
}

impl Session {
    fn describe(&self) -> String {
        let actor = match (self.actor.id, self.actor.admin) {
            (None, _) => "anonymous".to_string(),
            (Some(id), true) => format!("admin {id}"),
            (Some(id), false) => format!("user {id}"),
        };
        let project = self
            .project_id
            .map(|id| format!("project {id}"))
            .unwrap_or_else(|| "global".to_string());
        format!("{actor} / {} / {project}", self.kind)
    }
}

fn load_config(path: Option<&String>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("无法加载引擎配置 {path}")),
        None => {
            println!("⚠️ 未指定配置文件, 使用默认配置");
            Ok(EngineConfig::default())
        }
    }
}

fn print_help() {
    println!("命令:");
    println!("  :actor admin <id> | user <id> | anonymous");
    println!("  :kind issue | project");
    println!("  :project <id> | none");
    println!("  :filters       列出当前可用的过滤器");
    println!("  :quit");
    println!("其他输入按查询参数串处理, 例如:");
    println!("  set_filter=1&f[]=status_id&op[status_id]=o&group_by=tracker");
    println!("  assigned_to_id=me&due_date=><2011-07-01|2011-07-31&sort=priority:desc");
}

/// 处理 ':' 开头的命令，返回 false 表示退出
fn run_command(line: &str, session: &mut Session, engine: &QueryEngine<'_>) -> Result<bool> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [":quit"] | [":q"] => return Ok(false),
        [":help"] => print_help(),
        [":actor", "anonymous"] => session.actor = Actor::anonymous(),
        [":actor", "admin", id] => session.actor = Actor::admin(id.parse().context("无效的用户 id")?),
        [":actor", "user", id] => session.actor = Actor::user(id.parse().context("无效的用户 id")?),
        [":kind", "issue"] => session.kind = EntityKind::Issue,
        [":kind", "project"] => session.kind = EntityKind::Project,
        [":project", "none"] => session.project_id = None,
        [":project", id] => session.project_id = Some(id.parse().context("无效的项目 id")?),
        [":filters"] => {
            let filters = engine.available_filters(session.kind, &session.actor, session.project_id);
            for (key, definition) in &filters {
                let operators: Vec<&str> = definition
                    .operators
                    .operators()
                    .iter()
                    .map(|op| op.symbol())
                    .collect();
                println!("  {key:<28} {:<24} {}", definition.name, operators.join(" "));
            }
            println!("共 {} 个过滤器", filters.len());
        }
        _ => bail!("未知命令: {line}"),
    }
    println!("✅ {}", session.describe());
    Ok(true)
}

/// 解析参数串，校验并输出 SQL；提供数据库时同时执行
fn run_query(
    input: &str,
    session: &Session,
    engine: &QueryEngine<'_>,
    database: Option<&SqliteStorage>,
) -> Result<()> {
    let params = parse_query_string(input).context("参数串解析失败")?;

    let mut query = Query::with_default_filters(session.kind);
    if let Some(project_id) = session.project_id {
        query = query.in_project(project_id);
    }
    let filters = engine.query_filters(&query, &session.actor);
    let columns = engine.query_columns(&query, &session.actor);
    query.apply_params(&params, &filters, &columns);
    println!("[查询参数]: {}", query.to_params());

    let ctx = EvalContext::new(session.actor.clone());
    let render_only = RenderOnly(engine.config.dialect);
    let storage: &dyn Storage = match database {
        Some(db) => db,
        None => &render_only,
    };

    let evaluation = match engine.evaluate(storage, &query, &ctx) {
        Ok(evaluation) => evaluation,
        Err(QueryError::Invalid(errors)) => {
            println!("✗ 查询无效:");
            for error in errors {
                println!("  • {error}");
            }
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let dialect = engine.config.dialect;
    println!("\n[结果 SQL]:\n{}", dialect.render(&evaluation.results_statement(None, Some(25))));
    println!("\n[计数 SQL]:\n{}", dialect.render(&evaluation.count_statement()));

    if database.is_some() {
        let count = evaluation.count()?;
        let ids = evaluation.results(None, Some(25))?;
        println!("\n✅ 共 {count} 条, 前 {} 条: {:?}", ids.len(), ids);
        if query.is_grouped() {
            for (key, count) in evaluation.count_by_group()? {
                println!("  {key}: {count}");
            }
        }
        for (column, total) in evaluation.totals()? {
            println!("  合计 {column}: {total}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 用法: tracker_query [config.json] [catalog.json] [database.sqlite]
    let args: Vec<String> = env::args().skip(1).collect();
    let config = load_config(args.first())?;
    let catalog = match args.get(1) {
        Some(path) => Catalog::from_json_file(path).with_context(|| format!("无法加载目录 {path}"))?,
        None => {
            println!("⚠️ 未指定目录文件, 使用空目录");
            Catalog::default()
        }
    };
    let database = match args.get(2) {
        Some(path) => {
            if config.dialect != Dialect::Sqlite {
                bail!("执行查询需要 sqlite 方言, 当前为 {:?}", config.dialect);
            }
            let conn = rusqlite::Connection::open(path).with_context(|| format!("无法打开数据库 {path}"))?;
            Some(SqliteStorage::new(conn))
        }
        None => None,
    };
    info!(
        dialect = ?config.dialect,
        custom_fields = catalog.custom_fields.len(),
        projects = catalog.projects.len(),
        "console ready"
    );

    let security = RoleBasedSecurity::new(&catalog);
    let engine = QueryEngine::new(&config, &catalog, &catalog, &security);

    println!("--- tracker_query: 查询参数到 SQL 的编译控制台 ---");
    print_help();

    let mut session = Session {
        actor: Actor::anonymous(),
        kind: EntityKind::Issue,
        project_id: None,
    };
    let mut editor = DefaultEditor::new()?;
    loop {
        let prompt = format!("[{}]> ", session.describe());
        match editor.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                let outcome = if line.starts_with(':') {
                    match run_command(line, &mut session, &engine) {
                        Ok(false) => break,
                        Ok(true) => Ok(()),
                        Err(e) => Err(e),
                    }
                } else {
                    run_query(line, &session, &engine, database.as_ref())
                };
                if let Err(e) = outcome {
                    println!("✗ {e:#}");
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
