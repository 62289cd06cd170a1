//! Command handlers. Each one builds the services it needs over the shared
//! connection and prints its result as pretty JSON.

use anyhow::{bail, Context, Result};
use boxtrack_core::{
    Connection, FullWipeConfirmation, IntegrityService, ItemService, MaterializeOptions,
    SeedConfig, SeedNode, SeedService, SqliteAuditRepository, SqliteBoxRepository,
    SqliteCustodyRepository, SqliteFixtureRepository, SqliteItemRepository, TreeMaterializer,
};
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

pub fn load_seed_config(path: Option<&Path>) -> Result<SeedConfig> {
    let Some(path) = path else {
        return Ok(SeedConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config `{}`", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config `{}`", path.display()))
}

pub fn seed(conn: &Connection, config: SeedConfig, fixture: &Path) -> Result<ExitCode> {
    let trees = load_fixture(fixture)?;
    let report = seed_service(conn, config)?.seed_from_trees(&trees)?;
    print_json(&report)
}

pub fn seed_full(
    conn: &Connection,
    config: SeedConfig,
    fixture: &Path,
    confirmed: bool,
) -> Result<ExitCode> {
    if !confirmed {
        bail!("seed-full deletes every box and item; pass --yes-wipe-everything to proceed");
    }
    let trees = load_fixture(fixture)?;
    let report = seed_service(conn, config)?
        .seed_full(&trees, FullWipeConfirmation::wipe_everything())?;
    print_json(&report)
}

pub fn wipe_reserved(conn: &Connection, config: SeedConfig) -> Result<ExitCode> {
    let report = seed_service(conn, config)?.wipe_reserved_range()?;
    print_json(&report)
}

pub fn tree(
    conn: &Connection,
    short_id: &str,
    ancestors: bool,
    stats: bool,
    flatten: bool,
) -> Result<ExitCode> {
    let materializer = TreeMaterializer::new(
        SqliteBoxRepository::try_new(conn)?,
        SqliteItemRepository::try_new(conn)?,
    );
    let options = MaterializeOptions {
        include_ancestors: ancestors,
        include_stats: stats,
        flatten,
    };
    match materializer.materialize(short_id, options)? {
        Some(tree) => print_json(&tree),
        None => {
            eprintln!("no box with short id {short_id}");
            Ok(ExitCode::from(3))
        }
    }
}

pub fn orphans(conn: &Connection) -> Result<ExitCode> {
    let items = ItemService::new(SqliteItemRepository::try_new(conn)?).list_orphaned_items()?;
    print_json(&items)
}

pub fn audit(conn: &Connection) -> Result<ExitCode> {
    let report = IntegrityService::new(SqliteAuditRepository::try_new(conn)?).audit()?;
    print_json(&report)?;
    if report.is_consistent() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}

type SqliteSeedService<'conn> = SeedService<
    SqliteBoxRepository<'conn>,
    SqliteCustodyRepository<'conn>,
    SqliteFixtureRepository<'conn>,
>;

fn seed_service(conn: &Connection, config: SeedConfig) -> Result<SqliteSeedService<'_>> {
    Ok(SeedService::with_config(
        SqliteBoxRepository::try_new(conn)?,
        SqliteCustodyRepository::try_new(conn)?,
        SqliteFixtureRepository::try_new(conn)?,
        config,
    ))
}

fn load_fixture(path: &Path) -> Result<Vec<SeedNode>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture `{}`", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse fixture `{}`", path.display()))
}

fn print_json(value: &impl Serialize) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(ExitCode::SUCCESS)
}
