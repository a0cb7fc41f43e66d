use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use rusqlite::{types::ValueRef, Connection, OpenFlags};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{dedup_by_key, files_with_extension, json_bool, json_str, read_text, ScanContext, Scanner};
use crate::{
    launcher::{LaunchError, LaunchTarget},
    models::{GameEntry, Platform},
};

const INSTALL_ROW_CAP: usize = 1200;
const NAME_ROW_CAP: usize = 4000;

const ID_COLUMNS: [&str; 6] = ["productid", "product_id", "asin", "gameid", "id", "product"];
const NAME_COLUMNS: [&str; 4] = ["title", "name", "displayname", "producttitle"];
const INSTALL_COLUMNS: [&str; 5] = ["installlocation", "installpath", "install_dir", "path", "location"];
const INSTALLED_COLUMNS: [&str; 5] = [
    "installed",
    "isinstalled",
    "bisinstalled",
    "is_installed",
    "installationstate",
];

/// Amazon Games: JSON manifests, falling back to the launcher's sqlite
/// catalogs on newer installs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmazonScanner;

impl Scanner for AmazonScanner {
    fn platform(&self) -> Platform {
        Platform::Amazon
    }

    fn scan(&self, ctx: &ScanContext) -> Vec<GameEntry> {
        let mut games: Vec<GameEntry> = manifest_dirs(ctx)
            .iter()
            .flat_map(|dir| files_with_extension(dir, "json"))
            .filter_map(|file| parse_manifest(&file))
            .collect();

        if games.is_empty() {
            if let Some(dir) = sql_dir(ctx) {
                games = scan_sqlite_dir(&dir);
            }
        }

        let games = dedup_by_key(games);
        info!("amazon: found {} games", games.len());
        games
    }

    fn resolve_launch_target(
        &self,
        id: &str,
        _ctx: &ScanContext,
    ) -> Result<LaunchTarget, LaunchError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(LaunchError::unresolved(Platform::Amazon, id, "empty product id"));
        }
        Ok(LaunchTarget::Uri(format!("amazon-games://play/{id}")))
    }
}

fn manifest_dirs(ctx: &ScanContext) -> Vec<PathBuf> {
    let folders = &ctx.folders;
    let mut dirs = Vec::new();
    if let Some(local) = &folders.local_app_data {
        dirs.push(local.join("Amazon Games").join("Data").join("Manifests"));
        dirs.push(local.join("Amazon Games").join("GameLibrary").join("Manifests"));
    }
    if let Some(data) = &folders.program_data {
        dirs.push(
            data.join("Amazon")
                .join("Amazon Games")
                .join("Data")
                .join("Manifests"),
        );
    }
    dirs
}

fn sql_dir(ctx: &ScanContext) -> Option<PathBuf> {
    ctx.folders.local_app_data.as_ref().map(|local| {
        local
            .join("Amazon Games")
            .join("Data")
            .join("Games")
            .join("Sql")
    })
}

fn parse_manifest(file: &Path) -> Option<GameEntry> {
    let text = read_text(file)?;
    let root: serde_json::Value = match serde_json::from_str(&text) {
        Ok(root) => root,
        Err(err) => {
            debug!("amazon: invalid manifest {}: {err}", file.display());
            return None;
        }
    };

    let installed = json_bool(&root, "installed")
        .or_else(|| json_bool(&root, "isInstalled"))
        .unwrap_or(true);
    if !installed {
        return None;
    }

    let stem = file.file_stem().and_then(|stem| stem.to_str()).map(str::trim);
    let id = json_str(&root, &["id", "productId", "asin", "gameId"])
        .or(stem)
        .filter(|id| !id.is_empty())?;
    let name = json_str(&root, &["title", "name", "productTitle", "displayName"]).unwrap_or(id);

    let mut entry = GameEntry::new(Platform::Amazon, id, name);
    if let Some(install) = json_str(&root, &["installPath", "installLocation", "path"]) {
        entry = entry.with_install_path(install);
    }
    Some(entry)
}

/// Rows gathered across every catalog database, keyed by lowercased id.
#[derive(Debug, Default)]
struct Catalog {
    /// Folded id → (id as stored, install dir).
    installs: BTreeMap<String, (String, String)>,
    names: BTreeMap<String, String>,
    /// Folded id → id as stored.
    installed: BTreeMap<String, String>,
}

fn fold(id: &str) -> String {
    id.to_lowercase()
}

fn scan_sqlite_dir(dir: &Path) -> Vec<GameEntry> {
    let mut catalog = Catalog::default();
    for db in files_with_extension(dir, "sqlite") {
        if let Err(err) = read_catalog(&db, &mut catalog) {
            warn!("amazon: skipping catalog {}: {err:#}", db.display());
        }
    }

    let installed = catalog
        .installs
        .iter()
        .map(|(folded, (id, dir))| (folded, id, Some(dir)));
    let flagged = catalog
        .installed
        .iter()
        .filter(|(folded, _)| !catalog.installs.contains_key(*folded))
        .map(|(folded, id)| (folded, id, None));

    installed
        .chain(flagged)
        .map(|(folded, id, dir)| {
            let name = catalog.names.get(folded).cloned().unwrap_or_else(|| id.clone());
            let mut entry = GameEntry::new(Platform::Amazon, id.clone(), name);
            if let Some(dir) = dir {
                entry = entry.with_install_path(dir);
            }
            entry
        })
        .collect()
}

fn read_catalog(path: &Path, catalog: &mut Catalog) -> Result<()> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open {}", path.display()))?;

    let tables: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .context("failed to list tables")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let names: Vec<String> = rows.filter_map(|row| row.ok()).collect();
        names
    };

    for table in tables {
        if let Err(err) = read_table(&conn, &table, catalog) {
            debug!("amazon: skipping table {table} in {}: {err:#}", path.display());
        }
    }
    Ok(())
}

fn read_table(conn: &Connection, table: &str, catalog: &mut Catalog) -> Result<()> {
    let columns = table_columns(conn, table)?;
    let Some(id_col) = pick_column(&columns, &ID_COLUMNS) else {
        return Ok(());
    };
    let name_col = pick_column(&columns, &NAME_COLUMNS);
    let install_col = pick_column(&columns, &INSTALL_COLUMNS);
    let installed_col = pick_column(&columns, &INSTALLED_COLUMNS);

    if install_col.is_some() || installed_col.is_some() {
        let sql = format!(
            "SELECT {}, {}, {} FROM {}",
            quote(id_col),
            install_col.map(quote).unwrap_or_else(|| "NULL".into()),
            installed_col.map(quote).unwrap_or_else(|| "NULL".into()),
            quote(table)
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut seen = 0;
        while let Some(row) = rows.next()? {
            if seen >= INSTALL_ROW_CAP {
                break;
            }
            seen += 1;

            let Some(id) = text_of(row.get_ref(0)?).filter(|id| is_plausible_id(id)) else {
                continue;
            };
            let install = text_of(row.get_ref(1)?).filter(|dir| Path::new(dir).is_dir());
            match install {
                Some(dir) => {
                    catalog.installs.insert(fold(&id), (id, dir));
                }
                None if boolish(row.get_ref(2)?) == Some(true) => {
                    catalog.installed.insert(fold(&id), id);
                }
                None => {}
            }
        }
    }

    if let Some(name_col) = name_col {
        let sql = format!("SELECT {}, {} FROM {}", quote(id_col), quote(name_col), quote(table));
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut seen = 0;
        while let Some(row) = rows.next()? {
            if seen >= NAME_ROW_CAP {
                break;
            }
            seen += 1;

            let id = text_of(row.get_ref(0)?).filter(|id| is_plausible_id(id));
            let name = text_of(row.get_ref(1)?);
            if let (Some(id), Some(name)) = (id, name) {
                catalog.names.insert(fold(&id), name);
            }
        }
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let rows = stmt.query_map([], |row| row.get::<_, Option<String>>(1))?;
    let columns: Vec<String> = rows.filter_map(|row| row.ok().flatten()).collect();
    Ok(columns)
}

/// Exact (case-insensitive) match in priority order, then substring match.
fn pick_column<'a>(columns: &'a [String], wanted: &[&str]) -> Option<&'a str> {
    let exact = wanted.iter().find_map(|want| {
        columns
            .iter()
            .find(|column| column.eq_ignore_ascii_case(want))
    });
    let partial = || {
        wanted.iter().find_map(|want| {
            columns
                .iter()
                .find(|column| column.to_ascii_lowercase().contains(want))
        })
    };
    exact.or_else(partial).map(String::as_str)
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn text_of(value: ValueRef<'_>) -> Option<String> {
    let text = match value {
        ValueRef::Null | ValueRef::Blob(_) => return None,
        ValueRef::Integer(number) => number.to_string(),
        ValueRef::Real(number) => number.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn boolish(value: ValueRef<'_>) -> Option<bool> {
    match value {
        ValueRef::Integer(number) => Some(number != 0),
        ValueRef::Real(number) => Some(number != 0.0),
        ValueRef::Text(_) => {
            let text = text_of(value)?.to_ascii_lowercase();
            match text.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                other => match other.parse::<i64>() {
                    Ok(number) => Some(number != 0),
                    Err(_) => other.contains("installed").then_some(true),
                },
            }
        }
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

/// `amzn1.` ids, UUIDs, or ten-character ASINs.
fn is_plausible_id(id: &str) -> bool {
    id.to_ascii_lowercase().starts_with("amzn1.")
        || Uuid::parse_str(id).is_ok()
        || (id.chars().count() == 10 && id.chars().all(char::is_alphanumeric))
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use tempfile::tempdir;

    use super::*;
    use crate::scanner::{KnownFolders, NoRegistry};

    #[test]
    fn manifests_use_fallback_fields() -> Result<()> {
        let temp = tempdir()?;
        let ctx = ScanContext::new(KnownFolders::rooted_at(temp.path()), Arc::new(NoRegistry));
        let dirs = manifest_dirs(&ctx);
        fs::create_dir_all(&dirs[0])?;
        fs::create_dir_all(&dirs[2])?;

        fs::write(
            dirs[0].join("a.json"),
            r#"{"productId":"amzn1.adg.product.1","productTitle":"Tomb Raider","installLocation":"D:\\Amazon\\TR"}"#,
        )?;
        fs::write(dirs[0].join("b.json"), r#"{"asin":"B000000002","installed":false}"#)?;
        fs::write(dirs[2].join("B08XYZ1234.json"), r#"{"isInstalled":true}"#)?;

        let mut games = AmazonScanner.scan(&ctx);
        games.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].id, "B08XYZ1234");
        assert_eq!(games[0].name, "B08XYZ1234");
        assert_eq!(games[1].name, "Tomb Raider");
        assert!(games[1].install_path.is_some());
        Ok(())
    }

    #[test]
    fn sqlite_fallback_joins_installs_and_names() -> Result<()> {
        let temp = tempdir()?;
        let ctx = ScanContext::new(KnownFolders::rooted_at(temp.path()), Arc::new(NoRegistry));
        let dir = sql_dir(&ctx).unwrap();
        fs::create_dir_all(&dir)?;
        let game_dir = temp.path().join("Games").join("Wheels");
        fs::create_dir_all(&game_dir)?;

        let conn = Connection::open(dir.join("GameInstallInfo.sqlite"))?;
        conn.execute_batch(
            "CREATE TABLE DbSet (Id TEXT, ProductTitle TEXT, InstallLocation TEXT, Installed INTEGER);",
        )?;
        conn.execute(
            "INSERT INTO DbSet VALUES (?1, ?2, ?3, 1)",
            rusqlite::params![
                "amzn1.adg.product.wheels",
                "Wheels of Aurelia",
                game_dir.to_string_lossy().to_string(),
            ],
        )?;
        conn.execute(
            "INSERT INTO DbSet VALUES ('6f1c7f4e-1a2b-4c3d-9e8f-0123456789ab', 'Flagged Only', NULL, 1)",
            [],
        )?;
        conn.execute("INSERT INTO DbSet VALUES ('not-an-id', 'Junk', NULL, 1)", [])?;
        conn.execute("INSERT INTO DbSet VALUES ('B0123456789', 'Too long', NULL, 0)", [])?;
        drop(conn);

        let mut games = AmazonScanner.scan(&ctx);
        games.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].name, "Flagged Only");
        assert!(games[0].install_path.is_none());
        assert_eq!(games[1].key(), "amazon:amzn1.adg.product.wheels");
        assert_eq!(games[1].install_path.as_deref(), Some(game_dir.as_path()));
        Ok(())
    }

    #[test]
    fn catalog_ids_match_across_tables_ignoring_case() -> Result<()> {
        let temp = tempdir()?;
        let ctx = ScanContext::new(KnownFolders::rooted_at(temp.path()), Arc::new(NoRegistry));
        let dir = sql_dir(&ctx).unwrap();
        fs::create_dir_all(&dir)?;
        let game_dir = temp.path().join("Games").join("Tunic");
        fs::create_dir_all(&game_dir)?;

        let installs = Connection::open(dir.join("GameInstallInfo.sqlite"))?;
        installs.execute_batch("CREATE TABLE DbSet (Id TEXT, InstallLocation TEXT);")?;
        installs.execute(
            "INSERT INTO DbSet VALUES (?1, ?2)",
            rusqlite::params![
                "AMZN1.ADG.PRODUCT.TUNIC",
                game_dir.to_string_lossy().to_string()
            ],
        )?;
        drop(installs);
        let products = Connection::open(dir.join("GameProductInfo.sqlite"))?;
        products.execute_batch(
            "CREATE TABLE DbSet (Id TEXT, ProductTitle TEXT);
             INSERT INTO DbSet VALUES ('amzn1.adg.product.tunic', 'TUNIC');",
        )?;
        drop(products);

        let games = AmazonScanner.scan(&ctx);
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].id, "AMZN1.ADG.PRODUCT.TUNIC");
        assert_eq!(games[0].name, "TUNIC");
        assert_eq!(games[0].install_path.as_deref(), Some(game_dir.as_path()));
        Ok(())
    }

    #[test]
    fn column_picking_prefers_exact_matches() {
        let columns: Vec<String> = ["ProductIdHash", "Id", "ProductTitle"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(pick_column(&columns, &ID_COLUMNS), Some("Id"));
        assert_eq!(pick_column(&columns, &NAME_COLUMNS), Some("ProductTitle"));
        assert_eq!(pick_column(&columns, &INSTALL_COLUMNS), None);
    }

    #[test]
    fn plausible_ids() {
        assert!(is_plausible_id("amzn1.adg.product.x"));
        assert!(is_plausible_id("B08XYZ1234"));
        assert!(is_plausible_id("6f1c7f4e-1a2b-4c3d-9e8f-0123456789ab"));
        assert!(!is_plausible_id("short"));
    }
}
