//! SQLite catalog database
//!
//! Holds the repo rows with their trust state, and the apps and releases of
//! every repo's last accepted index. List-valued columns are JSON text.

use std::path::Path;

use pkgsync_core::{CatalogStore, RepoCommit, StoreError};
use pkgsync_schema::{
    Apk, App, CertificateHex, Fingerprint, HashType, IndexFormat, PackageName, Repo, RepoChanges,
    RepoId,
};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, ToSql, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Repository not found: {0}")]
    RepoNotFound(RepoId),

    #[error("Repository already added: {0}")]
    DuplicateRepo(String),
}

const REPO_COLUMNS: &str = "id, address, name, description, icon, mirrors, fingerprint, \
    signing_certificate, last_etag, timestamp, max_age, version, format, last_updated";

const APP_COLUMNS: &str = "repo_id, package_name, name, summary, description, icon, license, \
    web_site, source_code, issue_tracker, changelog, donate, categories, anti_features, \
    requirements, suggested_version_code, added, last_updated, preferred_signer, localized";

const APK_COLUMNS: &str = "repo_id, package_name, version_code, version_name, apk_name, \
    src_name, size, hash, hash_type, sig, signer, min_sdk, target_sdk, max_sdk, permissions, \
    features, native_code, anti_features, added";

/// Catalog database implementing [`CatalogStore`]
pub struct CatalogDb {
    conn: Connection,
}

impl std::fmt::Debug for CatalogDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogDb")
            .field("path", &self.conn.path())
            .finish()
    }
}

fn conversion(column: usize, e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, e.into())
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, column: usize) -> rusqlite::Result<T> {
    let text: String = row.get(column)?;
    serde_json::from_str(&text).map_err(|e| conversion(column, e))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, DbError> {
    Ok(serde_json::to_string(value)?)
}

fn repo_from_row(row: &Row<'_>) -> rusqlite::Result<Repo> {
    let fingerprint: Option<String> = row.get(6)?;
    let certificate: Option<String> = row.get(7)?;
    let format: String = row.get(12)?;
    Ok(Repo {
        id: RepoId(row.get(0)?),
        address: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        icon: row.get(4)?,
        mirrors: json_column(row, 5)?,
        fingerprint: fingerprint
            .map(|f| Fingerprint::parse(&f))
            .transpose()
            .map_err(|e| conversion(6, e))?,
        signing_certificate: certificate
            .map(|c| CertificateHex::parse(&c))
            .transpose()
            .map_err(|e| conversion(7, e))?,
        last_etag: row.get(8)?,
        timestamp: row.get(9)?,
        max_age: row.get(10)?,
        version: row.get(11)?,
        format: format.parse().map_err(|e: String| conversion(12, e))?,
        last_updated: row.get(13)?,
    })
}

fn app_from_row(row: &Row<'_>) -> rusqlite::Result<App> {
    let package: String = row.get(1)?;
    Ok(App {
        repo_id: RepoId(row.get(0)?),
        package_name: PackageName::new(package),
        name: row.get(2)?,
        summary: row.get(3)?,
        description: row.get(4)?,
        icon: row.get(5)?,
        license: row.get(6)?,
        web_site: row.get(7)?,
        source_code: row.get(8)?,
        issue_tracker: row.get(9)?,
        changelog: row.get(10)?,
        donate: row.get(11)?,
        categories: json_column(row, 12)?,
        anti_features: json_column(row, 13)?,
        requirements: json_column(row, 14)?,
        suggested_version_code: row.get(15)?,
        added: row.get(16)?,
        last_updated: row.get(17)?,
        preferred_signer: row.get(18)?,
        localized: json_column(row, 19)?,
    })
}

fn apk_from_row(row: &Row<'_>) -> rusqlite::Result<Apk> {
    let package: String = row.get(1)?;
    let hash_type: String = row.get(8)?;
    let size: i64 = row.get(6)?;
    Ok(Apk {
        repo_id: RepoId(row.get(0)?),
        package_name: PackageName::new(package),
        version_code: row.get(2)?,
        version_name: row.get(3)?,
        apk_name: row.get(4)?,
        src_name: row.get(5)?,
        size: size as u64,
        hash: row.get(7)?,
        hash_type: hash_type.parse::<HashType>().map_err(|e| conversion(8, e))?,
        sig: row.get(9)?,
        signer: row.get(10)?,
        min_sdk: row.get(11)?,
        target_sdk: row.get(12)?,
        max_sdk: row.get(13)?,
        permissions: json_column(row, 14)?,
        features: json_column(row, 15)?,
        native_code: json_column(row, 16)?,
        anti_features: json_column(row, 17)?,
        added: row.get(18)?,
    })
}

impl CatalogDb {
    /// Open or create the catalog at `path`, creating parent directories
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self::open_at(path)
    }

    /// Open database at a specific path
    pub fn open_at(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS repos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                address TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                icon TEXT NOT NULL DEFAULT '',
                mirrors TEXT NOT NULL DEFAULT '[]',
                fingerprint TEXT,
                signing_certificate TEXT,
                last_etag TEXT,
                timestamp INTEGER NOT NULL DEFAULT 0,
                max_age INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 0,
                format TEXT NOT NULL DEFAULT 'v1',
                last_updated INTEGER
            );

            CREATE TABLE IF NOT EXISTS apps (
                repo_id INTEGER NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
                package_name TEXT NOT NULL,
                name TEXT NOT NULL,
                summary TEXT NOT NULL,
                description TEXT NOT NULL,
                icon TEXT NOT NULL,
                license TEXT NOT NULL,
                web_site TEXT NOT NULL,
                source_code TEXT NOT NULL,
                issue_tracker TEXT NOT NULL,
                changelog TEXT NOT NULL,
                donate TEXT NOT NULL,
                categories TEXT NOT NULL,
                anti_features TEXT NOT NULL,
                requirements TEXT NOT NULL,
                suggested_version_code INTEGER,
                added INTEGER,
                last_updated INTEGER,
                preferred_signer TEXT,
                localized TEXT NOT NULL,
                PRIMARY KEY (repo_id, package_name)
            );

            CREATE TABLE IF NOT EXISTS apks (
                repo_id INTEGER NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
                package_name TEXT NOT NULL,
                version_code INTEGER NOT NULL,
                version_name TEXT NOT NULL,
                apk_name TEXT NOT NULL,
                src_name TEXT,
                size INTEGER NOT NULL,
                hash TEXT NOT NULL,
                hash_type TEXT NOT NULL,
                sig TEXT NOT NULL,
                signer TEXT,
                min_sdk INTEGER,
                target_sdk INTEGER,
                max_sdk INTEGER,
                permissions TEXT NOT NULL,
                features TEXT NOT NULL,
                native_code TEXT NOT NULL,
                anti_features TEXT NOT NULL,
                added INTEGER,
                PRIMARY KEY (repo_id, package_name, version_code, hash)
            );

            CREATE INDEX IF NOT EXISTS idx_apks_package ON apks(repo_id, package_name);
            ",
        )?;
        Ok(())
    }

    /// Register a repository that has never been contacted
    pub fn add_repo(
        &self,
        address: &str,
        fingerprint: Option<&Fingerprint>,
        format: IndexFormat,
    ) -> Result<Repo, DbError> {
        let address = address.trim().trim_end_matches('/');
        if self.find_repo(address)?.is_some() {
            return Err(DbError::DuplicateRepo(address.to_string()));
        }
        self.conn.execute(
            "INSERT INTO repos (address, fingerprint, format) VALUES (?1, ?2, ?3)",
            params![address, fingerprint.map(Fingerprint::as_str), format.as_str()],
        )?;
        let id = RepoId(self.conn.last_insert_rowid());
        self.get_repo(id)?.ok_or(DbError::RepoNotFound(id))
    }

    pub fn get_repo(&self, id: RepoId) -> Result<Option<Repo>, DbError> {
        let sql = format!("SELECT {REPO_COLUMNS} FROM repos WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id.0], repo_from_row)
            .optional()?)
    }

    /// Look a repository up by address (trailing `/` ignored)
    pub fn find_repo(&self, address: &str) -> Result<Option<Repo>, DbError> {
        let sql = format!("SELECT {REPO_COLUMNS} FROM repos WHERE address = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![address.trim_end_matches('/')], repo_from_row)
            .optional()?)
    }

    pub fn list_repos(&self) -> Result<Vec<Repo>, DbError> {
        let sql = format!("SELECT {REPO_COLUMNS} FROM repos ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let repos = stmt.query_map([], repo_from_row)?;
        repos.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Remove a repository with its apps and releases
    pub fn remove_repo(&mut self, id: RepoId) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM apks WHERE repo_id = ?1", params![id.0])?;
        tx.execute("DELETE FROM apps WHERE repo_id = ?1", params![id.0])?;
        let deleted = tx.execute("DELETE FROM repos WHERE id = ?1", params![id.0])?;
        if deleted == 0 {
            return Err(DbError::RepoNotFound(id));
        }
        tx.commit()?;
        Ok(())
    }

    /// Apps ordered by package name, optionally limited to one repo and to
    /// names containing `query` (case-insensitive)
    pub fn list_apps(&self, repo: Option<RepoId>, query: Option<&str>) -> Result<Vec<App>, DbError> {
        let pattern = query.map(|q| format!("%{q}%"));
        let sql = format!(
            "SELECT {APP_COLUMNS} FROM apps
             WHERE (?1 IS NULL OR repo_id = ?1)
               AND (?2 IS NULL OR package_name LIKE ?2 OR name LIKE ?2)
             ORDER BY package_name, repo_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let apps = stmt.query_map(params![repo.map(|r| r.0), pattern], app_from_row)?;
        apps.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Releases of one app, newest first
    pub fn list_apks(&self, repo: RepoId, package: &str) -> Result<Vec<Apk>, DbError> {
        let sql = format!(
            "SELECT {APK_COLUMNS} FROM apks WHERE repo_id = ?1 AND package_name = ?2
             ORDER BY version_code DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let apks = stmt.query_map(params![repo.0, package], apk_from_row)?;
        apks.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn count_apps(&self, repo: RepoId) -> Result<u64, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM apps WHERE repo_id = ?1",
            params![repo.0],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Replace a repo's catalog and update its row in one transaction
    pub fn apply_commit(
        &mut self,
        commit: &RepoCommit,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<(), DbError> {
        let repo_id = commit.repo_id;
        let tx = self.conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row("SELECT id FROM repos WHERE id = ?1", params![repo_id.0], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(DbError::RepoNotFound(repo_id));
        }

        tx.execute("DELETE FROM apks WHERE repo_id = ?1", params![repo_id.0])?;
        tx.execute("DELETE FROM apps WHERE repo_id = ?1", params![repo_id.0])?;
        insert_apps(&tx, commit, progress)?;
        update_repo(&tx, repo_id, &commit.changes)?;

        tx.commit()?;
        tracing::debug!(repo = %repo_id, apps = commit.apps.len(), "catalog replaced");
        Ok(())
    }
}

fn insert_apps(
    tx: &Transaction<'_>,
    commit: &RepoCommit,
    progress: &mut dyn FnMut(u64, u64),
) -> Result<(), DbError> {
    let mut app_stmt = tx.prepare(&format!(
        "INSERT OR REPLACE INTO apps ({APP_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
    ))?;
    let mut apk_stmt = tx.prepare(&format!(
        "INSERT OR REPLACE INTO apks ({APK_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
    ))?;

    let total = commit.apps.len() as u64;
    let repo_id = commit.repo_id.0;
    for (done, indexed) in commit.apps.iter().enumerate() {
        let app = &indexed.app;
        app_stmt.execute(params![
            repo_id,
            app.package_name.as_str(),
            app.name,
            app.summary,
            app.description,
            app.icon,
            app.license,
            app.web_site,
            app.source_code,
            app.issue_tracker,
            app.changelog,
            app.donate,
            to_json(&app.categories)?,
            to_json(&app.anti_features)?,
            to_json(&app.requirements)?,
            app.suggested_version_code,
            app.added,
            app.last_updated,
            app.preferred_signer,
            to_json(&app.localized)?,
        ])?;

        for apk in &indexed.apks {
            apk_stmt.execute(params![
                repo_id,
                apk.package_name.as_str(),
                apk.version_code,
                apk.version_name,
                apk.apk_name,
                apk.src_name,
                apk.size as i64,
                apk.hash,
                apk.hash_type.as_str(),
                apk.sig,
                apk.signer,
                apk.min_sdk,
                apk.target_sdk,
                apk.max_sdk,
                to_json(&apk.permissions)?,
                to_json(&apk.features)?,
                to_json(&apk.native_code)?,
                to_json(&apk.anti_features)?,
                apk.added,
            ])?;
        }
        progress(done as u64 + 1, total);
    }
    Ok(())
}

/// `UPDATE repos` touching only the columns present in `changes`.
fn update_repo(tx: &Transaction<'_>, id: RepoId, changes: &RepoChanges) -> Result<(), DbError> {
    let mut columns: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();
    let mut set = |column: &'static str, value: Box<dyn ToSql>| {
        columns.push(column);
        values.push(value);
    };

    if let Some(name) = &changes.name {
        set("name", Box::new(name.clone()));
    }
    if let Some(description) = &changes.description {
        set("description", Box::new(description.clone()));
    }
    if let Some(icon) = &changes.icon {
        set("icon", Box::new(icon.clone()));
    }
    if let Some(mirrors) = &changes.mirrors {
        set("mirrors", Box::new(to_json(mirrors)?));
    }
    if let Some(certificate) = &changes.signing_certificate {
        set("signing_certificate", Box::new(certificate.as_str().to_string()));
    }
    if let Some(etag) = &changes.last_etag {
        set("last_etag", Box::new(etag.clone()));
    }
    if let Some(timestamp) = changes.timestamp {
        set("timestamp", Box::new(timestamp));
    }
    if let Some(max_age) = changes.max_age {
        set("max_age", Box::new(max_age));
    }
    if let Some(version) = changes.version {
        set("version", Box::new(version));
    }
    if let Some(format) = changes.format {
        set("format", Box::new(format.as_str()));
    }
    if let Some(last_updated) = changes.last_updated {
        set("last_updated", Box::new(last_updated));
    }

    if columns.is_empty() {
        return Ok(());
    }
    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE repos SET {assignments} WHERE id = ?{}",
        columns.len() + 1
    );
    values.push(Box::new(id.0));
    tx.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
    Ok(())
}

impl CatalogStore for CatalogDb {
    fn commit(
        &mut self,
        commit: RepoCommit,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<(), StoreError> {
        self.apply_commit(&commit, progress).map_err(StoreError::new)
    }
}
