use anyhow::{Context, Result};
use async_trait::async_trait;
use sheets::{SheetBackend, SheetError, SheetRange};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;

use shared::domain::DealId;

pub mod deals;
pub mod readers;

pub use deals::{DealStore, DealUpdate, PIPELINE_HEADER};
pub use readers::{FirmStore, MeetingStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("sheet \"{0}\" not found")]
    Schema(String),
    #[error("write rejected: {0}")]
    Write(String),
    #[error("deal {0} not found")]
    NotFound(DealId),
    #[error("deal {id} changed concurrently (expected revision {expected}, found {actual})")]
    Conflict {
        id: DealId,
        expected: u64,
        actual: u64,
    },
    #[error("invalid deal: {0}")]
    Validation(String),
}

impl StoreError {
    pub(crate) fn from_sheet(sheet: &str, err: SheetError) -> Self {
        match err {
            SheetError::PermissionDenied(message) => StoreError::PermissionDenied(message),
            SheetError::RangeNotFound(_) => StoreError::Schema(sheet.to_string()),
            SheetError::Rejected(message) => StoreError::Write(message),
            SheetError::Unavailable(message)
            | SheetError::Auth(message)
            | SheetError::Decode(message) => StoreError::Unavailable(message),
        }
    }
}

/// A spreadsheet emulated in SQLite, one JSON array of cells per row.
#[derive(Clone)]
pub struct SqliteSheet {
    pool: Pool<Sqlite>,
}

impl SqliteSheet {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Creates `name` if it does not exist and writes `header` into row 1.
    pub async fn ensure_sheet(&self, name: &str, header: &[&str]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO sheets (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to create sheet '{name}'"))?;
        if !header.is_empty() {
            let cells: Vec<String> = header.iter().map(|h| (*h).to_string()).collect();
            store_row(&mut tx, name, 1, &cells).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn sheet_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM sheets ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
    }

    async fn read_rows_inner(&self, range: &SheetRange) -> Result<Option<Vec<Vec<String>>>> {
        let mut tx = self.pool.begin().await?;
        if !sheet_exists(&mut tx, &range.sheet).await? {
            return Ok(None);
        }

        let stored = sqlx::query(
            "SELECT row_number, cells FROM sheet_rows
             WHERE sheet = ? AND row_number >= ?
             ORDER BY row_number",
        )
        .bind(&range.sheet)
        .bind(i64::from(range.first_row))
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut rows: Vec<Vec<String>> = Vec::new();
        for row in stored {
            let number = u32::try_from(row.get::<i64, _>("row_number"))?;
            let cells: Vec<String> = serde_json::from_str(&row.get::<String, _>("cells"))
                .context("corrupt cells column")?;
            let visible = visible_cells(range, &cells);
            if visible.is_empty() {
                continue;
            }
            let index = (number - range.first_row) as usize;
            if rows.len() <= index {
                rows.resize(index + 1, Vec::new());
            }
            rows[index] = visible;
        }
        Ok(Some(rows))
    }

    async fn write_cells(
        &self,
        range: &SheetRange,
        row: Option<u32>,
        cells: &[String],
    ) -> Result<Option<u32>> {
        let mut tx = self.pool.begin().await?;
        if !sheet_exists(&mut tx, &range.sheet).await? {
            return Ok(None);
        }

        let row = match row {
            Some(row) => row,
            None => next_free_row(&mut tx, range).await?,
        };
        let mut stored = load_row(&mut tx, &range.sheet, row).await?;
        let start = column_index(range.first_column);
        let width = range.width();
        if stored.len() < start + width {
            stored.resize(start + width, String::new());
        }
        for offset in 0..width {
            stored[start + offset] = cells.get(offset).cloned().unwrap_or_default();
        }
        while stored.last().is_some_and(String::is_empty) {
            stored.pop();
        }

        store_row(&mut tx, &range.sheet, row, &stored).await?;
        tx.commit().await?;
        debug!(sheet = %range.sheet, row, "local sheet: row stored");
        Ok(Some(row))
    }
}

fn column_index(column: char) -> usize {
    (column as usize).saturating_sub('A' as usize)
}

fn visible_cells(range: &SheetRange, cells: &[String]) -> Vec<String> {
    let start = column_index(range.first_column);
    let mut visible: Vec<String> = cells.iter().skip(start).take(range.width()).cloned().collect();
    while visible.last().is_some_and(|c| c.is_empty()) {
        visible.pop();
    }
    visible
}

async fn sheet_exists(tx: &mut Transaction<'_, Sqlite>, name: &str) -> Result<bool> {
    let row = sqlx::query("SELECT 1 FROM sheets WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.is_some())
}

async fn load_row(tx: &mut Transaction<'_, Sqlite>, sheet: &str, row: u32) -> Result<Vec<String>> {
    let stored = sqlx::query("SELECT cells FROM sheet_rows WHERE sheet = ? AND row_number = ?")
        .bind(sheet)
        .bind(i64::from(row))
        .fetch_optional(&mut **tx)
        .await?;
    match stored {
        Some(r) => Ok(serde_json::from_str(&r.get::<String, _>(0)).context("corrupt cells column")?),
        None => Ok(Vec::new()),
    }
}

async fn store_row(
    tx: &mut Transaction<'_, Sqlite>,
    sheet: &str,
    row: u32,
    cells: &[String],
) -> Result<()> {
    sqlx::query(
        "INSERT INTO sheet_rows (sheet, row_number, cells) VALUES (?, ?, ?)
         ON CONFLICT(sheet, row_number)
         DO UPDATE SET cells = excluded.cells, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(sheet)
    .bind(i64::from(row))
    .bind(serde_json::to_string(cells)?)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("failed to store row {row} of sheet '{sheet}'"))?;
    Ok(())
}

/// First row after the last one holding any non-blank cell inside `range`.
async fn next_free_row(tx: &mut Transaction<'_, Sqlite>, range: &SheetRange) -> Result<u32> {
    let stored = sqlx::query(
        "SELECT row_number, cells FROM sheet_rows
         WHERE sheet = ? AND row_number >= ?
         ORDER BY row_number DESC",
    )
    .bind(&range.sheet)
    .bind(i64::from(range.first_row))
    .fetch_all(&mut **tx)
    .await?;

    for row in stored {
        let cells: Vec<String> =
            serde_json::from_str(&row.get::<String, _>("cells")).context("corrupt cells column")?;
        if !visible_cells(range, &cells).is_empty() {
            return Ok(u32::try_from(row.get::<i64, _>("row_number"))? + 1);
        }
    }
    Ok(range.first_row)
}

fn missing_sheet(range: &SheetRange) -> SheetError {
    SheetError::RangeNotFound(format!("Unable to parse range: {}", range.a1()))
}

fn local_failure(err: anyhow::Error) -> SheetError {
    SheetError::Unavailable(format!("{err:#}"))
}

#[async_trait]
impl SheetBackend for SqliteSheet {
    async fn read_rows(&self, range: &SheetRange) -> Result<Vec<Vec<String>>, SheetError> {
        self.read_rows_inner(range)
            .await
            .map_err(local_failure)?
            .ok_or_else(|| missing_sheet(range))
    }

    async fn write_row(
        &self,
        range: &SheetRange,
        row: u32,
        cells: &[String],
    ) -> Result<(), SheetError> {
        if row < range.first_row {
            return Err(SheetError::Rejected(format!(
                "row {row} is above the data range {}",
                range.a1()
            )));
        }
        self.write_cells(range, Some(row), cells)
            .await
            .map_err(local_failure)?
            .map(|_| ())
            .ok_or_else(|| missing_sheet(range))
    }

    async fn append_row(&self, range: &SheetRange, cells: &[String]) -> Result<u32, SheetError> {
        self.write_cells(range, None, cells)
            .await
            .map_err(local_failure)?
            .ok_or_else(|| missing_sheet(range))
    }

    async fn clear_row(&self, range: &SheetRange, row: u32) -> Result<(), SheetError> {
        self.write_row(range, row, &[]).await
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
