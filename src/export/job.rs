use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use tokio::task::JoinError;

use crate::error::{HermesError, Result};
use crate::store::EntryReader;

use super::sink::CsvSink;
use super::tables::{
    location_accelerometer_row, location_row, motion_activity_row, write_table, Table,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedTable {
    pub table: Table,
    pub path: PathBuf,
    pub rows: usize,
}

/// Outcome of one export. The location side writes both location tables
/// from a single fetch; the two sides succeed or fail independently.
#[derive(Debug)]
pub struct ExportReport {
    pub location: Result<Vec<ExportedTable>>,
    pub motion_activity: Result<ExportedTable>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.location.is_ok() && self.motion_activity.is_ok()
    }

    /// Every file that was written.
    pub fn files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = Vec::new();
        if let Ok(tables) = &self.location {
            files.extend(tables.iter().map(|table| table.path.as_path()));
        }
        if let Ok(table) = &self.motion_activity {
            files.push(table.path.as_path());
        }
        files
    }
}

/// Exports one session's tables into `directory`.
///
/// The location and motion activity sides run as separate tasks and are
/// joined; a failure on one side never affects the other.
pub async fn export_session<R: EntryReader>(
    reader: Arc<R>,
    session_name: &str,
    directory: &Path,
) -> ExportReport {
    log_info!("exporting session {session_name:?} to {}", directory.display());

    let location_task = tokio::spawn(export_locations(
        Arc::clone(&reader),
        session_name.to_string(),
        directory.to_path_buf(),
    ));
    let motion_task = tokio::spawn(export_motion_activities(
        reader,
        session_name.to_string(),
        directory.to_path_buf(),
    ));

    let (location, motion_activity) = tokio::join!(location_task, motion_task);
    let report = ExportReport {
        location: joined("location", location),
        motion_activity: joined("motion activity", motion_activity),
    };

    if let Err(err) = &report.location {
        log_warn!("location export of {session_name:?} failed: {err}");
    }
    if let Err(err) = &report.motion_activity {
        log_warn!("motion activity export of {session_name:?} failed: {err}");
    }
    report
}

fn joined<T>(side: &str, result: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    match result {
        Ok(result) => result,
        Err(err) => Err(HermesError::ExportFailed(format!(
            "{side} export task failed: {err}"
        ))),
    }
}

async fn export_locations<R: EntryReader>(
    reader: Arc<R>,
    session_name: String,
    directory: PathBuf,
) -> Result<Vec<ExportedTable>> {
    let entries = reader.location_entries(&session_name).await?;

    tokio::task::spawn_blocking(move || {
        let location = write_csv(&directory, &session_name, Table::Location, &entries, location_row)?;
        let paired = write_csv(
            &directory,
            &session_name,
            Table::LocationAccelerometer,
            &entries,
            location_accelerometer_row,
        )?;
        Ok(vec![location, paired])
    })
    .await
    .map_err(|err| HermesError::ExportFailed(format!("location writer failed: {err}")))?
}

async fn export_motion_activities<R: EntryReader>(
    reader: Arc<R>,
    session_name: String,
    directory: PathBuf,
) -> Result<ExportedTable> {
    let entries = reader.motion_activity_entries(&session_name).await?;

    tokio::task::spawn_blocking(move || {
        write_csv(
            &directory,
            &session_name,
            Table::MotionActivity,
            &entries,
            motion_activity_row,
        )
    })
    .await
    .map_err(|err| HermesError::ExportFailed(format!("motion activity writer failed: {err}")))?
}

fn write_csv<T>(
    directory: &Path,
    session_name: &str,
    table: Table,
    items: &[T],
    row: fn(&T) -> Vec<String>,
) -> Result<ExportedTable> {
    let written = std::fs::create_dir_all(directory)
        .with_context(|| format!("failed to create {}", directory.display()))
        .and_then(|_| {
            let path = directory.join(table.file_name(session_name));
            let mut sink = CsvSink::create(&path)?;
            let rows = write_table(&mut sink, table, items, row)?;
            Ok(ExportedTable { table, path, rows })
        });
    written.map_err(|err| HermesError::ExportFailed(format!("{err:#}")))
}
