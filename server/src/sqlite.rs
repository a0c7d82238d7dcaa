use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use kernel::{
    CopySource, CopyState, CopyStatus, CreateFileRequest, CreateShareRequest, DirectoryProperties,
    FileHeaders, FileProperties, FileRange, ItemKind, ListItem, ListPage, MAX_RANGE_SIZE,
    MAX_SHARE_QUOTA_GB, Metadata, ServiceProperties, ShareItem, ShareProperties, ShareStats,
};
use rusqlite::blob::ZeroBlob;
use rusqlite::{
    Connection, DatabaseName, OpenFlags, OptionalExtension, Transaction, TransactionBehavior,
    params,
};
use uuid::Uuid;

use crate::domain::{NodeRef, Result, ShareRef, Storage, StorageError};
use crate::ranges::RangeSet;
use crate::validation;

const CACHE_SIZE: &str = "4096";
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
const ZERO_CHUNK: usize = 64 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

/// Largest declared file length the emulator accepts, SQLite's default
/// `SQLITE_MAX_LENGTH` for a single blob.
pub const MAX_FILE_LENGTH: u64 = 1_000_000_000;

pub enum Mode {
    ReadWrite,
    ReadOnly,
}

pub struct Sqlite {
    conn: Connection,
}

struct ShareRow {
    id: i64,
    quota: u32,
    metadata: String,
    etag: String,
    last_modified: DateTime<Utc>,
}

impl ShareRow {
    fn properties(self) -> Result<ShareProperties> {
        Ok(ShareProperties {
            quota: self.quota,
            last_modified: self.last_modified,
            etag: self.etag,
            metadata: serde_json::from_str(&self.metadata)?,
        })
    }
}

struct DirectoryRow {
    id: i64,
    path: String,
    metadata: String,
    etag: String,
    last_modified: DateTime<Utc>,
}

impl DirectoryRow {
    fn properties(self) -> Result<DirectoryProperties> {
        Ok(DirectoryProperties {
            path: self.path,
            last_modified: self.last_modified,
            etag: self.etag,
            metadata: serde_json::from_str(&self.metadata)?,
        })
    }
}

struct FileRow {
    id: i64,
    path: String,
    length: u64,
    headers: String,
    metadata: String,
    etag: String,
    last_modified: DateTime<Utc>,
    copy: Option<String>,
}

impl FileRow {
    fn copy_state(&self) -> Result<Option<CopyState>> {
        match &self.copy {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn properties(self) -> Result<FileProperties> {
        let copy = self.copy_state()?;
        Ok(FileProperties {
            path: self.path,
            length: self.length,
            headers: serde_json::from_str(&self.headers)?,
            last_modified: self.last_modified,
            etag: self.etag,
            metadata: serde_json::from_str(&self.metadata)?,
            copy,
        })
    }
}

impl Storage for Sqlite {
    fn new_database(&self) -> Result<()> {
        self.pragma_update("encoding", "UTF-8")?;
        self.enable_write_ahead_log()?;

        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS service (
                  account        TEXT PRIMARY KEY,
                  properties     TEXT NOT NULL
                  );
             CREATE TABLE IF NOT EXISTS share (
                  id             INTEGER PRIMARY KEY AUTOINCREMENT,
                  account        TEXT NOT NULL,
                  name           TEXT NOT NULL,
                  quota          INTEGER NOT NULL,
                  metadata       TEXT NOT NULL,
                  etag           TEXT NOT NULL,
                  last_modified  TEXT NOT NULL,
                  UNIQUE (account, name)
                  );
             CREATE TABLE IF NOT EXISTS directory (
                  id             INTEGER PRIMARY KEY AUTOINCREMENT,
                  share_id       INTEGER NOT NULL REFERENCES share(id) ON DELETE CASCADE,
                  path           TEXT NOT NULL,
                  parent         TEXT NOT NULL,
                  name           TEXT NOT NULL,
                  metadata       TEXT NOT NULL,
                  etag           TEXT NOT NULL,
                  last_modified  TEXT NOT NULL,
                  UNIQUE (share_id, path)
                  );
             CREATE INDEX IF NOT EXISTS directory_parent_ix ON directory(share_id, parent, name);
             CREATE TABLE IF NOT EXISTS file (
                  id             INTEGER PRIMARY KEY AUTOINCREMENT,
                  share_id       INTEGER NOT NULL REFERENCES share(id) ON DELETE CASCADE,
                  path           TEXT NOT NULL,
                  parent         TEXT NOT NULL,
                  name           TEXT NOT NULL,
                  length         INTEGER NOT NULL,
                  headers        TEXT NOT NULL,
                  metadata       TEXT NOT NULL,
                  etag           TEXT NOT NULL,
                  last_modified  TEXT NOT NULL,
                  content        BLOB NOT NULL,
                  copy           TEXT,
                  UNIQUE (share_id, path)
                  );
             CREATE INDEX IF NOT EXISTS file_parent_ix ON file(share_id, parent, name);
             CREATE TABLE IF NOT EXISTS file_range (
                  file_id        INTEGER NOT NULL REFERENCES file(id) ON DELETE CASCADE,
                  start          INTEGER NOT NULL,
                  end            INTEGER NOT NULL,
                  PRIMARY KEY (file_id, start)
                  );",
        )?;

        Ok(())
    }

    fn get_service_properties(&mut self, account: &str) -> Result<ServiceProperties> {
        let json: Option<String> = self
            .conn
            .prepare_cached("SELECT properties FROM service WHERE account = ?1")?
            .query_row(params![account], |row| row.get(0))
            .optional()?;
        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(ServiceProperties::default()),
        }
    }

    fn set_service_properties(
        &mut self,
        account: &str,
        properties: &ServiceProperties,
    ) -> Result<()> {
        validation::service_properties(properties)?;
        let json = serde_json::to_string(properties)?;
        self.conn
            .prepare_cached(
                "INSERT INTO service (account, properties) VALUES (?1, ?2)
                 ON CONFLICT(account) DO UPDATE SET properties = excluded.properties",
            )?
            .execute(params![account, json])?;
        Ok(())
    }

    fn list_shares(&mut self, account: &str) -> Result<Vec<ShareItem>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT name, quota, etag, last_modified FROM share WHERE account = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![account], |row| {
            Ok(ShareItem {
                name: row.get(0)?,
                quota: row.get(1)?,
                etag: row.get(2)?,
                last_modified: row.get(3)?,
            })
        })?;
        let mut shares = Vec::new();
        for share in rows {
            shares.push(share?);
        }
        Ok(shares)
    }

    fn create_share(
        &mut self,
        share: &ShareRef,
        request: &CreateShareRequest,
    ) -> Result<ShareProperties> {
        validation::share_name(&share.name)?;
        let quota = request.quota.unwrap_or(MAX_SHARE_QUOTA_GB);
        validation::quota(quota)?;
        validation::metadata(&request.metadata)?;

        let tx = self.write_transaction()?;
        if find_share(&tx, share)?.is_some() {
            return Err(StorageError::ShareAlreadyExists(share.name.clone()));
        }

        let now = Utc::now();
        let metadata = serde_json::to_string(&request.metadata)?;
        tx.prepare_cached(
            "INSERT INTO share (account, name, quota, metadata, etag, last_modified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(params![share.account, share.name, quota, metadata, new_etag(), now])?;
        let share_id = tx.last_insert_rowid();

        tx.prepare_cached(
            "INSERT INTO directory (share_id, path, parent, name, metadata, etag, last_modified)
                 VALUES (?1, '', '', '', '{}', ?2, ?3)",
        )?
        .execute(params![share_id, new_etag(), now])?;

        let properties = share_row(&tx, share)?.properties()?;
        tx.commit()?;
        Ok(properties)
    }

    fn get_share(&mut self, share: &ShareRef) -> Result<ShareProperties> {
        share_row(&self.conn, share)?.properties()
    }

    fn set_share_quota(
        &mut self,
        share: &ShareRef,
        quota: u32,
        if_match: Option<&str>,
    ) -> Result<ShareProperties> {
        validation::quota(quota)?;
        let tx = self.write_transaction()?;
        let row = share_row(&tx, share)?;
        check_condition(if_match, &row.etag)?;
        tx.prepare_cached("UPDATE share SET quota = ?1, etag = ?2, last_modified = ?3 WHERE id = ?4")?
            .execute(params![quota, new_etag(), Utc::now(), row.id])?;
        let properties = share_row(&tx, share)?.properties()?;
        tx.commit()?;
        Ok(properties)
    }

    fn set_share_metadata(
        &mut self,
        share: &ShareRef,
        metadata: &Metadata,
        if_match: Option<&str>,
    ) -> Result<ShareProperties> {
        validation::metadata(metadata)?;
        let json = serde_json::to_string(metadata)?;
        let tx = self.write_transaction()?;
        let row = share_row(&tx, share)?;
        check_condition(if_match, &row.etag)?;
        tx.prepare_cached(
            "UPDATE share SET metadata = ?1, etag = ?2, last_modified = ?3 WHERE id = ?4",
        )?
        .execute(params![json, new_etag(), Utc::now(), row.id])?;
        let properties = share_row(&tx, share)?.properties()?;
        tx.commit()?;
        Ok(properties)
    }

    fn get_share_stats(&mut self, share: &ShareRef) -> Result<ShareStats> {
        let row = share_row(&self.conn, share)?;
        let stats = self
            .conn
            .prepare_cached(
                "SELECT COALESCE(SUM(length), 0), COUNT(id) FROM file WHERE share_id = ?1",
            )?
            .query_row(params![row.id], |row| {
                Ok(ShareStats {
                    usage_bytes: row.get(0)?,
                    file_count: row.get(1)?,
                })
            })?;
        Ok(stats)
    }

    fn delete_share(&mut self, share: &ShareRef) -> Result<()> {
        let tx = self.write_transaction()?;
        let row = share_row(&tx, share)?;
        tx.prepare_cached("DELETE FROM share WHERE id = ?1")?
            .execute(params![row.id])?;
        tx.commit()?;
        Ok(())
    }

    fn create_directory(
        &mut self,
        node: &NodeRef,
        metadata: &Metadata,
    ) -> Result<DirectoryProperties> {
        validation::metadata(metadata)?;
        let json = serde_json::to_string(metadata)?;
        let tx = self.write_transaction()?;
        let share = share_row(&tx, &node.share)?;
        ensure_vacant(&tx, share.id, node)?;
        tx.prepare_cached(
            "INSERT INTO directory (share_id, path, parent, name, metadata, etag, last_modified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?
        .execute(params![
            share.id,
            node.path(),
            node.parent(),
            node.name(),
            json,
            new_etag(),
            Utc::now()
        ])?;
        let properties = directory_row(&tx, share.id, node)?.properties()?;
        tx.commit()?;
        Ok(properties)
    }

    fn get_directory(&mut self, node: &NodeRef) -> Result<DirectoryProperties> {
        let share = share_row(&self.conn, &node.share)?;
        directory_row(&self.conn, share.id, node)?.properties()
    }

    fn set_directory_metadata(
        &mut self,
        node: &NodeRef,
        metadata: &Metadata,
        if_match: Option<&str>,
    ) -> Result<DirectoryProperties> {
        validation::metadata(metadata)?;
        let json = serde_json::to_string(metadata)?;
        let tx = self.write_transaction()?;
        let share = share_row(&tx, &node.share)?;
        let row = directory_row(&tx, share.id, node)?;
        check_condition(if_match, &row.etag)?;
        tx.prepare_cached(
            "UPDATE directory SET metadata = ?1, etag = ?2, last_modified = ?3 WHERE id = ?4",
        )?
        .execute(params![json, new_etag(), Utc::now(), row.id])?;
        let properties = directory_row(&tx, share.id, node)?.properties()?;
        tx.commit()?;
        Ok(properties)
    }

    fn delete_directory(&mut self, node: &NodeRef) -> Result<()> {
        if node.is_root() {
            return Err(StorageError::InvalidInput(
                "the root directory of a share cannot be deleted".to_owned(),
            ));
        }
        let tx = self.write_transaction()?;
        let share = share_row(&tx, &node.share)?;
        let row = directory_row(&tx, share.id, node)?;
        let has_children = tx
            .prepare_cached(
                "SELECT 1 FROM directory WHERE share_id = ?1 AND parent = ?2
                 UNION ALL
                 SELECT 1 FROM file WHERE share_id = ?1 AND parent = ?2",
            )?
            .exists(params![share.id, node.path()])?;
        if has_children {
            return Err(StorageError::DirectoryNotEmpty(node.to_string()));
        }
        tx.prepare_cached("DELETE FROM directory WHERE id = ?1")?
            .execute(params![row.id])?;
        tx.commit()?;
        Ok(())
    }

    fn list_directory(
        &mut self,
        node: &NodeRef,
        marker: Option<&str>,
        max_results: u32,
    ) -> Result<ListPage> {
        let share = share_row(&self.conn, &node.share)?;
        directory_row(&self.conn, share.id, node)?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT name, 0, NULL FROM directory
                 WHERE share_id = ?1 AND parent = ?2 AND path <> '' AND name > ?3
             UNION ALL
             SELECT name, 1, length FROM file
                 WHERE share_id = ?1 AND parent = ?2 AND name > ?3
             ORDER BY 1
             LIMIT ?4",
        )?;
        let limit = i64::from(max_results) + 1;
        let rows = stmt.query_map(
            params![share.id, node.path(), marker.unwrap_or_default(), limit],
            |row| {
                let is_file: bool = row.get(1)?;
                Ok(ListItem {
                    name: row.get(0)?,
                    kind: if is_file {
                        ItemKind::File
                    } else {
                        ItemKind::Directory
                    },
                    length: row.get(2)?,
                })
            },
        )?;
        let mut items = Vec::new();
        for item in rows {
            items.push(item?);
        }

        let max = usize::try_from(max_results).unwrap_or(usize::MAX);
        let next_marker = if items.len() > max {
            items.truncate(max);
            items.last().map(|item| item.name.clone())
        } else {
            None
        };
        Ok(ListPage { items, next_marker })
    }

    fn create_file(&mut self, node: &NodeRef, request: &CreateFileRequest) -> Result<FileProperties> {
        if node.is_root() {
            return Err(StorageError::InvalidInput(
                "a file needs a name inside the share".to_owned(),
            ));
        }
        ensure_file_length(request.length)?;
        validation::metadata(&request.metadata)?;

        let tx = self.write_transaction()?;
        let share = share_row(&tx, &node.share)?;
        if let Some(existing) = file_row(&tx, share.id, node)? {
            if let Some(copy) = existing.copy_state()? {
                if copy.status == CopyStatus::Pending {
                    return Err(StorageError::PendingCopy(copy.id));
                }
            }
            delete_file_row(&tx, existing.id)?;
        }
        ensure_vacant(&tx, share.id, node)?;
        ensure_quota(&tx, &share, request.length)?;
        insert_file(
            &tx,
            share.id,
            node,
            request.length,
            &request.headers,
            &request.metadata,
            None,
        )?;
        let properties = file_row_required(&tx, share.id, node)?.properties()?;
        tx.commit()?;
        Ok(properties)
    }

    fn get_file(&mut self, node: &NodeRef) -> Result<FileProperties> {
        let share = share_row(&self.conn, &node.share)?;
        file_row_required(&self.conn, share.id, node)?.properties()
    }

    fn set_file_headers(
        &mut self,
        node: &NodeRef,
        headers: &FileHeaders,
        if_match: Option<&str>,
    ) -> Result<FileProperties> {
        let json = serde_json::to_string(headers)?;
        let tx = self.write_transaction()?;
        let share = share_row(&tx, &node.share)?;
        let row = file_row_required(&tx, share.id, node)?;
        check_condition(if_match, &row.etag)?;
        tx.prepare_cached("UPDATE file SET headers = ?1, etag = ?2, last_modified = ?3 WHERE id = ?4")?
            .execute(params![json, new_etag(), Utc::now(), row.id])?;
        let properties = file_row_required(&tx, share.id, node)?.properties()?;
        tx.commit()?;
        Ok(properties)
    }

    fn set_file_metadata(
        &mut self,
        node: &NodeRef,
        metadata: &Metadata,
        if_match: Option<&str>,
    ) -> Result<FileProperties> {
        validation::metadata(metadata)?;
        let json = serde_json::to_string(metadata)?;
        let tx = self.write_transaction()?;
        let share = share_row(&tx, &node.share)?;
        let row = file_row_required(&tx, share.id, node)?;
        check_condition(if_match, &row.etag)?;
        tx.prepare_cached(
            "UPDATE file SET metadata = ?1, etag = ?2, last_modified = ?3 WHERE id = ?4",
        )?
        .execute(params![json, new_etag(), Utc::now(), row.id])?;
        let properties = file_row_required(&tx, share.id, node)?.properties()?;
        tx.commit()?;
        Ok(properties)
    }

    fn delete_file(&mut self, node: &NodeRef) -> Result<()> {
        let tx = self.write_transaction()?;
        let share = share_row(&tx, &node.share)?;
        let row = file_row_required(&tx, share.id, node)?;
        delete_file_row(&tx, row.id)?;
        tx.commit()?;
        Ok(())
    }

    fn write_range(&mut self, node: &NodeRef, offset: u64, data: &[u8]) -> Result<FileProperties> {
        let length = data.len() as u64;
        if length == 0 {
            return Err(StorageError::InvalidInput("range body is empty".to_owned()));
        }
        if length > MAX_RANGE_SIZE {
            return Err(StorageError::BodyTooLarge(length));
        }

        let tx = self.write_transaction()?;
        let share = share_row(&tx, &node.share)?;
        let row = file_row_required(&tx, share.id, node)?;
        let end = range_end(offset, length, row.length)?;

        {
            let mut blob = tx.blob_open(DatabaseName::Main, "file", "content", row.id, false)?;
            blob.seek(SeekFrom::Start(offset))?;
            blob.write_all(data)?;
            blob.flush()?;
            blob.close()?;
        }

        let mut ranges = load_ranges(&tx, row.id)?;
        ranges.insert(offset, end);
        save_ranges(&tx, row.id, &ranges)?;
        touch_file(&tx, row.id)?;

        let properties = file_row_required(&tx, share.id, node)?.properties()?;
        tx.commit()?;
        Ok(properties)
    }

    fn clear_range(&mut self, node: &NodeRef, offset: u64, length: u64) -> Result<FileProperties> {
        let tx = self.write_transaction()?;
        let share = share_row(&tx, &node.share)?;
        let row = file_row_required(&tx, share.id, node)?;
        let end = range_end(offset, length, row.length)?;

        {
            let mut blob = tx.blob_open(DatabaseName::Main, "file", "content", row.id, false)?;
            blob.seek(SeekFrom::Start(offset))?;
            let zeros = vec![0u8; ZERO_CHUNK];
            let mut remaining = length;
            while remaining > 0 {
                let chunk = usize::try_from(remaining).map_or(ZERO_CHUNK, |r| r.min(ZERO_CHUNK));
                blob.write_all(&zeros[..chunk])?;
                remaining -= chunk as u64;
            }
            blob.flush()?;
            blob.close()?;
        }

        let mut ranges = load_ranges(&tx, row.id)?;
        ranges.remove(offset, end);
        save_ranges(&tx, row.id, &ranges)?;
        touch_file(&tx, row.id)?;

        let properties = file_row_required(&tx, share.id, node)?.properties()?;
        tx.commit()?;
        Ok(properties)
    }

    fn list_ranges(&mut self, node: &NodeRef) -> Result<Vec<FileRange>> {
        let share = share_row(&self.conn, &node.share)?;
        let row = file_row_required(&self.conn, share.id, node)?;
        Ok(load_ranges(&self.conn, row.id)?.to_ranges())
    }

    fn read_range(
        &mut self,
        node: &NodeRef,
        offset: u64,
        length: Option<u64>,
    ) -> Result<(FileProperties, Vec<u8>)> {
        let share = share_row(&self.conn, &node.share)?;
        let row = file_row_required(&self.conn, share.id, node)?;
        let length = match length {
            Some(length) => length,
            None => row.length.checked_sub(offset).ok_or(StorageError::InvalidRange {
                offset,
                length: 0,
                file_length: row.length,
            })?,
        };
        range_end(offset, length, row.length)?;

        let mut data = vec![0u8; to_usize(length)?];
        if length > 0 {
            let mut blob = self
                .conn
                .blob_open(DatabaseName::Main, "file", "content", row.id, true)?;
            blob.seek(SeekFrom::Start(offset))?;
            blob.read_exact(&mut data)?;
            blob.close()?;
        }
        Ok((row.properties()?, data))
    }

    fn begin_copy(
        &mut self,
        node: &NodeRef,
        source: &CopySource,
        copy_id: &str,
    ) -> Result<CopyState> {
        let source_node = NodeRef::new(
            ShareRef::new(node.share.account.clone(), source.share.clone()),
            &source.path,
        )?;
        if source_node == *node {
            return Err(StorageError::InvalidInput(
                "a file cannot be copied onto itself".to_owned(),
            ));
        }
        if node.is_root() {
            return Err(StorageError::InvalidInput(
                "a copy destination needs a name inside the share".to_owned(),
            ));
        }

        let tx = self.write_transaction()?;
        let source_share = share_row(&tx, &source_node.share)?;
        let source_row = file_row_required(&tx, source_share.id, &source_node)?;
        let share = share_row(&tx, &node.share)?;

        if let Some(existing) = file_row(&tx, share.id, node)? {
            if let Some(copy) = existing.copy_state()? {
                if copy.status == CopyStatus::Pending {
                    return Err(StorageError::PendingCopy(copy.id));
                }
            }
            delete_file_row(&tx, existing.id)?;
        }
        ensure_vacant(&tx, share.id, node)?;
        ensure_quota(&tx, &share, source_row.length)?;

        let state = CopyState {
            id: copy_id.to_owned(),
            source: CopySource {
                share: source_node.share.name.clone(),
                path: source_node.path().to_owned(),
            },
            status: CopyStatus::Pending,
            progress: Some(format!("0/{}", source_row.length)),
            completion_time: None,
            status_description: None,
        };
        insert_file(
            &tx,
            share.id,
            node,
            source_row.length,
            &FileHeaders::default(),
            &Metadata::new(),
            Some(&state),
        )?;
        tx.commit()?;
        Ok(state)
    }

    fn complete_copy(&mut self, node: &NodeRef, copy_id: &str) -> Result<CopyState> {
        let tx = self.write_transaction()?;
        let share = share_row(&tx, &node.share)?;
        let row = file_row_required(&tx, share.id, node)?;
        let mut state = pending_copy(&row, node)?;
        if state.id != copy_id {
            return Err(StorageError::CopyIdMismatch {
                given: copy_id.to_owned(),
                pending: state.id,
            });
        }

        let source_node = NodeRef::new(
            ShareRef::new(node.share.account.clone(), state.source.share.clone()),
            &state.source.path,
        )?;
        let source_row = match find_share(&tx, &source_node.share)? {
            Some(source_share) => file_row(&tx, source_share.id, &source_node)?,
            None => None,
        };

        let now = Utc::now();
        state.completion_time = Some(now);
        match source_row {
            None => {
                state.status = CopyStatus::Failed;
                state.status_description = Some(format!("source {source_node} no longer exists"));
            }
            Some(source) if source.length != row.length => {
                state.status = CopyStatus::Failed;
                state.status_description = Some(format!(
                    "source {source_node} changed length from {} to {}",
                    row.length, source.length
                ));
            }
            Some(source) => {
                let ranges = load_ranges(&tx, source.id)?;
                {
                    let mut from =
                        tx.blob_open(DatabaseName::Main, "file", "content", source.id, true)?;
                    let mut to = tx.blob_open(DatabaseName::Main, "file", "content", row.id, false)?;
                    let mut buffer = vec![0u8; to_usize(MAX_RANGE_SIZE)?];
                    for (start, end) in ranges.extents() {
                        from.seek(SeekFrom::Start(start))?;
                        to.seek(SeekFrom::Start(start))?;
                        let mut remaining = end - start;
                        while remaining > 0 {
                            let chunk = to_usize(remaining.min(MAX_RANGE_SIZE))?;
                            from.read_exact(&mut buffer[..chunk])?;
                            to.write_all(&buffer[..chunk])?;
                            remaining -= chunk as u64;
                        }
                    }
                    to.flush()?;
                    from.close()?;
                    to.close()?;
                }
                save_ranges(&tx, row.id, &ranges)?;
                tx.prepare_cached("UPDATE file SET headers = ?1, metadata = ?2 WHERE id = ?3")?
                    .execute(params![source.headers, source.metadata, row.id])?;
                state.status = CopyStatus::Success;
                state.progress = Some(format!("{0}/{0}", row.length));
            }
        }

        save_copy_state(&tx, row.id, &state, now)?;
        tx.commit()?;
        Ok(state)
    }

    fn abort_copy(&mut self, node: &NodeRef, copy_id: &str) -> Result<CopyState> {
        let tx = self.write_transaction()?;
        let share = share_row(&tx, &node.share)?;
        let row = file_row_required(&tx, share.id, node)?;
        let mut state = pending_copy(&row, node)?;
        if state.id != copy_id {
            return Err(StorageError::CopyIdMismatch {
                given: copy_id.to_owned(),
                pending: state.id,
            });
        }

        let now = Utc::now();
        state.status = CopyStatus::Aborted;
        state.completion_time = Some(now);
        state.status_description = Some("copy aborted by request".to_owned());
        save_copy_state(&tx, row.id, &state, now)?;
        tx.commit()?;
        Ok(state)
    }
}

impl Sqlite {
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self> {
        let conn = match mode {
            Mode::ReadWrite => Connection::open(path),
            Mode::ReadOnly => Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY),
        }?;
        Self::configure(conn)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let storage = Self { conn };
        storage.enable_foreign_keys()?;
        storage.assign_cache_size()?;
        Ok(storage)
    }

    /// Writers take the lock up front so the busy timeout applies to them.
    fn write_transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    // The mode is persistent, in-memory databases report "memory".
    fn enable_write_ahead_log(&self) -> Result<()> {
        let mode: String =
            self.conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("journal mode: {mode}");
        Ok(())
    }

    fn enable_foreign_keys(&self) -> Result<()> {
        self.pragma_update("foreign_keys", "ON")
    }

    fn assign_cache_size(&self) -> Result<()> {
        self.pragma_update("cache_size", CACHE_SIZE)
    }

    fn pragma_update(&self, name: &str, value: &str) -> Result<()> {
        self.conn.pragma_update(None, name, value)?;
        Ok(())
    }
}

fn ensure_file_length(length: u64) -> Result<()> {
    if length > MAX_FILE_LENGTH {
        return Err(StorageError::InvalidInput(format!(
            "file length {length} exceeds the emulator limit of {MAX_FILE_LENGTH} bytes"
        )));
    }
    Ok(())
}

fn new_etag() -> String {
    format!(
        "\"0x{}\"",
        Uuid::new_v4().simple().to_string().to_uppercase()
    )
}

fn check_condition(if_match: Option<&str>, etag: &str) -> Result<()> {
    match if_match {
        None | Some("*") => Ok(()),
        Some(expected) if expected == etag => Ok(()),
        Some(expected) => Err(StorageError::ConditionNotMet {
            expected: expected.to_owned(),
            actual: etag.to_owned(),
        }),
    }
}

/// Validates `[offset, offset + length)` against the declared file length
/// and returns the exclusive end.
fn range_end(offset: u64, length: u64, file_length: u64) -> Result<u64> {
    match offset.checked_add(length) {
        Some(end) if end <= file_length => Ok(end),
        _ => Err(StorageError::InvalidRange {
            offset,
            length,
            file_length,
        }),
    }
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| StorageError::InvalidInput(format!("{value} bytes do not fit in memory")))
}

fn find_share(conn: &Connection, share: &ShareRef) -> Result<Option<ShareRow>> {
    let row = conn
        .prepare_cached(
            "SELECT id, quota, metadata, etag, last_modified FROM share
             WHERE account = ?1 AND name = ?2",
        )?
        .query_row(params![share.account, share.name], |row| {
            Ok(ShareRow {
                id: row.get(0)?,
                quota: row.get(1)?,
                metadata: row.get(2)?,
                etag: row.get(3)?,
                last_modified: row.get(4)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn share_row(conn: &Connection, share: &ShareRef) -> Result<ShareRow> {
    find_share(conn, share)?.ok_or_else(|| StorageError::ShareNotFound(share.name.clone()))
}

fn directory_row(conn: &Connection, share_id: i64, node: &NodeRef) -> Result<DirectoryRow> {
    conn.prepare_cached(
        "SELECT id, path, metadata, etag, last_modified FROM directory
         WHERE share_id = ?1 AND path = ?2",
    )?
    .query_row(params![share_id, node.path()], |row| {
        Ok(DirectoryRow {
            id: row.get(0)?,
            path: row.get(1)?,
            metadata: row.get(2)?,
            etag: row.get(3)?,
            last_modified: row.get(4)?,
        })
    })
    .optional()?
    .ok_or_else(|| StorageError::NotFound(node.to_string()))
}

fn file_row(conn: &Connection, share_id: i64, node: &NodeRef) -> Result<Option<FileRow>> {
    let row = conn
        .prepare_cached(
            "SELECT id, path, length, headers, metadata, etag, last_modified, copy FROM file
             WHERE share_id = ?1 AND path = ?2",
        )?
        .query_row(params![share_id, node.path()], |row| {
            Ok(FileRow {
                id: row.get(0)?,
                path: row.get(1)?,
                length: row.get(2)?,
                headers: row.get(3)?,
                metadata: row.get(4)?,
                etag: row.get(5)?,
                last_modified: row.get(6)?,
                copy: row.get(7)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn file_row_required(conn: &Connection, share_id: i64, node: &NodeRef) -> Result<FileRow> {
    file_row(conn, share_id, node)?.ok_or_else(|| StorageError::NotFound(node.to_string()))
}

/// Fails unless the parent directory exists and neither a file nor a
/// directory already uses the node's path.
fn ensure_vacant(conn: &Connection, share_id: i64, node: &NodeRef) -> Result<()> {
    let taken = conn
        .prepare_cached(
            "SELECT 1 FROM directory WHERE share_id = ?1 AND path = ?2
             UNION ALL
             SELECT 1 FROM file WHERE share_id = ?1 AND path = ?2",
        )?
        .exists(params![share_id, node.path()])?;
    if taken {
        return Err(StorageError::AlreadyExists(node.to_string()));
    }
    let parent_exists = conn
        .prepare_cached("SELECT 1 FROM directory WHERE share_id = ?1 AND path = ?2")?
        .exists(params![share_id, node.parent()])?;
    if !parent_exists {
        return Err(StorageError::ParentNotFound(node.to_string()));
    }
    Ok(())
}

fn ensure_quota(conn: &Connection, share: &ShareRow, length: u64) -> Result<()> {
    let used: u64 = conn
        .prepare_cached("SELECT COALESCE(SUM(length), 0) FROM file WHERE share_id = ?1")?
        .query_row(params![share.id], |row| row.get(0))?;
    if used.saturating_add(length) > u64::from(share.quota) * GIB {
        return Err(StorageError::QuotaExceeded { quota: share.quota });
    }
    Ok(())
}

fn insert_file(
    conn: &Connection,
    share_id: i64,
    node: &NodeRef,
    length: u64,
    headers: &FileHeaders,
    metadata: &Metadata,
    copy: Option<&CopyState>,
) -> Result<i64> {
    let blob_len = i32::try_from(length)
        .map_err(|_| StorageError::InvalidInput(format!("file length {length} is too large")))?;
    let copy = copy.map(serde_json::to_string).transpose()?;
    conn.prepare_cached(
        "INSERT INTO file (share_id, path, parent, name, length, headers, metadata, etag,
                           last_modified, content, copy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?
    .execute(params![
        share_id,
        node.path(),
        node.parent(),
        node.name(),
        length,
        serde_json::to_string(headers)?,
        serde_json::to_string(metadata)?,
        new_etag(),
        Utc::now(),
        ZeroBlob(blob_len),
        copy
    ])?;
    Ok(conn.last_insert_rowid())
}

fn delete_file_row(conn: &Connection, file_id: i64) -> Result<()> {
    conn.prepare_cached("DELETE FROM file WHERE id = ?1")?
        .execute(params![file_id])?;
    Ok(())
}

fn touch_file(conn: &Connection, file_id: i64) -> Result<()> {
    conn.prepare_cached("UPDATE file SET etag = ?1, last_modified = ?2 WHERE id = ?3")?
        .execute(params![new_etag(), Utc::now(), file_id])?;
    Ok(())
}

fn pending_copy(row: &FileRow, node: &NodeRef) -> Result<CopyState> {
    match row.copy_state()? {
        Some(state) if state.status == CopyStatus::Pending => Ok(state),
        _ => Err(StorageError::NoPendingCopy(node.to_string())),
    }
}

fn save_copy_state(
    conn: &Connection,
    file_id: i64,
    state: &CopyState,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.prepare_cached("UPDATE file SET copy = ?1, etag = ?2, last_modified = ?3 WHERE id = ?4")?
        .execute(params![serde_json::to_string(state)?, new_etag(), now, file_id])?;
    Ok(())
}

fn load_ranges(conn: &Connection, file_id: i64) -> Result<RangeSet> {
    let mut stmt = conn.prepare_cached(
        "SELECT start, end FROM file_range WHERE file_id = ?1 ORDER BY start",
    )?;
    let rows = stmt.query_map(params![file_id], |row| {
        Ok(FileRange::new(row.get(0)?, row.get(1)?))
    })?;
    let mut ranges = Vec::new();
    for range in rows {
        ranges.push(range?);
    }
    Ok(RangeSet::from_ranges(ranges))
}

fn save_ranges(conn: &Connection, file_id: i64, ranges: &RangeSet) -> Result<()> {
    conn.prepare_cached("DELETE FROM file_range WHERE file_id = ?1")?
        .execute(params![file_id])?;
    let mut insert =
        conn.prepare_cached("INSERT INTO file_range (file_id, start, end) VALUES (?1, ?2, ?3)")?;
    for range in ranges.to_ranges() {
        insert.execute(params![file_id, range.start, range.end])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> Sqlite {
        let storage = Sqlite::open_in_memory().unwrap();
        storage.new_database().unwrap();
        storage
    }

    fn share() -> ShareRef {
        ShareRef::new("devstoreaccount1", "s1")
    }

    fn node(path: &str) -> NodeRef {
        NodeRef::new(share(), path).unwrap()
    }

    fn new_file(length: u64) -> CreateFileRequest {
        CreateFileRequest {
            length,
            ..CreateFileRequest::default()
        }
    }

    #[test]
    fn sparse_example_scenario() {
        // Arrange
        let mut storage = storage();
        storage.create_share(&share(), &CreateShareRequest::default()).unwrap();
        storage.create_directory(&node("d1"), &Metadata::new()).unwrap();
        let file = node("d1/f1");
        storage.create_file(&file, &new_file(8192)).unwrap();

        // Act
        storage.write_range(&file, 0, &[0xAA; 1024]).unwrap();
        storage.write_range(&file, 4096, &[0xBB; 1536]).unwrap();
        storage.clear_range(&file, 4608, 512).unwrap();

        // Assert
        let ranges = storage.list_ranges(&file).unwrap();
        assert_eq!(
            ranges,
            vec![
                FileRange::new(0, 1023),
                FileRange::new(4096, 4607),
                FileRange::new(5120, 5631)
            ]
        );
        let (_, data) = storage.read_range(&file, 0, None).unwrap();
        assert_eq!(data.len(), 8192);
        assert!(data[..1024].iter().all(|b| *b == 0xAA));
        assert!(data[1024..4096].iter().all(|b| *b == 0));
        assert!(data[4096..4608].iter().all(|b| *b == 0xBB));
        assert!(data[4608..5120].iter().all(|b| *b == 0));
        assert!(data[5120..5632].iter().all(|b| *b == 0xBB));
        assert!(data[5632..].iter().all(|b| *b == 0));
    }

    #[test]
    fn write_past_declared_length_fails() {
        // Arrange
        let mut storage = storage();
        storage.create_share(&share(), &CreateShareRequest::default()).unwrap();
        let file = node("f1");
        storage.create_file(&file, &new_file(100)).unwrap();

        // Act
        let result = storage.write_range(&file, 90, &[1; 11]);

        // Assert
        assert!(matches!(result, Err(StorageError::InvalidRange { .. })));
        assert!(storage.list_ranges(&file).unwrap().is_empty());
    }

    #[test]
    fn directory_with_children_is_not_deleted() {
        // Arrange
        let mut storage = storage();
        storage.create_share(&share(), &CreateShareRequest::default()).unwrap();
        storage.create_directory(&node("d1"), &Metadata::new()).unwrap();
        storage.create_file(&node("d1/f1"), &new_file(1)).unwrap();

        // Act
        let not_empty = storage.delete_directory(&node("d1"));
        storage.delete_file(&node("d1/f1")).unwrap();
        let emptied = storage.delete_directory(&node("d1"));

        // Assert
        assert!(matches!(not_empty, Err(StorageError::DirectoryNotEmpty(_))));
        assert!(emptied.is_ok());
    }

    #[test]
    fn file_and_directory_cannot_share_a_name() {
        // Arrange
        let mut storage = storage();
        storage.create_share(&share(), &CreateShareRequest::default()).unwrap();
        storage.create_directory(&node("x"), &Metadata::new()).unwrap();

        // Act
        let result = storage.create_file(&node("x"), &new_file(1));

        // Assert
        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
    }

    #[test]
    fn missing_parent_is_reported() {
        // Arrange
        let mut storage = storage();
        storage.create_share(&share(), &CreateShareRequest::default()).unwrap();

        // Act
        let result = storage.create_directory(&node("a/b"), &Metadata::new());

        // Assert
        assert!(matches!(result, Err(StorageError::ParentNotFound(_))));
    }

    #[test]
    fn listing_pages_by_name() {
        // Arrange
        let mut storage = storage();
        storage.create_share(&share(), &CreateShareRequest::default()).unwrap();
        storage.create_directory(&node("b"), &Metadata::new()).unwrap();
        storage.create_file(&node("a"), &new_file(3)).unwrap();
        storage.create_file(&node("c"), &new_file(5)).unwrap();

        // Act
        let first = storage.list_directory(&node(""), None, 2).unwrap();
        let second = storage
            .list_directory(&node(""), first.next_marker.as_deref(), 2)
            .unwrap();

        // Assert
        let names: Vec<_> = first.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(first.items[0].length, Some(3));
        assert_eq!(first.items[1].kind, ItemKind::Directory);
        assert_eq!(first.next_marker.as_deref(), Some("b"));
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].name, "c");
        assert_eq!(second.next_marker, None);
    }

    #[test]
    fn conditional_metadata_update() {
        // Arrange
        let mut storage = storage();
        let created = storage.create_share(&share(), &CreateShareRequest::default()).unwrap();
        let mut metadata = Metadata::new();
        metadata.insert("owner".to_owned(), "ops".to_owned());

        // Act
        let updated = storage
            .set_share_metadata(&share(), &metadata, Some(&created.etag))
            .unwrap();
        let stale = storage.set_share_metadata(&share(), &Metadata::new(), Some(&created.etag));

        // Assert
        assert_ne!(updated.etag, created.etag);
        assert!(matches!(stale, Err(StorageError::ConditionNotMet { .. })));
        assert_eq!(storage.get_share(&share()).unwrap().metadata, metadata);
    }

    #[test]
    fn quota_limits_declared_lengths() {
        // Arrange
        let mut storage = storage();
        let request = CreateShareRequest {
            quota: Some(1),
            ..CreateShareRequest::default()
        };
        storage.create_share(&share(), &request).unwrap();
        storage.create_file(&node("f1"), &new_file(10)).unwrap();
        let row = share_row(&storage.conn, &share()).unwrap();

        // Act
        let fits = ensure_quota(&storage.conn, &row, GIB - 10);
        let exceeds = ensure_quota(&storage.conn, &row, GIB - 9);

        // Assert
        assert!(fits.is_ok());
        assert!(matches!(exceeds, Err(StorageError::QuotaExceeded { quota: 1 })));
    }

    #[test]
    fn copy_transfers_content_and_settles_once() {
        // Arrange
        let mut storage = storage();
        storage.create_share(&share(), &CreateShareRequest::default()).unwrap();
        let source = node("src");
        let dest = node("dst");
        storage.create_file(&source, &new_file(64)).unwrap();
        storage.write_range(&source, 8, &[7; 8]).unwrap();
        let copy_source = CopySource {
            share: "s1".to_owned(),
            path: "src".to_owned(),
        };

        // Act
        let started = storage.begin_copy(&dest, &copy_source, "c1").unwrap();
        let finished = storage.complete_copy(&dest, "c1").unwrap();
        let late_abort = storage.abort_copy(&dest, "c1");

        // Assert
        assert_eq!(started.status, CopyStatus::Pending);
        assert_eq!(finished.status, CopyStatus::Success);
        assert!(matches!(late_abort, Err(StorageError::NoPendingCopy(_))));
        assert_eq!(storage.list_ranges(&dest).unwrap(), vec![FileRange::new(8, 15)]);
        let (properties, data) = storage.read_range(&dest, 8, Some(8)).unwrap();
        assert_eq!(data, vec![7; 8]);
        assert_eq!(properties.copy.unwrap().status, CopyStatus::Success);
    }

    #[test]
    fn aborted_copy_is_never_completed() {
        // Arrange
        let mut storage = storage();
        storage.create_share(&share(), &CreateShareRequest::default()).unwrap();
        storage.create_file(&node("src"), &new_file(4)).unwrap();
        let copy_source = CopySource {
            share: "s1".to_owned(),
            path: "src".to_owned(),
        };
        storage.begin_copy(&node("dst"), &copy_source, "c1").unwrap();

        // Act
        let mismatch = storage.abort_copy(&node("dst"), "other");
        let aborted = storage.abort_copy(&node("dst"), "c1").unwrap();
        let completed = storage.complete_copy(&node("dst"), "c1");

        // Assert
        assert!(matches!(mismatch, Err(StorageError::CopyIdMismatch { .. })));
        assert_eq!(aborted.status, CopyStatus::Aborted);
        assert!(matches!(completed, Err(StorageError::NoPendingCopy(_))));
    }

    #[test]
    fn copy_fails_when_source_vanishes() {
        // Arrange
        let mut storage = storage();
        storage.create_share(&share(), &CreateShareRequest::default()).unwrap();
        storage.create_file(&node("src"), &new_file(4)).unwrap();
        let copy_source = CopySource {
            share: "s1".to_owned(),
            path: "src".to_owned(),
        };
        storage.begin_copy(&node("dst"), &copy_source, "c1").unwrap();
        storage.delete_file(&node("src")).unwrap();

        // Act
        let state = storage.complete_copy(&node("dst"), "c1").unwrap();

        // Assert
        assert_eq!(state.status, CopyStatus::Failed);
        assert!(state.status_description.is_some());
    }

    #[test]
    fn deleting_share_removes_tree() {
        // Arrange
        let mut storage = storage();
        storage.create_share(&share(), &CreateShareRequest::default()).unwrap();
        storage.create_directory(&node("d1"), &Metadata::new()).unwrap();
        storage.create_file(&node("d1/f1"), &new_file(10)).unwrap();

        // Act
        storage.delete_share(&share()).unwrap();
        storage.create_share(&share(), &CreateShareRequest::default()).unwrap();

        // Assert
        let page = storage.list_directory(&node(""), None, 10).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(storage.get_share_stats(&share()).unwrap(), ShareStats::default());
    }

    #[test]
    fn service_properties_default_until_set() {
        // Arrange
        let mut storage = storage();
        let mut properties = ServiceProperties::default();
        properties.hour_metrics.retention_days = Some(7);

        // Act
        let before = storage.get_service_properties("acc").unwrap();
        storage.set_service_properties("acc", &properties).unwrap();
        let after = storage.get_service_properties("acc").unwrap();

        // Assert
        assert_eq!(before, ServiceProperties::default());
        assert_eq!(after, properties);
    }

    #[test]
    fn file_length_cap_is_sqlite_blob_limit() {
        // Arrange
        let mut storage = storage();
        storage.create_share(&share(), &CreateShareRequest::default()).unwrap();

        // Act
        let at_cap = ensure_file_length(MAX_FILE_LENGTH);
        let past_cap = storage.create_file(&node("huge"), &new_file(MAX_FILE_LENGTH + 1));

        // Assert
        assert!(at_cap.is_ok());
        assert!(matches!(past_cap, Err(StorageError::InvalidInput(_))));
        assert!(storage.get_file(&node("huge")).is_err());
    }

    /// On-disk database removed with its WAL files when dropped.
    struct FileDatabase(std::path::PathBuf);

    impl FileDatabase {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!("fshare-{}.db", Uuid::new_v4().simple()));
            Sqlite::open(&path, Mode::ReadWrite).unwrap().new_database().unwrap();
            Self(path)
        }

        fn open(&self) -> Sqlite {
            Sqlite::open(&self.0, Mode::ReadWrite).unwrap()
        }
    }

    impl Drop for FileDatabase {
        fn drop(&mut self) {
            for suffix in ["", "-shm", "-wal"] {
                let mut file = self.0.clone().into_os_string();
                file.push(suffix);
                std::fs::remove_file(file).unwrap_or_default();
            }
        }
    }

    #[test]
    fn new_database_uses_write_ahead_log() {
        // Arrange
        let db = FileDatabase::new();

        // Act
        let mode: String = db
            .open()
            .conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();

        // Assert
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn concurrent_writers_on_own_connections() {
        // Arrange
        const WRITERS: usize = 8;
        const WRITES: u64 = 50;
        let db = FileDatabase::new();
        let mut setup = db.open();
        setup.create_share(&share(), &CreateShareRequest::default()).unwrap();
        for writer in 0..WRITERS {
            setup.create_file(&node(&format!("f{writer}")), &new_file(WRITES * 16)).unwrap();
        }

        // Act
        let failures: Vec<StorageError> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..WRITERS)
                .map(|writer| {
                    let db = &db;
                    scope.spawn(move || {
                        let file = node(&format!("f{writer}"));
                        (0..WRITES)
                            .filter_map(|i| {
                                let mut storage = db.open();
                                storage.write_range(&file, i * 16, &[0xCC; 8]).err()
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        // Assert
        assert!(failures.is_empty(), "{} writes failed: {:?}", failures.len(), failures.first());
        let ranges = setup.list_ranges(&node("f0")).unwrap();
        assert_eq!(ranges.len(), usize::try_from(WRITES).unwrap());
    }

    #[test]
    fn racing_abort_and_completion_apply_once() {
        // Arrange
        let db = FileDatabase::new();
        let mut setup = db.open();
        setup.create_share(&share(), &CreateShareRequest::default()).unwrap();
        setup.create_file(&node("src"), &new_file(4096)).unwrap();
        let copy_source = CopySource {
            share: "s1".to_owned(),
            path: "src".to_owned(),
        };

        for round in 0..20 {
            let copy_id = format!("c{round}");
            setup.begin_copy(&node("dst"), &copy_source, &copy_id).unwrap();

            // Act
            let (completed, aborted) = std::thread::scope(|scope| {
                let complete = scope.spawn(|| db.open().complete_copy(&node("dst"), &copy_id));
                let abort = scope.spawn(|| db.open().abort_copy(&node("dst"), &copy_id));
                (complete.join().unwrap(), abort.join().unwrap())
            });

            // Assert
            match (completed, aborted) {
                (Ok(state), Err(StorageError::NoPendingCopy(_))) => {
                    assert_eq!(state.status, CopyStatus::Success);
                }
                (Err(StorageError::NoPendingCopy(_)), Ok(state)) => {
                    assert_eq!(state.status, CopyStatus::Aborted);
                }
                other => panic!("round {round}: {other:?}"),
            }
        }
    }
}
