use super::Repository;
use crate::database::models::{AssetKey, AssetRecord};
use crate::database::{CatalogError, Database};
use chrono::SecondsFormat;
use rusqlite::{Transaction, params};

#[derive(Debug, Clone)]
enum PendingWrite {
    Insert(AssetRecord),
    Update(AssetRecord),
    Delete(AssetKey),
}

/// Stages catalog mutations and commits them together on [`save`].
///
/// Each pipeline stage owns its writer, so one stage's `save` never commits
/// another stage's unfinished work.
///
/// [`save`]: CatalogWriter::save
#[derive(Debug)]
pub struct CatalogWriter {
    db: Database,
    pending: Vec<PendingWrite>,
}

impl Repository for CatalogWriter {
    fn database(&self) -> &Database {
        &self.db
    }
}

impl CatalogWriter {
    pub(crate) fn new(db: Database) -> Self {
        Self {
            db,
            pending: Vec::new(),
        }
    }

    /// Stages new rows. A row already present under the same key is replaced.
    pub fn insert<I: IntoIterator<Item = AssetRecord>>(&mut self, records: I) {
        self.pending
            .extend(records.into_iter().map(PendingWrite::Insert));
    }

    /// Stages rewrites of existing rows. Rows deleted before `save` are
    /// skipped silently.
    pub fn update<I: IntoIterator<Item = AssetRecord>>(&mut self, records: I) {
        self.pending
            .extend(records.into_iter().map(PendingWrite::Update));
    }

    pub fn delete(&mut self, record: &AssetRecord) {
        self.pending.push(PendingWrite::Delete(record.key()));
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Commits every staged write in one transaction and returns the number
    /// of rows touched. On error nothing is committed and the staged writes
    /// are kept.
    pub fn save(&mut self) -> Result<usize, CatalogError> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        for write in &self.pending {
            if let PendingWrite::Insert(record) | PendingWrite::Update(record) = write {
                record.validate()?;
            }
        }

        let touched = {
            let mut conn = self.get_connection()?;
            let tx = conn.transaction()?;
            let mut touched = 0;
            for write in &self.pending {
                touched += apply(&tx, write)?;
            }
            tx.commit()?;
            touched
        };

        log::debug!(
            "Committed {} catalog write(s), {} row(s) touched",
            self.pending.len(),
            touched
        );
        self.pending.clear();
        Ok(touched)
    }
}

fn apply(tx: &Transaction<'_>, write: &PendingWrite) -> Result<usize, CatalogError> {
    let rows = match write {
        PendingWrite::Insert(r) => tx.execute(
            "INSERT OR REPLACE INTO assets
             (asset_id, media_type, creation_date, group_type, subgroup_id,
              content_hash, feature_vector, size_bytes, is_checked)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                r.asset_id,
                r.media_type.as_str(),
                r.creation_date.to_rfc3339_opts(SecondsFormat::Nanos, true),
                r.group_type.as_str(),
                r.subgroup_id.map(|id| id.to_string()),
                r.content_hash,
                r.feature_vector,
                r.size_bytes,
                r.is_checked,
            ],
        )?,
        PendingWrite::Update(r) => tx.execute(
            "UPDATE assets
             SET creation_date = ?3, group_type = ?4, subgroup_id = ?5,
                 content_hash = ?6, feature_vector = ?7, size_bytes = ?8,
                 is_checked = ?9
             WHERE asset_id = ?1 AND media_type = ?2",
            params![
                r.asset_id,
                r.media_type.as_str(),
                r.creation_date.to_rfc3339_opts(SecondsFormat::Nanos, true),
                r.group_type.as_str(),
                r.subgroup_id.map(|id| id.to_string()),
                r.content_hash,
                r.feature_vector,
                r.size_bytes,
                r.is_checked,
            ],
        )?,
        PendingWrite::Delete(key) => tx.execute(
            "DELETE FROM assets WHERE asset_id = ?1 AND media_type = ?2",
            params![key.asset_id, key.media_type.as_str()],
        )?,
    };
    Ok(rows)
}
