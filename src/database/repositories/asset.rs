use super::{AssetFilter, CatalogWriter, Repository};
use crate::database::models::{
    AssetKey, AssetRecord, CategoryTotals, GroupSummary, GroupType, MediaType,
};
use crate::database::{CatalogError, Database};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use uuid::Uuid;

const COLUMNS: &str = "asset_id, media_type, creation_date, group_type, subgroup_id, \
                       content_hash, feature_vector, size_bytes, is_checked";

/// Read side of the asset catalog plus the factory for [`CatalogWriter`]s.
#[derive(Debug, Clone)]
pub struct AssetRepository {
    db: Database,
}

impl Repository for AssetRepository {
    fn database(&self) -> &Database {
        &self.db
    }
}

impl AssetRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn writer(&self) -> CatalogWriter {
        CatalogWriter::new(self.db.clone())
    }

    /// Records matching `filter`, ordered by creation date then id.
    pub fn fetch(&self, filter: &AssetFilter) -> Result<Vec<AssetRecord>, CatalogError> {
        let (where_clause, values) = filter.to_sql();
        let sql = format!(
            "SELECT {COLUMNS} FROM assets{where_clause} ORDER BY creation_date ASC, asset_id ASC"
        );

        let raw: Vec<RawAsset> = {
            let conn = self.get_connection()?;
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params_from_iter(values.iter()), RawAsset::from_row)?
                .collect::<Result<_, _>>()?
        };

        raw.into_iter().map(RawAsset::into_record).collect()
    }

    pub fn find(&self, key: &AssetKey) -> Result<Option<AssetRecord>, CatalogError> {
        let raw = {
            let conn = self.get_connection()?;
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM assets WHERE asset_id = ?1 AND media_type = ?2"),
                params![key.asset_id, key.media_type.as_str()],
                RawAsset::from_row,
            )
            .optional()?
        };

        raw.map(RawAsset::into_record).transpose()
    }

    /// Catalog-wide setting stored beside the assets.
    pub fn meta(&self, key: &str) -> Result<Option<String>, CatalogError> {
        let conn = self.get_connection()?;
        conn.query_row(
            "SELECT value FROM catalog_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(CatalogError::Sqlite)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), CatalogError> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO catalog_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn count(&self, filter: &AssetFilter) -> Result<i64, CatalogError> {
        let (where_clause, values) = filter.to_sql();
        let conn = self.get_connection()?;

        conn.query_row(
            &format!("SELECT COUNT(*) FROM assets{where_clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )
        .map_err(CatalogError::Sqlite)
    }

    pub fn fetch_group(
        &self,
        media_type: MediaType,
        subgroup_id: Uuid,
    ) -> Result<Vec<AssetRecord>, CatalogError> {
        self.fetch(&AssetFilter::media(media_type).subgroup(subgroup_id))
    }

    /// Per-group member counts and byte totals, largest groups first.
    pub fn group_summaries(
        &self,
        media_type: MediaType,
        group_type: GroupType,
    ) -> Result<Vec<GroupSummary>, CatalogError> {
        let rows: Vec<(String, i64, i64)> = {
            let conn = self.get_connection()?;
            let mut stmt = conn.prepare(
                "SELECT subgroup_id, COUNT(*), COALESCE(SUM(size_bytes), 0)
                 FROM assets
                 WHERE media_type = ?1 AND group_type = ?2 AND subgroup_id IS NOT NULL
                 GROUP BY subgroup_id
                 ORDER BY SUM(size_bytes) DESC, subgroup_id ASC",
            )?;
            stmt.query_map(params![media_type.as_str(), group_type.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<_, _>>()?
        };

        rows.into_iter()
            .map(|(subgroup_id, members, total_size)| {
                Ok(GroupSummary {
                    subgroup_id: parse_uuid(&subgroup_id)?,
                    group_type,
                    members,
                    total_size,
                })
            })
            .collect()
    }

    pub fn category_totals(&self, media_type: MediaType) -> Result<CategoryTotals, CatalogError> {
        let rows: Vec<(String, i64, i64)> = {
            let conn = self.get_connection()?;
            let mut stmt = conn.prepare(
                "SELECT group_type, COUNT(*), COALESCE(SUM(size_bytes), 0)
                 FROM assets WHERE media_type = ?1 GROUP BY group_type",
            )?;
            stmt.query_map(params![media_type.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<_, _>>()?
        };

        let mut totals = CategoryTotals::default();
        for (group_type, count, size) in rows {
            match parse_group_type(&group_type)? {
                GroupType::Other => {
                    totals.other_count = count;
                    totals.other_size = size;
                }
                GroupType::Duplicate => {
                    totals.duplicate_count = count;
                    totals.duplicate_size = size;
                }
                GroupType::Similar => {
                    totals.similar_count = count;
                    totals.similar_size = size;
                }
            }
        }
        Ok(totals)
    }
}

struct RawAsset {
    asset_id: String,
    media_type: String,
    creation_date: String,
    group_type: String,
    subgroup_id: Option<String>,
    content_hash: Option<Vec<u8>>,
    feature_vector: Option<Vec<u8>>,
    size_bytes: i64,
    is_checked: bool,
}

impl RawAsset {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            asset_id: row.get(0)?,
            media_type: row.get(1)?,
            creation_date: row.get(2)?,
            group_type: row.get(3)?,
            subgroup_id: row.get(4)?,
            content_hash: row.get(5)?,
            feature_vector: row.get(6)?,
            size_bytes: row.get(7)?,
            is_checked: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<AssetRecord, CatalogError> {
        let media_type = self
            .media_type
            .parse::<MediaType>()
            .map_err(|_| CatalogError::Corrupt {
                column: "media_type",
                value: self.media_type.clone(),
            })?;
        let creation_date = DateTime::parse_from_rfc3339(&self.creation_date)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| CatalogError::Corrupt {
                column: "creation_date",
                value: self.creation_date.clone(),
            })?;

        Ok(AssetRecord {
            asset_id: self.asset_id,
            creation_date,
            media_type,
            group_type: parse_group_type(&self.group_type)?,
            subgroup_id: self.subgroup_id.as_deref().map(parse_uuid).transpose()?,
            content_hash: self.content_hash,
            feature_vector: self.feature_vector,
            size_bytes: self.size_bytes,
            is_checked: self.is_checked,
        })
    }
}

fn parse_group_type(value: &str) -> Result<GroupType, CatalogError> {
    value.parse().map_err(|_| CatalogError::Corrupt {
        column: "group_type",
        value: value.to_string(),
    })
}

fn parse_uuid(value: &str) -> Result<Uuid, CatalogError> {
    Uuid::parse_str(value).map_err(|_| CatalogError::Corrupt {
        column: "subgroup_id",
        value: value.to_string(),
    })
}
