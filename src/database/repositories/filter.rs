use crate::database::models::{GroupType, MediaType};
use rusqlite::types::Value;
use uuid::Uuid;

/// Compound predicate over the `assets` table. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetFilter {
    media_type: Option<MediaType>,
    group_type: Option<GroupType>,
    exclude_group_type: Option<GroupType>,
    subgroup_id: Option<Uuid>,
    is_checked: Option<bool>,
    has_hash: Option<bool>,
    has_feature_vector: Option<bool>,
    asset_ids: Option<Vec<String>>,
}

impl AssetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn media(media_type: MediaType) -> Self {
        Self::new().media_type(media_type)
    }

    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    pub fn group_type(mut self, group_type: GroupType) -> Self {
        self.group_type = Some(group_type);
        self
    }

    pub fn not_group_type(mut self, group_type: GroupType) -> Self {
        self.exclude_group_type = Some(group_type);
        self
    }

    pub fn subgroup(mut self, subgroup_id: Uuid) -> Self {
        self.subgroup_id = Some(subgroup_id);
        self
    }

    pub fn checked(mut self, is_checked: bool) -> Self {
        self.is_checked = Some(is_checked);
        self
    }

    pub fn has_hash(mut self, present: bool) -> Self {
        self.has_hash = Some(present);
        self
    }

    pub fn has_feature_vector(mut self, present: bool) -> Self {
        self.has_feature_vector = Some(present);
        self
    }

    pub fn asset_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.asset_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Renders the filter as a `WHERE` clause (empty when unfiltered) and its
    /// positional parameters.
    pub(crate) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(media_type) = self.media_type {
            clauses.push("media_type = ?".to_string());
            params.push(Value::Text(media_type.as_str().to_string()));
        }
        if let Some(group_type) = self.group_type {
            clauses.push("group_type = ?".to_string());
            params.push(Value::Text(group_type.as_str().to_string()));
        }
        if let Some(group_type) = self.exclude_group_type {
            clauses.push("group_type != ?".to_string());
            params.push(Value::Text(group_type.as_str().to_string()));
        }
        if let Some(subgroup_id) = self.subgroup_id {
            clauses.push("subgroup_id = ?".to_string());
            params.push(Value::Text(subgroup_id.to_string()));
        }
        if let Some(is_checked) = self.is_checked {
            clauses.push("is_checked = ?".to_string());
            params.push(Value::Integer(is_checked as i64));
        }
        if let Some(present) = self.has_hash {
            clauses.push(null_check("content_hash", present));
        }
        if let Some(present) = self.has_feature_vector {
            clauses.push(null_check("feature_vector", present));
        }
        if let Some(ids) = &self.asset_ids {
            if ids.is_empty() {
                clauses.push("0".to_string());
            } else {
                let placeholders = vec!["?"; ids.len()].join(", ");
                clauses.push(format!("asset_id IN ({placeholders})"));
                params.extend(ids.iter().cloned().map(Value::Text));
            }
        }

        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), params)
        }
    }
}

fn null_check(column: &str, present: bool) -> String {
    if present {
        format!("{column} IS NOT NULL")
    } else {
        format!("{column} IS NULL")
    }
}
