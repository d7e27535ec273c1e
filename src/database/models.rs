use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// Asset models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset_id: String,
    pub creation_date: DateTime<Utc>,
    pub media_type: MediaType,
    pub group_type: GroupType,
    pub subgroup_id: Option<Uuid>,
    pub content_hash: Option<Vec<u8>>,
    pub feature_vector: Option<Vec<u8>>,
    pub size_bytes: i64,
    pub is_checked: bool,
}

impl AssetRecord {
    /// A freshly discovered library item: ungrouped, unhashed, unchecked.
    pub fn discovered(
        asset_id: String,
        media_type: MediaType,
        creation_date: DateTime<Utc>,
        size_bytes: i64,
    ) -> Self {
        Self {
            asset_id,
            creation_date,
            media_type,
            group_type: GroupType::Other,
            subgroup_id: None,
            content_hash: None,
            feature_vector: None,
            size_bytes,
            is_checked: false,
        }
    }

    pub fn group_state(&self) -> GroupState {
        match (self.group_type, self.subgroup_id) {
            (GroupType::Duplicate, Some(id)) => GroupState::Duplicate(id),
            (GroupType::Similar, Some(id)) => GroupState::Similar(id),
            _ => GroupState::Other,
        }
    }

    /// Moves the record into `state`, setting `group_type` and `subgroup_id`
    /// together so the pair can never disagree.
    pub fn reclassify(self, state: GroupState) -> Self {
        let (group_type, subgroup_id) = match state {
            GroupState::Other => (GroupType::Other, None),
            GroupState::Duplicate(id) => (GroupType::Duplicate, Some(id)),
            GroupState::Similar(id) => (GroupType::Similar, Some(id)),
        };
        Self {
            group_type,
            subgroup_id,
            ..self
        }
    }

    pub fn checked(self, is_checked: bool) -> Self {
        Self { is_checked, ..self }
    }

    pub fn validate(&self) -> Result<(), InvariantViolation> {
        match (self.group_type, self.subgroup_id) {
            (GroupType::Duplicate | GroupType::Similar, None) => {
                return Err(InvariantViolation::MissingSubgroup {
                    asset_id: self.asset_id.clone(),
                    group_type: self.group_type,
                });
            }
            (GroupType::Other, Some(_)) => {
                return Err(InvariantViolation::StraySubgroup {
                    asset_id: self.asset_id.clone(),
                });
            }
            _ => {}
        }

        if self.is_checked
            && self.group_type == GroupType::Similar
            && self.feature_vector.is_none()
        {
            return Err(InvariantViolation::CheckedWithoutFeatures {
                asset_id: self.asset_id.clone(),
            });
        }

        Ok(())
    }

    pub fn key(&self) -> AssetKey {
        AssetKey {
            media_type: self.media_type,
            asset_id: self.asset_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetKey {
    pub media_type: MediaType,
    pub asset_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupState {
    Other,
    Duplicate(Uuid),
    Similar(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("asset {asset_id} is {group_type} but has no subgroup id")]
    MissingSubgroup {
        asset_id: String,
        group_type: GroupType,
    },

    #[error("asset {asset_id} is ungrouped but still carries a subgroup id")]
    StraySubgroup { asset_id: String },

    #[error("asset {asset_id} is checked as similar without a feature vector")]
    CheckedWithoutFeatures { asset_id: String },
}

// Enums for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Photo,
    Screenshot,
    Video,
    ScreenRecording,
}

impl MediaType {
    pub const ALL: [MediaType; 4] = [
        MediaType::Photo,
        MediaType::Screenshot,
        MediaType::Video,
        MediaType::ScreenRecording,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Photo => "photo",
            MediaType::Screenshot => "screenshot",
            MediaType::Video => "video",
            MediaType::ScreenRecording => "screen_recording",
        }
    }

    pub fn is_still_image(&self) -> bool {
        matches!(self, MediaType::Photo | MediaType::Screenshot)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(MediaType::Photo),
            "screenshot" => Ok(MediaType::Screenshot),
            "video" => Ok(MediaType::Video),
            "screen_recording" => Ok(MediaType::ScreenRecording),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    Other,
    Duplicate,
    Similar,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Other => "other",
            GroupType::Duplicate => "duplicate",
            GroupType::Similar => "similar",
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "other" => Ok(GroupType::Other),
            "duplicate" => Ok(GroupType::Duplicate),
            "similar" => Ok(GroupType::Similar),
            other => Err(format!("unknown group type: {other}")),
        }
    }
}

/// Aggregate view of one group, for "what can I delete" screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub subgroup_id: Uuid,
    pub group_type: GroupType,
    pub members: i64,
    pub total_size: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub other_count: i64,
    pub other_size: i64,
    pub duplicate_count: i64,
    pub duplicate_size: i64,
    pub similar_count: i64,
    pub similar_size: i64,
}

impl CategoryTotals {
    pub fn total_count(&self) -> i64 {
        self.other_count + self.duplicate_count + self.similar_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AssetRecord {
        AssetRecord::discovered("IMG_0001.jpg".to_string(), MediaType::Photo, Utc::now(), 42)
    }

    #[test]
    fn test_discovered_record_is_valid_and_unchecked() {
        let r = record();
        assert_eq!(r.group_type, GroupType::Other);
        assert!(r.subgroup_id.is_none());
        assert!(!r.is_checked);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_reclassify_sets_both_fields() {
        let id = Uuid::new_v4();
        let dup = record().reclassify(GroupState::Duplicate(id));
        assert_eq!(dup.group_type, GroupType::Duplicate);
        assert_eq!(dup.subgroup_id, Some(id));
        assert_eq!(dup.group_state(), GroupState::Duplicate(id));

        let demoted = dup.reclassify(GroupState::Other);
        assert_eq!(demoted.group_type, GroupType::Other);
        assert!(demoted.subgroup_id.is_none());
        assert!(demoted.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_mismatched_group_fields() {
        let mut r = record();
        r.group_type = GroupType::Duplicate;
        assert!(matches!(
            r.validate(),
            Err(InvariantViolation::MissingSubgroup { .. })
        ));

        let mut r = record();
        r.subgroup_id = Some(Uuid::new_v4());
        assert!(matches!(
            r.validate(),
            Err(InvariantViolation::StraySubgroup { .. })
        ));
    }

    #[test]
    fn test_checked_similar_requires_features() {
        let r = record()
            .reclassify(GroupState::Similar(Uuid::new_v4()))
            .checked(true);
        assert!(matches!(
            r.validate(),
            Err(InvariantViolation::CheckedWithoutFeatures { .. })
        ));
    }

    #[test]
    fn test_enum_string_round_trip() {
        for media in MediaType::ALL {
            assert_eq!(media.as_str().parse::<MediaType>().unwrap(), media);
        }
        assert_eq!("similar".parse::<GroupType>().unwrap(), GroupType::Similar);
        assert!("bogus".parse::<GroupType>().is_err());
    }
}
