// Custom-field projection: provider field id -> fixed work-item column.
//
// The mapping table routes provider-side field ids to fixed columns on the
// work_items table. The sprints slot is special: it is consumed by the
// sprint-association step and never written into a column.

use std::collections::HashMap;

/// Fixed target slot for a mapped provider field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetColumn {
    Team,
    Development,
    StoryPoints,
    /// Consumed by the sprint-association step only
    Sprints,
    /// One of the twenty generic custom-field columns, 1-based
    Custom(u8),
}

const CUSTOM_COLUMN_NAMES: [&str; 20] = [
    "custom_field_01",
    "custom_field_02",
    "custom_field_03",
    "custom_field_04",
    "custom_field_05",
    "custom_field_06",
    "custom_field_07",
    "custom_field_08",
    "custom_field_09",
    "custom_field_10",
    "custom_field_11",
    "custom_field_12",
    "custom_field_13",
    "custom_field_14",
    "custom_field_15",
    "custom_field_16",
    "custom_field_17",
    "custom_field_18",
    "custom_field_19",
    "custom_field_20",
];

impl TargetColumn {
    /// Column name on work_items, or None for slots that never land in a column
    pub fn column_name(&self) -> Option<&'static str> {
        match self {
            TargetColumn::Team => Some("team"),
            TargetColumn::Development => Some("development"),
            TargetColumn::StoryPoints => Some("story_points"),
            TargetColumn::Sprints => None,
            TargetColumn::Custom(n) => {
                CUSTOM_COLUMN_NAMES.get((*n as usize).wrapping_sub(1)).copied()
            }
        }
    }

    /// Parse a mapping-table slot name ("team", "custom_field_07", ...)
    pub fn from_slot_name(slot: &str) -> Option<TargetColumn> {
        match slot {
            "team" => Some(TargetColumn::Team),
            "development" => Some(TargetColumn::Development),
            "story_points" => Some(TargetColumn::StoryPoints),
            "sprints" => Some(TargetColumn::Sprints),
            other => {
                let n = other.strip_prefix("custom_field_")?.parse::<u8>().ok()?;
                if (1..=20).contains(&n) {
                    Some(TargetColumn::Custom(n))
                } else {
                    None
                }
            }
        }
    }
}

/// Projection from provider field ids (e.g. "customfield_10021") to target
/// columns, built per integration from its custom_fields_mapping row.
#[derive(Debug, Clone, Default)]
pub struct FieldProjection {
    map: HashMap<String, TargetColumn>,
}

impl FieldProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider_field_id: impl Into<String>, target: TargetColumn) {
        self.map.insert(provider_field_id.into(), target);
    }

    pub fn target_for(&self, provider_field_id: &str) -> Option<TargetColumn> {
        self.map.get(provider_field_id).copied()
    }

    /// Provider field id mapped to the sprints slot, if any
    pub fn sprints_field_id(&self) -> Option<&str> {
        self.map
            .iter()
            .find(|(_, target)| **target == TargetColumn::Sprints)
            .map(|(id, _)| id.as_str())
    }

    /// Provider field id mapped to the development slot, if any
    pub fn development_field_id(&self) -> Option<&str> {
        self.map
            .iter()
            .find(|(_, target)| **target == TargetColumn::Development)
            .map(|(id, _)| id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TargetColumn)> {
        self.map.iter().map(|(id, target)| (id.as_str(), *target))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_names() {
        assert_eq!(TargetColumn::Team.column_name(), Some("team"));
        assert_eq!(TargetColumn::Custom(1).column_name(), Some("custom_field_01"));
        assert_eq!(TargetColumn::Custom(20).column_name(), Some("custom_field_20"));
        assert_eq!(TargetColumn::Custom(21).column_name(), None);
        // The sprints slot never lands in a work_items column
        assert_eq!(TargetColumn::Sprints.column_name(), None);
    }

    #[test]
    fn test_slot_name_parsing() {
        assert_eq!(TargetColumn::from_slot_name("sprints"), Some(TargetColumn::Sprints));
        assert_eq!(
            TargetColumn::from_slot_name("custom_field_07"),
            Some(TargetColumn::Custom(7))
        );
        assert_eq!(TargetColumn::from_slot_name("custom_field_00"), None);
        assert_eq!(TargetColumn::from_slot_name("custom_field_21"), None);
        assert_eq!(TargetColumn::from_slot_name("labels"), None);
    }

    #[test]
    fn test_projection_lookups() {
        let mut projection = FieldProjection::new();
        projection.insert("customfield_10021", TargetColumn::Sprints);
        projection.insert("customfield_10000", TargetColumn::Development);
        projection.insert("customfield_10024", TargetColumn::StoryPoints);

        assert_eq!(
            projection.target_for("customfield_10024"),
            Some(TargetColumn::StoryPoints)
        );
        assert_eq!(projection.sprints_field_id(), Some("customfield_10021"));
        assert_eq!(projection.development_field_id(), Some("customfield_10000"));
        assert_eq!(projection.target_for("customfield_99999"), None);
    }
}
