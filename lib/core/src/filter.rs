// Metadata filters for nearest-neighbour candidates
use crate::UserMetadata;

/// Candidate predicate evaluated before ranking.
///
/// `target` is the metadata of the user the query is about, so filters can
/// express relative conditions such as "same department as me".
pub trait Filter {
    fn matches(&self, target: &UserMetadata, candidate: &UserMetadata) -> bool;
}

/// Metadata field a condition compares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Department,
    Institution,
}

impl MetadataField {
    fn get(self, metadata: &UserMetadata) -> Option<&str> {
        match self {
            MetadataField::Department => metadata.department.as_deref(),
            MetadataField::Institution => metadata.institution.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FilterCondition {
    /// Candidate's field equals the target's (two absent values are equal)
    SameAsTarget(MetadataField),
    /// Candidate's field equals a fixed value
    Equals { field: MetadataField, value: String },
    And(Vec<FilterCondition>),
    Or(Vec<FilterCondition>),
    Not(Box<FilterCondition>),
}

pub struct MetadataFilter {
    condition: FilterCondition,
}

impl MetadataFilter {
    pub fn new(condition: FilterCondition) -> Self {
        Self { condition }
    }

    pub fn same_department() -> Self {
        Self::new(FilterCondition::SameAsTarget(MetadataField::Department))
    }

    pub fn same_institution() -> Self {
        Self::new(FilterCondition::SameAsTarget(MetadataField::Institution))
    }

    pub fn condition(&self) -> &FilterCondition {
        &self.condition
    }

    fn matches_condition(
        condition: &FilterCondition,
        target: &UserMetadata,
        candidate: &UserMetadata,
    ) -> bool {
        match condition {
            FilterCondition::SameAsTarget(field) => field.get(candidate) == field.get(target),
            FilterCondition::Equals { field, value } => {
                field.get(candidate) == Some(value.as_str())
            }
            FilterCondition::And(conditions) => conditions
                .iter()
                .all(|c| Self::matches_condition(c, target, candidate)),
            FilterCondition::Or(conditions) => conditions
                .iter()
                .any(|c| Self::matches_condition(c, target, candidate)),
            FilterCondition::Not(condition) => {
                !Self::matches_condition(condition, target, candidate)
            }
        }
    }
}

impl Filter for MetadataFilter {
    fn matches(&self, target: &UserMetadata, candidate: &UserMetadata) -> bool {
        Self::matches_condition(&self.condition, target, candidate)
    }
}
