use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Personality descriptor of a profile
///
/// Either a categorical tag such as `"analytical"` (compound tags like
/// `"analytical_introvert"` name several categories) or a mapping of trait
/// name to numeric strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Personality {
    Tag(String),
    Traits(BTreeMap<String, f64>),
}

impl From<&str> for Personality {
    fn from(tag: &str) -> Self {
        Personality::Tag(tag.to_string())
    }
}

impl From<String> for Personality {
    fn from(tag: String) -> Self {
        Personality::Tag(tag)
    }
}

impl From<BTreeMap<String, f64>> for Personality {
    fn from(traits: BTreeMap<String, f64>) -> Self {
        Personality::Traits(traits)
    }
}

/// Raw profile attributes handed in by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(default, alias = "personality_type")]
    pub personality: Option<Personality>,
    #[serde(default, alias = "hobbies")]
    pub interests: Vec<String>,
    #[serde(default, alias = "university")]
    pub institution: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

impl ProfileRecord {
    #[must_use]
    pub fn new(personality: impl Into<Personality>) -> Self {
        Self {
            personality: Some(personality.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_interests<I, S>(mut self, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interests = interests.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_institution(mut self, institution: impl Into<String>) -> Self {
        self.institution = Some(institution.into());
        self
    }

    #[must_use]
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Reject values that would poison an embedding
    pub fn validate(&self) -> Result<()> {
        if let Some(Personality::Traits(traits)) = &self.personality {
            if let Some((name, value)) = traits.iter().find(|(_, v)| !v.is_finite()) {
                return Err(Error::InvalidProfile(format!(
                    "trait '{}' has non-finite strength {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// A profile together with the caller's identifier for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(flatten)]
    pub record: ProfileRecord,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, record: ProfileRecord) -> Self {
        Self {
            id: id.into(),
            record,
        }
    }
}

/// Lightweight per-user data kept next to the embedding.
/// Used for filtering and enriching results, never for scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub department: Option<String>,
    pub institution: Option<String>,
    pub interests: Vec<String>,
}

impl From<&ProfileRecord> for UserMetadata {
    fn from(record: &ProfileRecord) -> Self {
        Self {
            department: record.department.clone(),
            institution: record.institution.clone(),
            interests: record.interests.clone(),
        }
    }
}
