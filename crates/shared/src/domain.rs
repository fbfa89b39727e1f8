use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(BookId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    Draft,
    Generating,
    Completed,
    Failed,
}

impl BookStatus {
    /// Completed and failed books never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline step named by a progress event. Stages the client does not know
/// are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStage {
    Planning,
    Writing,
    Dialogue,
    Review,
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Planning => "planning",
            Self::Writing => "writing",
            Self::Dialogue => "dialogue",
            Self::Review => "review",
            Self::Other(stage) => stage.as_str(),
        };
        f.write_str(label)
    }
}

/// User-authored parameters for one book. Every field is free text and is
/// sent as-is; the service decides what it accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub title: String,
    pub description: String,
    pub genre: String,
    pub target_audience: String,
    pub style: String,
    pub tone: String,
    pub length: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookContent {
    pub structure: String,
    pub content: String,
}

/// Server-side snapshot of a book. Replaced wholesale on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub description: String,
    pub genre: String,
    pub target_audience: String,
    pub style: String,
    pub tone: String,
    pub length: String,
    pub status: BookStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<BookContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Book {
    pub fn config(&self) -> GenerationConfig {
        GenerationConfig {
            title: self.title.clone(),
            description: self.description.clone(),
            genre: self.genre.clone(),
            target_audience: self.target_audience.clone(),
            style: self.style.clone(),
            tone: self.tone.clone(),
            length: self.length.clone(),
        }
    }
}

/// Transient notification pushed while a book is generating. Carries no
/// sequence number, so gaps and repeats cannot be detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: GenerationStage,
    pub message: String,
}
