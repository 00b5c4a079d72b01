//! Pipeline stage catalog and label canonicalization.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    MeetingBooked,
    ActiveConversation,
    NdaConsidering,
    NdaSigned,
    DocumentsUploaded,
    ContractNegotiations,
    Won,
    NotNow,
    ExploringOtherOptions,
    NotInterested,
}

impl StageId {
    pub const DEFAULT: StageId = StageId::NotNow;

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::MeetingBooked => "meeting-booked",
            StageId::ActiveConversation => "active-conversation",
            StageId::NdaConsidering => "nda-considering",
            StageId::NdaSigned => "nda-signed",
            StageId::DocumentsUploaded => "documents-uploaded",
            StageId::ContractNegotiations => "contract-negotiations",
            StageId::Won => "won",
            StageId::NotNow => "not-now",
            StageId::ExploringOtherOptions => "exploring-other-options",
            StageId::NotInterested => "not-interested",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCategory {
    Main,
    Auxiliary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub title: String,
    pub category: StageCategory,
}

const STANDARD_STAGES: &[(StageId, &str, StageCategory)] = &[
    (StageId::MeetingBooked, "Meeting Booked", StageCategory::Main),
    (StageId::ActiveConversation, "Active Conversation", StageCategory::Main),
    (StageId::NdaConsidering, "NDA (Considering)", StageCategory::Main),
    (StageId::NdaSigned, "NDA (Signed)", StageCategory::Main),
    (StageId::DocumentsUploaded, "Documents Uploaded", StageCategory::Main),
    (StageId::ContractNegotiations, "Contract Negotiations", StageCategory::Main),
    (StageId::Won, "Won", StageCategory::Main),
    (StageId::NotNow, "Not Now", StageCategory::Auxiliary),
    (
        StageId::ExploringOtherOptions,
        "Exploring Other Options",
        StageCategory::Auxiliary,
    ),
    (StageId::NotInterested, "Not Interested", StageCategory::Auxiliary),
];

/// Read-only stage catalog. Build it once at startup and share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<Stage>,
    exact: HashMap<String, StageId>,
    folded: HashMap<String, StageId>,
}

impl StageRegistry {
    pub fn standard() -> Self {
        let stages: Vec<Stage> = STANDARD_STAGES
            .iter()
            .map(|(id, title, category)| Stage {
                id: *id,
                title: (*title).to_string(),
                category: *category,
            })
            .collect();

        let mut exact = HashMap::new();
        let mut folded = HashMap::new();
        for stage in &stages {
            for label in [stage.title.as_str(), stage.id.as_str()] {
                exact.insert(label.to_string(), stage.id);
                folded.insert(label.to_ascii_lowercase(), stage.id);
            }
        }

        Self {
            stages,
            exact,
            folded,
        }
    }

    /// Maps any raw label to a canonical stage. Never fails: unknown labels
    /// land in [`StageId::DEFAULT`].
    pub fn canonicalize(&self, label: &str) -> StageId {
        self.lookup(label).unwrap_or(StageId::DEFAULT)
    }

    pub fn is_known(&self, label: &str) -> bool {
        self.lookup(label).is_some()
    }

    /// Strict lookup of a canonical id, used for drop targets.
    pub fn resolve_column(&self, id: &str) -> Option<StageId> {
        self.stages
            .iter()
            .find(|stage| stage.id.as_str() == id)
            .map(|stage| stage.id)
    }

    pub fn default_stage(&self) -> &Stage {
        self.get(StageId::DEFAULT)
    }

    pub fn get(&self, id: StageId) -> &Stage {
        // The catalog holds every StageId variant.
        self.stages
            .iter()
            .find(|stage| stage.id == id)
            .unwrap_or(&self.stages[0])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn main(&self) -> impl Iterator<Item = &Stage> {
        self.stages
            .iter()
            .filter(|stage| stage.category == StageCategory::Main)
    }

    pub fn auxiliary(&self) -> impl Iterator<Item = &Stage> {
        self.stages
            .iter()
            .filter(|stage| stage.category == StageCategory::Auxiliary)
    }

    fn lookup(&self, label: &str) -> Option<StageId> {
        let label = label.trim();
        self.exact
            .get(label)
            .or_else(|| self.folded.get(&label.to_ascii_lowercase()))
            .copied()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
