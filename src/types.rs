//! The learning-profile document and its record types.
//!
//! One document per user, serialized camelCase so rows written by earlier
//! clients deserialize unchanged. Timestamps are epoch milliseconds.
//! Every mutation elsewhere in the crate is a structural copy-on-write
//! replace of this document, never a partial server-side patch.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// Document validation / round-trip errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed profile document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Current epoch-millisecond timestamp.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Proficiency level, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UserLevel {
    Beginner,
    Intermediate,
    Advanced,
    Proficient,
}

impl UserLevel {
    /// Parse from a string, defaulting to Beginner.
    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "Intermediate" => Self::Intermediate,
            "Advanced" => Self::Advanced,
            "Proficient" => Self::Proficient,
            _ => Self::Beginner,
        }
    }
}

impl std::fmt::Display for UserLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Beginner => write!(f, "Beginner"),
            Self::Intermediate => write!(f, "Intermediate"),
            Self::Advanced => write!(f, "Advanced"),
            Self::Proficient => write!(f, "Proficient"),
        }
    }
}

/// A grammar mistake caught by the tutor, with its correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarSlip {
    pub id: String,
    pub error: String,
    pub correction: String,
    pub explanation: String,
    pub timestamp: i64,
}

/// A word the learner has spelled correctly at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyWord {
    pub word: String,
    pub definition: String,
    pub example: String,
    pub level: UserLevel,
    pub added_date: i64,
}

/// Summary of one completed general assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub level: UserLevel,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    pub timestamp: i64,
}

/// Summary of one completed topic quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizRecord {
    pub topic: String,
    pub score: u32,
    pub total: u32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPart {
    pub text: String,
}

/// One transcript entry, stored in the `{role, parts:[{text}]}` wire shape
/// the original client used. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub parts: Vec<ChatPart>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            parts: vec![ChatPart { text: text.into() }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            parts: vec![ChatPart { text: text.into() }],
        }
    }

    /// The turn's text. Multi-part turns never occur in practice; the first
    /// part is the message.
    pub fn text(&self) -> &str {
        self.parts.first().map(|p| p.text.as_str()).unwrap_or("")
    }
}

/// Kind of task a learning-plan entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTaskKind {
    Quiz,
    Spelling,
    ChatTopic,
}

/// One learning-plan entry, individually markable complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTask {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PlanTaskKind,
    pub title: String,
    pub description: String,
    pub completed: bool,
}

/// Inferred learner persona, refreshed in the background by the tutor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Interest tags; capped at 5 by convention (the model is asked for at
    /// most 5), not enforced here.
    pub interests: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub age: Option<u32>,
    pub country: String,
    pub level: UserLevel,
    pub learning_streak: u32,
    pub last_login: i64,
    pub persona: Persona,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub spelling_auto_advance_seconds: u32,
}

/// Corrected-vs-total tally for grammar memory cards. `corrected_mistakes`
/// never exceeds `total_mistakes`; both only grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningAbility {
    pub corrected_mistakes: u32,
    pub total_mistakes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub words_learned: u32,
    pub grammar_errors_tracked: u32,
    pub quizzes_completed: u32,
    pub quiz_average_score: u32,
    pub learning_ability: LearningAbility,
}

/// The single per-user document every feature reads and mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningProfile {
    /// Owning user id. Set at creation, never changed afterwards. Absent in
    /// rows written by clients that kept the id only as the row key.
    #[serde(default)]
    pub identity: Option<Uuid>,
    pub profile: Profile,
    pub settings: Settings,
    pub stats: Stats,
    pub vocabulary: Vec<VocabularyWord>,
    pub suggested_vocabulary: Vec<VocabularyWord>,
    pub grammar_errors: Vec<GrammarSlip>,
    pub assessment_history: Vec<AssessmentRecord>,
    pub quiz_history: Vec<QuizRecord>,
    pub chat_history: Vec<ChatTurn>,
    pub recommendations: Vec<String>,
    pub learning_plan: Vec<PlanTask>,
}

impl LearningProfile {
    /// Zero-state document for a newly authenticated user.
    pub fn default_for(identity: Uuid) -> Self {
        Self {
            identity: Some(identity),
            profile: Profile {
                name: "New Learner".into(),
                age: None,
                country: String::new(),
                level: UserLevel::Beginner,
                learning_streak: 0,
                last_login: now_millis(),
                persona: Persona {
                    interests: Vec::new(),
                    summary: "A new English learner.".into(),
                },
            },
            settings: Settings {
                spelling_auto_advance_seconds: 3,
            },
            stats: Stats {
                words_learned: 0,
                grammar_errors_tracked: 0,
                quizzes_completed: 0,
                quiz_average_score: 0,
                learning_ability: LearningAbility {
                    corrected_mistakes: 0,
                    total_mistakes: 0,
                },
            },
            vocabulary: Vec::new(),
            suggested_vocabulary: Vec::new(),
            grammar_errors: Vec::new(),
            assessment_history: Vec::new(),
            quiz_history: Vec::new(),
            chat_history: Vec::new(),
            recommendations: vec![
                "Take an assessment to determine your starting level.".into(),
                "Start a conversation in the Chat page to practice.".into(),
                "Try the Spelling Game to learn new words.".into(),
            ],
            learning_plan: Vec::new(),
        }
    }

    /// Update the learning streak for a login at `now`.
    ///
    /// Consecutive-day logins extend the streak, a gap restarts it at 1, a
    /// second login on the same day changes nothing but the login timestamp.
    pub fn touch_login(&mut self, now: DateTime<Utc>) {
        let previous = DateTime::<Utc>::from_timestamp_millis(self.profile.last_login)
            .unwrap_or(now);
        let day_gap = now.date_naive().num_days_from_ce() - previous.date_naive().num_days_from_ce();
        if self.profile.learning_streak == 0 || day_gap > 1 || day_gap < 0 {
            self.profile.learning_streak = 1;
        } else if day_gap == 1 {
            self.profile.learning_streak += 1;
        }
        self.profile.last_login = now.timestamp_millis();
    }

    /// True when `word` is already in the learned vocabulary, matched
    /// case-insensitively.
    pub fn knows_word(&self, word: &str) -> bool {
        self.vocabulary
            .iter()
            .any(|v| v.word.eq_ignore_ascii_case(word))
    }

    /// Serialize the whole document for export as a single JSON file.
    pub fn export_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Parse an exported document. Rejects anything not matching the
    /// document shape outright; on success, colliding unique ids in the
    /// append-only collections are regenerated so the invariant holds.
    pub fn import_json(text: &str) -> Result<Self, DocumentError> {
        let mut document: Self = serde_json::from_str(text)?;
        document.regenerate_colliding_ids();
        Ok(document)
    }

    fn regenerate_colliding_ids(&mut self) {
        let mut seen = HashSet::new();
        for slip in &mut self.grammar_errors {
            if !seen.insert(slip.id.clone()) {
                slip.id = Uuid::new_v4().to_string();
                seen.insert(slip.id.clone());
            }
        }
        let mut seen = HashSet::new();
        for task in &mut self.learning_plan {
            if !seen.insert(task.id.clone()) {
                task.id = Uuid::new_v4().to_string();
                seen.insert(task.id.clone());
            }
        }
    }
}

/// Rounded percentage mean over all quiz records.
pub fn quiz_average(history: &[QuizRecord]) -> u32 {
    if history.is_empty() {
        return 0;
    }
    let sum: f64 = history
        .iter()
        .filter(|q| q.total > 0)
        .map(|q| f64::from(q.score) / f64::from(q.total))
        .sum();
    ((sum / history.len() as f64) * 100.0).round() as u32
}
