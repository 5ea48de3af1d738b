//! Common Types and Constants
//!
//! Shared data structures used across all engine modules.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

// ==================== Constants ====================

/// Numerical stability epsilon
pub const EPSILON: f64 = 1e-10;

/// Lower clamp for ability estimates
pub const THETA_MIN: f64 = -4.0;

/// Upper clamp for ability estimates
pub const THETA_MAX: f64 = 4.0;

/// Standard error reported when no responses exist
pub const MAX_STANDARD_ERROR: f64 = 2.0;

/// Maximum cue level accepted on a response
pub const MAX_CUE_LEVEL: u8 = 3;

/// Cue-free correct answers faster than this are rated Easy
pub const FAST_RESPONSE_MS: i64 = 3000;

/// Co-occurrence window for collocation counting (tokens ahead)
pub const COLLOCATION_WINDOW: usize = 5;

/// Dunning G² value for p < 0.05 with one degree of freedom
pub const SIGNIFICANCE_THRESHOLD: f64 = 3.84;

// ==================== Linguistic Components ====================

/// The five linguistic components tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinguisticComponent {
    Phonology,
    Morphology,
    Lexicon,
    Syntax,
    Pragmatics,
}

impl LinguisticComponent {
    /// Processability-theory acquisition order: upstream competence gates
    /// downstream competence. Consumed as a single configuration value so the
    /// theory-to-code mapping stays auditable and swappable.
    pub const CASCADE: [LinguisticComponent; 5] = [
        LinguisticComponent::Phonology,
        LinguisticComponent::Morphology,
        LinguisticComponent::Lexicon,
        LinguisticComponent::Syntax,
        LinguisticComponent::Pragmatics,
    ];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "phon" | "phonology" => Some(LinguisticComponent::Phonology),
            "morph" | "morphology" => Some(LinguisticComponent::Morphology),
            "lex" | "lexicon" => Some(LinguisticComponent::Lexicon),
            "synt" | "syntax" => Some(LinguisticComponent::Syntax),
            "prag" | "pragmatics" => Some(LinguisticComponent::Pragmatics),
            _ => None,
        }
    }

    pub fn to_index(&self) -> usize {
        match self {
            LinguisticComponent::Phonology => 0,
            LinguisticComponent::Morphology => 1,
            LinguisticComponent::Lexicon => 2,
            LinguisticComponent::Syntax => 3,
            LinguisticComponent::Pragmatics => 4,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LinguisticComponent::Phonology => "PHON",
            LinguisticComponent::Morphology => "MORPH",
            LinguisticComponent::Lexicon => "LEX",
            LinguisticComponent::Syntax => "SYNT",
            LinguisticComponent::Pragmatics => "PRAG",
        }
    }
}

// ==================== Response Records ====================

/// A single learner response, supplied by the session collaborator.
///
/// Correctness is a caller-supplied boolean; the engine performs no
/// free-text understanding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub object_id: String,
    pub component: LinguisticComponent,
    pub correct: bool,
    /// 0 = cue-free; 1..=3 = increasing scaffolding
    pub cue_level: u8,
    pub response_time_ms: i64,
    /// Milliseconds since the UNIX epoch, UTC
    pub timestamp_ms: i64,
}

// ==================== Item Parameters ====================

/// Logistic item parameters (3PL; set `guessing` to 0 for 2PL, and
/// additionally `discrimination` to 1 for 1PL).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ItemParams {
    /// Discrimination (a); must be strictly positive
    pub discrimination: f64,
    /// Difficulty (b) on the theta scale
    pub difficulty: f64,
    /// Pseudo-guessing (c) in [0, 1)
    pub guessing: f64,
}

impl ItemParams {
    /// Validated constructor. Invalid parameters are a configuration error,
    /// fatal at construction time.
    pub fn new(discrimination: f64, difficulty: f64, guessing: f64) -> Result<Self, EngineError> {
        if !discrimination.is_finite() || discrimination <= 0.0 {
            return Err(EngineError::InvalidItemParams(format!(
                "discrimination must be finite and positive, got {discrimination}"
            )));
        }
        if !difficulty.is_finite() {
            return Err(EngineError::InvalidItemParams(
                "difficulty must be finite".to_string(),
            ));
        }
        if !guessing.is_finite() || !(0.0..1.0).contains(&guessing) {
            return Err(EngineError::InvalidItemParams(format!(
                "guessing must lie in [0, 1), got {guessing}"
            )));
        }
        Ok(Self {
            discrimination,
            difficulty,
            guessing,
        })
    }

    /// 2PL item (no guessing).
    pub fn two_pl(discrimination: f64, difficulty: f64) -> Result<Self, EngineError> {
        Self::new(discrimination, difficulty, 0.0)
    }

    /// 1PL (Rasch) item.
    pub fn rasch(difficulty: f64) -> Result<Self, EngineError> {
        Self::new(1.0, difficulty, 0.0)
    }
}

// ==================== Ratings ====================

/// Review quality derived from the raw response record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    /// Derivation rule: incorrect answers always rate Again; a correct answer
    /// that needed a cue rates Hard; cue-free correct answers split on
    /// response time.
    pub fn from_response(correct: bool, cue_level: u8, response_time_ms: i64) -> Self {
        if !correct {
            return Self::Again;
        }
        if cue_level > 0 {
            return Self::Hard;
        }
        if response_time_ms < FAST_RESPONSE_MS {
            Self::Easy
        } else {
            Self::Good
        }
    }

    pub fn is_pass(&self) -> bool {
        !matches!(self, Rating::Again)
    }
}

// ==================== Candidates ====================

/// A candidate learning object supplied by the content collaborator. The
/// engine never invents candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub object_id: String,
    /// Token used for collocation lookups (usually the surface form)
    pub token: String,
    /// 1 = most frequent in the corpus
    pub frequency_rank: u32,
    pub domain_tags: Vec<String>,
    /// Base difficulty on the same 0-10 scale as memory difficulty
    pub base_difficulty: f64,
}

// ==================== Time ====================

/// Current wall-clock time in milliseconds since the UNIX epoch, UTC.
/// Engine operations take explicit timestamps; this is the conventional
/// source for callers that work in real time.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ==================== Tests ====================
