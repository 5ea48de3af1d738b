//! Priority Scoring and Candidate Ranking
//!
//! Scores each candidate as Value / Cost and returns a deterministically
//! ordered selection. Value combines corpus frequency, relational density
//! from the collocation index, and domain relevance. Cost combines base
//! difficulty, a transfer discount for well-connected known material, and an
//! exposure-need term, then is modulated by mastery adjustment (automated
//! objects cost more to re-practice) and review urgency (low retrievability
//! makes an object cheaper to justify).
//!
//! Scoring is a pure function of the request, so candidates are fanned out
//! across a rayon pool and merged with explicit tie-break rules.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collocation::CollocationIndex;
use crate::memory::{
    due_for_review, mastery_stage, next_interval, retrievability, MemoryState, SchedulerParams,
    MS_PER_DAY,
};
use crate::types::{Candidate, EPSILON};

/// Collocates consulted per candidate for the relational-density term.
const DENSITY_NEIGHBORS: usize = 10;

/// Mastery stage at which a related known token grants transfer discount.
const TRANSFER_MASTERY_STAGE: u8 = 3;

// ==================== Configuration ====================

/// Independent weights for every value and cost term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub frequency_weight: f64,
    pub relation_weight: f64,
    pub relevance_weight: f64,
    pub difficulty_weight: f64,
    pub transfer_weight: f64,
    pub exposure_weight: f64,
    /// Repetitions below this count add exposure-need cost.
    pub target_exposures: u32,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            frequency_weight: 1.0,
            relation_weight: 0.8,
            relevance_weight: 0.5,
            difficulty_weight: 1.0,
            transfer_weight: 0.4,
            exposure_weight: 0.6,
            target_exposures: 5,
        }
    }
}

/// Everything a scoring pass reads. The engine never invents candidates;
/// the content collaborator supplies them already annotated.
pub struct RankingRequest<'a> {
    pub candidates: &'a [Candidate],
    pub collocations: &'a CollocationIndex,
    /// Per-object memory state keyed by object id; absent means never scheduled.
    pub memory: &'a HashMap<String, MemoryState>,
    /// Tokens the learner already commands, with their mastery stage.
    pub known_tokens: &'a HashMap<String, u8>,
    /// Domains the current session is focused on; empty means no focus.
    pub active_domains: &'a [String],
    pub now_ms: i64,
}

// ==================== Score Breakdown ====================

/// Ephemeral per-request breakdown. Reproducible from its stated inputs and
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityScore {
    pub object_id: String,
    pub frequency_value: f64,
    pub relation_value: f64,
    pub relevance_value: f64,
    pub value: f64,
    pub difficulty_cost: f64,
    pub transfer_discount: f64,
    pub exposure_need: f64,
    pub mastery_adjustment: f64,
    pub urgency_modifier: f64,
    pub cost: f64,
    pub score: f64,
}

/// Ranked output record handed to the task collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedItem {
    pub object_id: String,
    pub score: f64,
    pub due_for_review: bool,
}

// ==================== Value Terms ====================

/// Frequency value in (0, 1]: rank 1 scores 1.0, decaying with log rank.
fn frequency_value(frequency_rank: u32) -> f64 {
    let rank = frequency_rank.max(1) as f64;
    1.0 / (1.0 + rank.ln())
}

/// Relational density in [0, 1]: mean positive NPMI over the candidate's
/// significant collocates. Isolated tokens score 0.
fn relation_value(index: &CollocationIndex, token: &str) -> f64 {
    let neighbors = index.top_collocations(token, DENSITY_NEIGHBORS);
    if neighbors.is_empty() {
        return 0.0;
    }
    let sum: f64 = neighbors.iter().map(|c| c.npmi.max(0.0)).sum();
    (sum / DENSITY_NEIGHBORS as f64).clamp(0.0, 1.0)
}

/// Fraction of the candidate's domain tags in the active set. With no active
/// focus every candidate is equally relevant.
fn relevance_value(candidate: &Candidate, active_domains: &[String]) -> f64 {
    if active_domains.is_empty() {
        return 1.0;
    }
    if candidate.domain_tags.is_empty() {
        return 0.0;
    }
    let matched = candidate
        .domain_tags
        .iter()
        .filter(|tag| active_domains.contains(tag))
        .count();
    matched as f64 / candidate.domain_tags.len() as f64
}

// ==================== Cost Terms ====================

/// Transfer discount in [0, 1]: fraction of the candidate's significant
/// collocates that the learner already commands at a high mastery stage.
/// Well-connected material is cheaper to acquire.
fn transfer_discount(
    index: &CollocationIndex,
    token: &str,
    known_tokens: &HashMap<String, u8>,
) -> f64 {
    let neighbors = index.top_collocations(token, DENSITY_NEIGHBORS);
    if neighbors.is_empty() {
        return 0.0;
    }
    let known = neighbors
        .iter()
        .filter(|c| {
            known_tokens
                .get(&c.token)
                .is_some_and(|&stage| stage >= TRANSFER_MASTERY_STAGE)
        })
        .count();
    known as f64 / neighbors.len() as f64
}

/// Exposure need in [0, 1]: under-exposed objects cost more because they
/// still need repetitions before they pay off.
fn exposure_need(reps: u32, target: u32) -> f64 {
    if target == 0 || reps >= target {
        return 0.0;
    }
    (target - reps) as f64 / target as f64
}

/// Cost multiplier per mastery stage. Automated objects (stage 3-4) are
/// penalized so the selection does not over-practice them.
fn mastery_adjustment(stage: u8) -> f64 {
    match stage {
        4 => 4.0,
        3 => 1.5,
        _ => 1.0,
    }
}

/// Cost multiplier from current retrievability. A fading memory is urgent,
/// so low retrievability lowers effective cost. Unscheduled objects get 1.0.
fn urgency_modifier(retrievability: f64) -> f64 {
    0.25 + 0.75 * retrievability.clamp(0.0, 1.0)
}

// ==================== Scoring ====================

/// Score one candidate. Pure function of the request; Cost is floored at
/// epsilon before division so the score is always finite and >= 0.
pub fn score_candidate(request: &RankingRequest<'_>, candidate: &Candidate) -> PriorityScore {
    let weights = PriorityWeights::default();
    score_candidate_with(request, candidate, &weights)
}

pub fn score_candidate_with(
    request: &RankingRequest<'_>,
    candidate: &Candidate,
    weights: &PriorityWeights,
) -> PriorityScore {
    let frequency = frequency_value(candidate.frequency_rank);
    let relation = relation_value(request.collocations, &candidate.token);
    let relevance = relevance_value(candidate, request.active_domains);
    let value = weights.frequency_weight * frequency
        + weights.relation_weight * relation
        + weights.relevance_weight * relevance;

    let state = request.memory.get(&candidate.object_id);
    let stage = state.map(mastery_stage).unwrap_or(0);
    let reps = state.map(|s| s.reps.max(0) as u32).unwrap_or(0);
    let current_r = state
        .filter(|s| !s.is_new())
        .map(|s| retrievability(s.stability, s.elapsed_days(request.now_ms)))
        .unwrap_or(1.0);

    let difficulty = (candidate.base_difficulty / 10.0).clamp(0.0, 1.0);
    let transfer = transfer_discount(request.collocations, &candidate.token, request.known_tokens);
    let need = exposure_need(reps, weights.target_exposures);
    let adjustment = mastery_adjustment(stage);
    let urgency = urgency_modifier(current_r);

    let raw_cost = weights.difficulty_weight * difficulty - weights.transfer_weight * transfer
        + weights.exposure_weight * need;
    let cost = (raw_cost * adjustment * urgency).max(EPSILON);

    PriorityScore {
        object_id: candidate.object_id.clone(),
        frequency_value: frequency,
        relation_value: relation,
        relevance_value: relevance,
        value,
        difficulty_cost: difficulty,
        transfer_discount: transfer,
        exposure_need: need,
        mastery_adjustment: adjustment,
        urgency_modifier: urgency,
        cost,
        score: value.max(0.0) / cost,
    }
}

/// Due timestamp used for tie-breaking. Unscheduled objects are due now.
fn due_timestamp_ms(state: Option<&MemoryState>, now_ms: i64, params: &SchedulerParams) -> i64 {
    match state.filter(|s| !s.is_new()) {
        Some(s) => {
            let interval = next_interval(s.stability, params.desired_retention);
            s.last_review_ms + (interval * MS_PER_DAY) as i64
        }
        None => now_ms,
    }
}

/// Rank every candidate. Scoring fans out across the rayon pool; the merge
/// sorts descending by score with deterministic tie-breaks: earlier due
/// date, then lower mastery stage, then original candidate order.
pub fn rank_candidates(
    request: &RankingRequest<'_>,
    weights: &PriorityWeights,
) -> Vec<RankedItem> {
    let params = SchedulerParams::default();

    let mut scored: Vec<(usize, PriorityScore, i64, u8, bool)> = request
        .candidates
        .par_iter()
        .enumerate()
        .map(|(position, candidate)| {
            let score = score_candidate_with(request, candidate, weights);
            let state = request.memory.get(&candidate.object_id);
            let due_ms = due_timestamp_ms(state, request.now_ms, &params);
            let stage = state.map(mastery_stage).unwrap_or(0);
            let due = state
                .map(|s| due_for_review(s, request.now_ms, &params))
                .unwrap_or(false);
            (position, score, due_ms, stage, due)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.2.cmp(&b.2))
            .then_with(|| a.3.cmp(&b.3))
            .then_with(|| a.0.cmp(&b.0))
    });

    debug!(
        candidates = request.candidates.len(),
        top = scored.first().map(|s| s.1.object_id.as_str()).unwrap_or(""),
        "ranked candidate batch"
    );

    scored
        .into_iter()
        .map(|(_, score, _, _, due)| RankedItem {
            object_id: score.object_id,
            score: score.score,
            due_for_review: due,
        })
        .collect()
}

// ==================== Tests ====================
