//! IRT Ability Estimation
//!
//! Per learner, per linguistic component, estimates a continuous ability
//! (theta) from a history of scored item responses:
//!
//! - `item_probability` - 1PL/2PL/3PL logistic response model
//! - `estimate_ability` - maximum likelihood (Fisher scoring) or EAP
//!   (quadrature over a standard-normal prior)
//! - `select_next_item` - maximum Fisher information item selection
//!
//! Degenerate response sets (all correct / all incorrect) have no interior
//! likelihood maximum; the estimator clamps to [THETA_MIN, THETA_MAX] and
//! flags the result as a boundary estimate instead of diverging.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{
    ItemParams, LinguisticComponent, EPSILON, MAX_STANDARD_ERROR, THETA_MAX, THETA_MIN,
};

/// Fisher-scoring iteration cap
const MAX_ITERATIONS: usize = 50;

/// Convergence threshold on the theta update
const CONVERGENCE_THRESHOLD: f64 = 1e-6;

/// Quadrature grid size for EAP
const QUADRATURE_POINTS: usize = 61;

/// Below this many responses an estimate is flagged low-confidence
const MIN_STABLE_RESPONSES: usize = 5;

// ==================== Records ====================

/// One scored response in an ability history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResponse {
    pub params: ItemParams,
    pub correct: bool,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimationMethod {
    Mle,
    Eap,
}

/// Ability estimate with explicit soft-condition flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityEstimate {
    pub theta: f64,
    pub standard_error: f64,
    pub method: EstimationMethod,
    /// True when the likelihood had no interior maximum (or Fisher scoring
    /// failed to converge) and theta was clamped to the boundary.
    pub boundary: bool,
    /// True when the response count is too small for a stable estimate.
    pub low_confidence: bool,
    pub sample_size: usize,
}

impl AbilityEstimate {
    /// Documented prior default for an empty history: theta 0, maximal SE.
    fn prior_default(method: EstimationMethod) -> Self {
        Self {
            theta: 0.0,
            standard_error: MAX_STANDARD_ERROR,
            method,
            boundary: false,
            low_confidence: true,
            sample_size: 0,
        }
    }
}

/// Append-only ability history for one (learner, component) pair. Theta is
/// always a pure recomputation from the history, never hand-edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityProfile {
    pub learner_id: String,
    pub component: LinguisticComponent,
    pub responses: Vec<ItemResponse>,
    /// Optimistic-concurrency version, bumped by the persistence collaborator
    pub version: u64,
}

impl AbilityProfile {
    pub fn new(learner_id: impl Into<String>, component: LinguisticComponent) -> Self {
        Self {
            learner_id: learner_id.into(),
            component,
            responses: Vec::new(),
            version: 0,
        }
    }

    pub fn record(&mut self, params: ItemParams, correct: bool, timestamp_ms: i64) {
        self.responses.push(ItemResponse {
            params,
            correct,
            timestamp_ms,
        });
    }

    pub fn estimate(&self, method: EstimationMethod) -> AbilityEstimate {
        estimate_ability(&self.responses, method)
    }
}

// ==================== Response Model ====================

/// P(correct | theta) under the 3PL logistic model:
/// `c + (1 - c) / (1 + exp(-a (theta - b)))`.
///
/// Strictly increasing in theta for any valid item parameters.
pub fn item_probability(theta: f64, item: &ItemParams) -> f64 {
    let exponent = -item.discrimination * (theta - item.difficulty);
    item.guessing + (1.0 - item.guessing) / (1.0 + exponent.exp())
}

/// Fisher information I(theta) for one item.
///
/// 3PL form: `a^2 * (q/p) * ((p - c) / (1 - c))^2`; reduces to the familiar
/// `a^2 p q` when c = 0. Items whose difficulty is far from theta contribute
/// near-zero information.
pub fn fisher_information(theta: f64, item: &ItemParams) -> f64 {
    let p = item_probability(theta, item).clamp(EPSILON, 1.0 - EPSILON);
    let q = 1.0 - p;
    let a = item.discrimination;
    let c = item.guessing;
    let adjusted = (p - c) / (1.0 - c);
    a * a * (q / p) * adjusted * adjusted
}

// ==================== Estimation ====================

/// Estimate ability from a response history.
///
/// An empty history returns the documented prior default (theta 0, maximal
/// standard error, low-confidence flag) rather than failing.
pub fn estimate_ability(responses: &[ItemResponse], method: EstimationMethod) -> AbilityEstimate {
    if responses.is_empty() {
        return AbilityEstimate::prior_default(method);
    }
    match method {
        EstimationMethod::Mle => estimate_mle(responses),
        EstimationMethod::Eap => estimate_eap(responses),
    }
}

fn estimate_mle(responses: &[ItemResponse]) -> AbilityEstimate {
    let n = responses.len();
    let all_correct = responses.iter().all(|r| r.correct);
    let all_incorrect = responses.iter().all(|r| !r.correct);

    // Monotone likelihood: no interior maximum. Clamp and flag.
    if all_correct || all_incorrect {
        let theta = if all_correct { THETA_MAX } else { THETA_MIN };
        warn!(
            sample_size = n,
            theta, "degenerate response set, returning boundary MLE"
        );
        return AbilityEstimate {
            theta,
            standard_error: standard_error_at(theta, responses),
            method: EstimationMethod::Mle,
            boundary: true,
            low_confidence: n < MIN_STABLE_RESPONSES,
            sample_size: n,
        };
    }

    // Fisher scoring: theta += score / information.
    let mut theta = 0.0;
    let mut converged = false;
    for _ in 0..MAX_ITERATIONS {
        let mut score = 0.0;
        let mut information = 0.0;
        for r in responses {
            let p = item_probability(theta, &r.params).clamp(EPSILON, 1.0 - EPSILON);
            let u = if r.correct { 1.0 } else { 0.0 };
            let c = r.params.guessing;
            let weight = (p - c) / ((1.0 - c) * p);
            score += r.params.discrimination * weight * (u - p);
            information += fisher_information(theta, &r.params);
        }
        if information < EPSILON {
            break;
        }
        let delta = score / information;
        theta = (theta + delta).clamp(THETA_MIN, THETA_MAX);
        if delta.abs() < CONVERGENCE_THRESHOLD {
            converged = true;
            break;
        }
    }

    let boundary = !converged || theta <= THETA_MIN || theta >= THETA_MAX;
    if boundary {
        warn!(theta, sample_size = n, "MLE did not settle interior, flagging boundary estimate");
    }

    AbilityEstimate {
        theta,
        standard_error: standard_error_at(theta, responses),
        method: EstimationMethod::Mle,
        boundary,
        low_confidence: n < MIN_STABLE_RESPONSES,
        sample_size: n,
    }
}

fn estimate_eap(responses: &[ItemResponse]) -> AbilityEstimate {
    // Fixed-grid quadrature over [THETA_MIN, THETA_MAX] with a standard
    // normal prior. Likelihood is accumulated in log space to avoid
    // underflow on long histories.
    let n = responses.len();
    let step = (THETA_MAX - THETA_MIN) / (QUADRATURE_POINTS - 1) as f64;

    let mut nodes = [0.0; QUADRATURE_POINTS];
    let mut log_weights = [0.0; QUADRATURE_POINTS];
    let mut max_log = f64::NEG_INFINITY;

    for (k, node) in nodes.iter_mut().enumerate() {
        let theta = THETA_MIN + step * k as f64;
        *node = theta;
        let mut log_w = -0.5 * theta * theta; // standard normal prior kernel
        for r in responses {
            let p = item_probability(theta, &r.params).clamp(EPSILON, 1.0 - EPSILON);
            log_w += if r.correct { p.ln() } else { (1.0 - p).ln() };
        }
        log_weights[k] = log_w;
        max_log = max_log.max(log_w);
    }

    let mut total = 0.0;
    let mut mean = 0.0;
    for k in 0..QUADRATURE_POINTS {
        let w = (log_weights[k] - max_log).exp();
        total += w;
        mean += nodes[k] * w;
    }
    mean /= total;

    let mut variance = 0.0;
    for k in 0..QUADRATURE_POINTS {
        let w = (log_weights[k] - max_log).exp();
        variance += (nodes[k] - mean).powi(2) * w;
    }
    variance /= total;

    AbilityEstimate {
        theta: mean,
        standard_error: variance.sqrt().min(MAX_STANDARD_ERROR),
        method: EstimationMethod::Eap,
        boundary: false,
        low_confidence: n < MIN_STABLE_RESPONSES,
        sample_size: n,
    }
}

fn standard_error_at(theta: f64, responses: &[ItemResponse]) -> f64 {
    let information: f64 = responses
        .iter()
        .map(|r| fisher_information(theta, &r.params))
        .sum();
    if information < EPSILON {
        MAX_STANDARD_ERROR
    } else {
        (1.0 / information.sqrt()).min(MAX_STANDARD_ERROR)
    }
}

// ==================== Item Selection ====================

/// A scoreable item offered for selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemCandidate {
    pub object_id: String,
    pub params: ItemParams,
}

/// Pick the candidate maximizing Fisher information at the current theta,
/// which maximizes measurement precision. Ties keep the earliest candidate so
/// output is reproducible. Returns `None` for an empty slice.
pub fn select_next_item<'a>(candidates: &'a [ItemCandidate], theta: f64) -> Option<&'a ItemCandidate> {
    let mut best: Option<(&ItemCandidate, f64)> = None;
    for candidate in candidates {
        let info = fisher_information(theta, &candidate.params);
        match best {
            Some((_, best_info)) if info <= best_info => {}
            _ => best = Some((candidate, info)),
        }
    }
    best.map(|(candidate, _)| candidate)
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn two_pl(a: f64, b: f64) -> ItemParams {
        ItemParams::two_pl(a, b).unwrap()
    }

    fn response(params: ItemParams, correct: bool) -> ItemResponse {
        ItemResponse {
            params,
            correct,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_item_probability_at_difficulty() {
        // At theta == b the 2PL probability is exactly 0.5
        let item = two_pl(1.2, 0.3);
        assert!((item_probability(0.3, &item) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_item_probability_guessing_floor() {
        let item = ItemParams::new(1.0, 0.0, 0.25).unwrap();
        // Very low ability still answers at roughly the guessing rate
        assert!(item_probability(-10.0, &item) > 0.24);
        assert!(item_probability(-10.0, &item) < 0.26);
    }

    #[test]
    fn test_mle_matches_closed_form_reference() {
        // Three correct and one incorrect on the same 2PL item (a=1.2, b=0.3)
        // maximizes at p = 3/4, i.e. theta = b + ln(3)/a = 1.21552...
        let item = two_pl(1.2, 0.3);
        let responses = vec![
            response(item, true),
            response(item, true),
            response(item, false),
            response(item, true),
        ];
        let estimate = estimate_ability(&responses, EstimationMethod::Mle);
        let reference = 0.3 + (3.0f64).ln() / 1.2;
        assert!(
            (estimate.theta - reference).abs() < 1e-3,
            "theta {} should be within 1e-3 of {}",
            estimate.theta,
            reference
        );
        assert!(!estimate.boundary);
        assert_eq!(estimate.sample_size, 4);
    }

    #[test]
    fn test_mle_all_correct_is_boundary() {
        let item = two_pl(1.0, 0.0);
        let responses = vec![response(item, true); 6];
        let estimate = estimate_ability(&responses, EstimationMethod::Mle);
        assert!(estimate.boundary);
        assert_eq!(estimate.theta, THETA_MAX);
        assert!(!estimate.low_confidence);
    }

    #[test]
    fn test_mle_all_incorrect_is_boundary() {
        let item = two_pl(1.0, 0.0);
        let responses = vec![response(item, false); 3];
        let estimate = estimate_ability(&responses, EstimationMethod::Mle);
        assert!(estimate.boundary);
        assert_eq!(estimate.theta, THETA_MIN);
        assert!(estimate.low_confidence);
    }

    #[test]
    fn test_zero_responses_returns_prior_default() {
        let estimate = estimate_ability(&[], EstimationMethod::Mle);
        assert_eq!(estimate.theta, 0.0);
        assert_eq!(estimate.standard_error, MAX_STANDARD_ERROR);
        assert!(estimate.low_confidence);
        assert!(!estimate.boundary);
    }

    #[test]
    fn test_eap_shrinks_toward_prior() {
        // EAP on a mixed history sits between the prior mean (0) and the MLE
        let item = two_pl(1.2, 0.3);
        let responses = vec![
            response(item, true),
            response(item, true),
            response(item, false),
            response(item, true),
        ];
        let eap = estimate_ability(&responses, EstimationMethod::Eap);
        let mle = estimate_ability(&responses, EstimationMethod::Mle);
        assert!(eap.theta > 0.0);
        assert!(eap.theta < mle.theta);
        assert!(eap.standard_error > 0.0);
    }

    #[test]
    fn test_eap_handles_degenerate_history() {
        // Unlike MLE, the prior keeps EAP finite and interior on all-correct
        let item = two_pl(1.0, 0.0);
        let responses = vec![response(item, true); 4];
        let estimate = estimate_ability(&responses, EstimationMethod::Eap);
        assert!(estimate.theta > 0.0);
        assert!(estimate.theta < THETA_MAX);
        assert!(!estimate.boundary);
    }

    #[test]
    fn test_select_next_item_maximizes_information() {
        let candidates = vec![
            ItemCandidate {
                object_id: "far-easy".to_string(),
                params: two_pl(1.0, -3.0),
            },
            ItemCandidate {
                object_id: "matched".to_string(),
                params: two_pl(1.0, 0.1),
            },
            ItemCandidate {
                object_id: "far-hard".to_string(),
                params: two_pl(1.0, 3.0),
            },
        ];
        let selected = select_next_item(&candidates, 0.0).unwrap();
        assert_eq!(selected.object_id, "matched");
    }

    #[test]
    fn test_select_next_item_tie_keeps_first() {
        let candidates = vec![
            ItemCandidate {
                object_id: "a".to_string(),
                params: two_pl(1.0, 0.0),
            },
            ItemCandidate {
                object_id: "b".to_string(),
                params: two_pl(1.0, 0.0),
            },
        ];
        let selected = select_next_item(&candidates, 0.0).unwrap();
        assert_eq!(selected.object_id, "a");
        assert!(select_next_item(&[], 0.0).is_none());
    }

    #[test]
    fn test_profile_estimate_is_pure_recomputation() {
        let mut profile = AbilityProfile::new("learner-1", LinguisticComponent::Lexicon);
        let item = two_pl(1.2, 0.3);
        profile.record(item, true, 1);
        profile.record(item, true, 2);
        profile.record(item, false, 3);
        profile.record(item, true, 4);

        let first = profile.estimate(EstimationMethod::Mle);
        let second = profile.estimate(EstimationMethod::Mle);
        assert_eq!(first.theta, second.theta);
        assert_eq!(profile.responses.len(), 4);
    }

    proptest! {
        #[test]
        fn prop_probability_strictly_increasing_in_theta(
            a in 0.2f64..3.0,
            b in -3.0f64..3.0,
            c in 0.0f64..0.4,
            theta in -3.5f64..3.4,
        ) {
            let item = ItemParams::new(a, b, c).unwrap();
            let lo = item_probability(theta, &item);
            let hi = item_probability(theta + 0.1, &item);
            prop_assert!(hi > lo);
        }

        #[test]
        fn prop_probability_bounded(
            a in 0.2f64..3.0,
            b in -3.0f64..3.0,
            c in 0.0f64..0.9,
            theta in -10.0f64..10.0,
        ) {
            let item = ItemParams::new(a, b, c).unwrap();
            let p = item_probability(theta, &item);
            prop_assert!(p >= c - 1e-12);
            prop_assert!(p <= 1.0);
        }
    }
}
