//! Cascading Bottleneck Diagnosis
//!
//! Processability-theory diagnosis over the fixed component cascade
//! {PHON, MORPH, LEX, SYNT, PRAG}: upstream competence gates downstream
//! competence, so a struggling upstream component should show elevated error
//! both locally and relative to the components after it in the chain.
//!
//! The cascade ordering is one explicit configuration value, not scattered
//! conditionals, so alternate orderings can be tested.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::LinguisticComponent;

// ==================== Configuration ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckConfig {
    /// Acquisition-order chain, most upstream first.
    pub cascade: Vec<LinguisticComponent>,
    /// Components with fewer exposures than this are excluded outright.
    pub min_sample: u32,
    /// Absolute error rate a candidate must exceed.
    pub error_threshold: f64,
    /// Margin by which a candidate must exceed every downstream error rate.
    pub downstream_margin: f64,
}

impl Default for BottleneckConfig {
    fn default() -> Self {
        Self {
            cascade: LinguisticComponent::CASCADE.to_vec(),
            min_sample: 10,
            error_threshold: 0.4,
            downstream_margin: 0.15,
        }
    }
}

impl BottleneckConfig {
    /// Swap in an alternate cascade ordering.
    pub fn with_cascade(mut self, cascade: Vec<LinguisticComponent>) -> Self {
        self.cascade = cascade;
        self
    }
}

// ==================== Input / Output ====================

/// Windowed per-component error tally, accumulated as a byproduct of
/// ability and scheduling updates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ComponentErrors {
    pub errors: u32,
    pub exposures: u32,
}

impl ComponentErrors {
    pub fn error_rate(&self) -> f64 {
        if self.exposures == 0 {
            return 0.0;
        }
        self.errors as f64 / self.exposures as f64
    }
}

/// Accumulator fed one response at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorWindow {
    counts: [ComponentErrors; LinguisticComponent::CASCADE.len()],
}

impl ErrorWindow {
    pub fn record(&mut self, component: LinguisticComponent, correct: bool) {
        let slot = &mut self.counts[component.to_index()];
        slot.exposures += 1;
        if !correct {
            slot.errors += 1;
        }
    }

    pub fn get(&self, component: LinguisticComponent) -> ComponentErrors {
        self.counts[component.to_index()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDiagnosis {
    pub component: LinguisticComponent,
    pub error_rate: f64,
    pub sample_size: u32,
}

/// Ephemeral diagnostic output; the underlying error events remain the
/// source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckReport {
    pub chain: Vec<ComponentDiagnosis>,
    pub primary: Option<LinguisticComponent>,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub recommendation: String,
}

// ==================== Detection ====================

/// Diagnose the most upstream component whose error pattern explains the
/// downstream struggle. No qualifying component yields `primary: None` with
/// confidence 0.
pub fn detect(window: &ErrorWindow, config: &BottleneckConfig) -> BottleneckReport {
    let chain: Vec<ComponentDiagnosis> = config
        .cascade
        .iter()
        .map(|&component| {
            let counts = window.get(component);
            ComponentDiagnosis {
                component,
                error_rate: counts.error_rate(),
                sample_size: counts.exposures,
            }
        })
        .collect();

    let mut evidence = Vec::new();
    let mut best: Option<(usize, f64)> = None;

    for (position, diagnosis) in chain.iter().enumerate() {
        if diagnosis.sample_size < config.min_sample {
            evidence.push(format!(
                "{}: excluded, only {} exposures (need {})",
                diagnosis.component.code(),
                diagnosis.sample_size,
                config.min_sample
            ));
            continue;
        }
        if diagnosis.error_rate <= config.error_threshold {
            continue;
        }

        // Must exceed every measurable downstream component by the margin.
        let downstream: Vec<&ComponentDiagnosis> = chain[position + 1..]
            .iter()
            .filter(|d| d.sample_size >= config.min_sample)
            .collect();
        let worst_downstream = downstream
            .iter()
            .map(|d| d.error_rate)
            .fold(0.0f64, f64::max);
        let margin = diagnosis.error_rate - worst_downstream;
        if !downstream.is_empty() && margin < config.downstream_margin {
            continue;
        }

        evidence.push(format!(
            "{}: error rate {:.2} over {} exposures exceeds threshold {:.2}, margin {:.2} over downstream",
            diagnosis.component.code(),
            diagnosis.error_rate,
            diagnosis.sample_size,
            config.error_threshold,
            margin
        ));

        // Most upstream qualifying component wins.
        if best.is_none() {
            let confidence = candidate_confidence(diagnosis, margin, config);
            best = Some((position, confidence));
        }
    }

    match best {
        Some((position, confidence)) => {
            let component = chain[position].component;
            debug!(
                component = component.code(),
                confidence, "bottleneck identified"
            );
            BottleneckReport {
                chain,
                primary: Some(component),
                confidence,
                evidence,
                recommendation: format!(
                    "Prioritize {} practice before advancing downstream material",
                    component.code()
                ),
            }
        }
        None => BottleneckReport {
            chain,
            primary: None,
            confidence: 0.0,
            evidence,
            recommendation: "No bottleneck detected; continue balanced practice".to_string(),
        },
    }
}

/// Confidence grows with sample size and with how far the candidate exceeds
/// both the absolute threshold and the downstream margin. Bounded to [0, 1].
fn candidate_confidence(
    diagnosis: &ComponentDiagnosis,
    margin: f64,
    config: &BottleneckConfig,
) -> f64 {
    let sample_factor = (diagnosis.sample_size as f64 / (config.min_sample as f64 * 2.0)).min(1.0);
    let threshold_excess =
        ((diagnosis.error_rate - config.error_threshold) / (1.0 - config.error_threshold))
            .clamp(0.0, 1.0);
    let margin_excess = (margin / 0.5).clamp(0.0, 1.0);
    (sample_factor * (0.5 * threshold_excess + 0.5 * margin_excess).sqrt()).clamp(0.0, 1.0)
}

// ==================== Tests ====================
