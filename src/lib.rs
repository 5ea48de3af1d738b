//! # lingo-engine
//!
//! Adaptive learning optimization engine for language study. Given a
//! learner's response history, the engine decides how capable the learner is
//! in each linguistic component, how likely a previously-seen item still is
//! to be recalled, which candidate is most valuable to present next, and
//! which component is the root cause when learning stalls.
//!
//! ## Modules
//!
//! - [`ability`] - IRT ability estimation (MLE / EAP) and max-information
//!   item selection
//! - [`memory`] - forgetting-curve scheduler with a four-state review
//!   machine and derived mastery stages
//! - [`collocation`] - windowed co-occurrence index with PMI / NPMI and G²
//!   significance
//! - [`priority`] - value/cost candidate ranking with deterministic
//!   tie-breaks
//! - [`bottleneck`] - cascading per-component diagnosis over the
//!   {PHON, MORPH, LEX, SYNT, PRAG} chain
//! - [`store`] - snapshot shapes and the optimistic-concurrency persistence
//!   contract
//! - [`sanitize`] - input validation and numeric guards
//!
//! Every operation is a synchronous, deterministic pure function of
//! explicitly passed state: no shared mutable globals, so per-candidate and
//! per-learner work parallelizes safely. The engine is a library with no
//! wire protocol; callers supply plain records and receive plain records.

pub mod ability;
pub mod bottleneck;
pub mod collocation;
pub mod error;
pub mod memory;
pub mod priority;
pub mod sanitize;
pub mod store;
pub mod types;

pub use ability::{
    estimate_ability, select_next_item, AbilityEstimate, AbilityProfile, EstimationMethod,
    ItemCandidate, ItemResponse,
};
pub use bottleneck::{BottleneckConfig, BottleneckReport, ErrorWindow};
pub use collocation::{
    build_index, CancelToken, Collocation, CollocationHandle, CollocationIndex, IndexBuilder,
};
pub use error::EngineError;
pub use memory::{
    mastery_stage, retrievability, review_response, MemoryState, ReviewOutcome, ReviewState,
    SchedulerParams,
};
pub use priority::{rank_candidates, PriorityScore, PriorityWeights, RankedItem, RankingRequest};
pub use store::{
    CollocationSnapshot, InMemoryStore, MemorySnapshot, SnapshotStore,
};
pub use types::{now_ms, Candidate, ItemParams, LinguisticComponent, Rating, ResponseEvent};
