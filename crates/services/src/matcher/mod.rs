//! Competitive speaker matching: top-k retrieval per diarized speaker,
//! one optimal bipartite assignment across the whole meeting, then
//! per-speaker confidence tiers.

mod hungarian;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::vector::{VectorError, VectorIndex};

pub use hungarian::minimum_cost_assignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Auto-assign: score and margin both clear their thresholds and the
    /// name was won uniquely.
    High,
    /// Needs user confirmation between candidates.
    Medium,
    /// Unknown speaker; candidates returned only as UI hints.
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub name: String,
    pub score: f32,
}

/// Matching outcome for one diarized speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerMatch {
    pub confidence: Confidence,
    pub assigned_name: Option<String>,
    pub top_score: f32,
    pub margin: f32,
    pub candidates: Vec<MatchCandidate>,
}

impl SpeakerMatch {
    /// Placeholder for a speaker with nothing to match against.
    pub fn unmatched() -> Self {
        Self {
            confidence: Confidence::Low,
            assigned_name: None,
            top_score: 0.0,
            margin: 0.0,
            candidates: Vec::new(),
        }
    }

    pub fn needs_confirmation(&self) -> bool {
        self.confidence == Confidence::Medium
    }

    pub fn needs_naming(&self) -> bool {
        self.confidence == Confidence::Low
    }
}

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Minimum cosine score for a candidate to count as a match.
    pub score_threshold: f32,
    /// Minimum top-1/top-2 gap for high confidence.
    pub high_margin: f32,
    /// Candidates retrieved per speaker.
    pub top_k: usize,
    /// Cost for (speaker, name) pairs the index never surfaced
    /// (similarity -1, effectively unreachable).
    pub unseen_cost: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.55,
            high_margin: 0.10,
            top_k: 5,
            unseen_cost: 2.0,
        }
    }
}

/// Matches every diarized speaker against the enrolled set.
///
/// One Hungarian assignment over the full meeting guarantees that no two
/// speakers can both win the same enrolled name; the loser of a contested
/// name falls back to its own top candidate and can reach at most medium.
pub async fn match_speakers(
    embeddings: &BTreeMap<String, Vec<f32>>,
    index: &dyn VectorIndex,
    config: &MatcherConfig,
) -> Result<HashMap<String, SpeakerMatch>, VectorError> {
    let mut results: HashMap<String, SpeakerMatch> = HashMap::new();
    let mut neighbor_sets: Vec<(String, Vec<MatchCandidate>)> = Vec::new();

    for (speaker_id, embedding) in embeddings {
        let mut hits = index.query(embedding, config.top_k).await?;
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        let candidates: Vec<MatchCandidate> = hits
            .into_iter()
            .map(|(name, score)| MatchCandidate { name, score })
            .collect();

        if candidates.is_empty() {
            results.insert(speaker_id.clone(), SpeakerMatch::unmatched());
        } else {
            neighbor_sets.push((speaker_id.clone(), candidates));
        }
    }

    if neighbor_sets.is_empty() {
        return Ok(results);
    }

    // Cost matrix over all speakers with neighbors x the union of names.
    let names: Vec<String> = neighbor_sets
        .iter()
        .flat_map(|(_, candidates)| candidates.iter().map(|c| c.name.clone()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let score_of = |candidates: &[MatchCandidate], name: &str| -> Option<f32> {
        candidates
            .iter()
            .filter(|c| c.name == name)
            .map(|c| c.score)
            .fold(None, |acc: Option<f32>, s| {
                Some(acc.map_or(s, |best| best.max(s)))
            })
    };

    let cost: Vec<Vec<f64>> = neighbor_sets
        .iter()
        .map(|(_, candidates)| {
            names
                .iter()
                .map(|name| match score_of(candidates, name) {
                    Some(score) => 1.0 - score as f64,
                    None => config.unseen_cost,
                })
                .collect()
        })
        .collect();

    let assignment = minimum_cost_assignment(&cost);

    for (row, (speaker_id, candidates)) in neighbor_sets.into_iter().enumerate() {
        // The pairing survives only if the index actually surfaced that
        // (speaker, name) pair; a pairing created through the unseen cost
        // is an artifact of padding.
        let paired_name = assignment[row]
            .map(|col| names[col].clone())
            .filter(|name| score_of(&candidates, name).is_some());

        let uniquely_assigned = paired_name.is_some();
        let assigned = paired_name.unwrap_or_else(|| candidates[0].name.clone());
        let top_score = score_of(&candidates, &assigned).unwrap_or(0.0);

        let second_best = candidates
            .iter()
            .filter(|c| c.name != assigned)
            .map(|c| c.score)
            .fold(None::<f32>, |acc, s| Some(acc.map_or(s, |best| best.max(s))));
        let margin = top_score - second_best.unwrap_or(0.0);

        let (confidence, assigned_name) = classify(
            top_score,
            margin,
            uniquely_assigned,
            config,
        );
        let assigned_name = assigned_name.then_some(assigned);

        debug!(
            speaker = %speaker_id,
            ?confidence,
            top_score,
            margin,
            assigned = assigned_name.as_deref().unwrap_or("-"),
            "speaker classified"
        );

        results.insert(
            speaker_id,
            SpeakerMatch {
                confidence,
                assigned_name,
                top_score,
                margin,
                candidates,
            },
        );
    }

    let high = results
        .values()
        .filter(|m| m.confidence == Confidence::High)
        .count();
    info!(
        speakers = results.len(),
        auto_assigned = high,
        "competitive matching complete"
    );

    Ok(results)
}

/// Confidence tier for one speaker given its competitive standing.
fn classify(
    top_score: f32,
    margin: f32,
    uniquely_assigned: bool,
    config: &MatcherConfig,
) -> (Confidence, bool) {
    if top_score >= config.score_threshold
        && margin >= config.high_margin
        && uniquely_assigned
    {
        (Confidence::High, true)
    } else if top_score >= config.score_threshold {
        (Confidence::Medium, false)
    } else {
        (Confidence::Low, false)
    }
}
