//! Synthesis cost estimate for a finished transcript.

use serde::Serialize;

use crate::models::Message;

/// USD per 1000 characters of synthesized speech.
pub const DEFAULT_COST_PER_1K_CHARS: f64 = 0.30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub characters: usize,
    pub message_count: usize,
    /// USD, rounded to cents
    pub estimated_cost: f64,
}

pub fn estimate(utterances: &[Message], cost_per_1k_chars: f64) -> CostEstimate {
    let characters = utterances.iter().map(|m| m.text.chars().count()).sum();
    let raw = characters as f64 * cost_per_1k_chars / 1000.0;
    CostEstimate {
        characters,
        message_count: utterances.len(),
        estimated_cost: (raw * 100.0).round() / 100.0,
    }
}
