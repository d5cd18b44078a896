//! Product identity resolution.
//!
//! Votes over the labels buffered during one crossing session and picks a
//! single product name:
//!
//! 1. Drop samples below `min_confidence`.
//! 2. Group by name into `ProductVote`s, in first-seen order.
//! 3. No names left: unresolved. One name: it wins.
//! 4. Pick two contenders. When the raw buffer holds exactly two samples the
//!    first two observed names are the contenders; otherwise the two highest
//!    counts, ties going to the name seen first.
//! 5. A count lead greater than `count_margin` wins outright; otherwise the
//!    higher mean confidence wins, exact ties going to the first contender.

use anyhow::{anyhow, Result};

use crate::LabelSample;

pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.50;
pub const DEFAULT_COUNT_MARGIN: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolverConfig {
    pub min_confidence: f32,
    pub count_margin: u32,
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(anyhow!(
                "resolver min confidence must be in [0, 1], got {}",
                self.min_confidence
            ));
        }
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            count_margin: DEFAULT_COUNT_MARGIN,
        }
    }
}

/// Aggregated samples for one product name.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductVote {
    pub name: String,
    pub count: u32,
    pub confidence_sum: f64,
}

impl ProductVote {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
            confidence_sum: 0.0,
        }
    }

    fn add(&mut self, confidence: f32) {
        self.count += 1;
        self.confidence_sum += f64::from(confidence);
    }

    pub fn mean_confidence(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.confidence_sum / f64::from(self.count)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProductResolver {
    config: ResolverConfig,
}

impl ProductResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Filter and aggregate a label buffer into votes, in first-seen order.
    pub fn tally(&self, buffer: &[LabelSample]) -> Vec<ProductVote> {
        let mut votes: Vec<ProductVote> = Vec::new();
        for sample in buffer
            .iter()
            .filter(|s| s.confidence >= self.config.min_confidence)
        {
            let idx = match votes.iter().position(|v| v.name == sample.name) {
                Some(idx) => idx,
                None => {
                    votes.push(ProductVote::new(&sample.name));
                    votes.len() - 1
                }
            };
            votes[idx].add(sample.confidence);
        }
        votes
    }

    /// Pick the winning product name, or `None` when nothing survives filtering.
    pub fn resolve(&self, buffer: &[LabelSample]) -> Option<String> {
        let votes = self.tally(buffer);
        match votes.len() {
            0 => return None,
            1 => return votes.into_iter().next().map(|v| v.name),
            _ => {}
        }

        // Literal sample count, not distinct names.
        let (first, second) = if buffer.len() == 2 {
            (&votes[0], &votes[1])
        } else {
            top_two(&votes)
        };

        let winner = if first.count.saturating_sub(second.count) > self.config.count_margin {
            first
        } else if second.mean_confidence() > first.mean_confidence() {
            second
        } else {
            first
        };
        log::debug!(
            "resolved '{}' from {} samples ({} vs {}: counts {}/{}, means {:.3}/{:.3})",
            winner.name,
            buffer.len(),
            first.name,
            second.name,
            first.count,
            second.count,
            first.mean_confidence(),
            second.mean_confidence()
        );
        Some(winner.name.clone())
    }
}

/// Highest and second-highest count. Earlier votes win ties.
fn top_two(votes: &[ProductVote]) -> (&ProductVote, &ProductVote) {
    let mut first = 0;
    let mut second: Option<usize> = None;
    for idx in 1..votes.len() {
        if votes[idx].count > votes[first].count {
            second = Some(first);
            first = idx;
        } else if second.map_or(true, |s| votes[idx].count > votes[s].count) {
            second = Some(idx);
        }
    }
    (&votes[first], &votes[second.unwrap_or(first)])
}
