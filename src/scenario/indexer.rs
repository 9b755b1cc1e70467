//! Combinatorial scenario indexing.
//!
//! Maps a global index onto the nested domain -> tier -> repetition -> model
//! space and back. The mapping is a bijection over `[0, total)`, so a paused
//! job resumes by asking for `position_at(stored + failed)`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{Domain, Position, Tier};
use crate::error::ConfigError;

/// Dimensions of a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    domains: Vec<Domain>,
    tiers: Vec<Tier>,
    repetitions: u32,
    models: Vec<String>,
}

impl IndexerConfig {
    /// Builds a validated configuration.
    ///
    /// Empty dimensions, duplicate entries and a zero repetition count are
    /// rejected before any index is computed.
    pub fn new(
        domains: Vec<Domain>,
        tiers: Vec<Tier>,
        repetitions: u32,
        models: Vec<String>,
    ) -> Result<Self, ConfigError> {
        if domains.is_empty() {
            return Err(ConfigError::EmptyDimension("domains"));
        }
        if tiers.is_empty() {
            return Err(ConfigError::EmptyDimension("tiers"));
        }
        if models.is_empty() {
            return Err(ConfigError::EmptyDimension("models"));
        }
        if repetitions == 0 {
            return Err(ConfigError::ZeroRepetitions);
        }

        check_unique("domains", domains.iter().map(|d| d.to_string()))?;
        check_unique("tiers", tiers.iter().map(|t| t.to_string()))?;
        check_unique("models", models.iter().cloned())?;

        if let Some(blank) = models.iter().find(|m| m.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: "models".to_string(),
                message: format!("model id '{}' is blank", blank),
            });
        }

        Ok(Self {
            domains,
            tiers,
            repetitions,
            models,
        })
    }

    /// Parses domain and tier names, then validates.
    pub fn parse(
        domains: &[String],
        tiers: &[String],
        repetitions: u32,
        models: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let domains = domains
            .iter()
            .map(|d| d.parse())
            .collect::<Result<Vec<Domain>, _>>()?;
        let tiers = tiers
            .iter()
            .map(|t| t.parse())
            .collect::<Result<Vec<Tier>, _>>()?;
        Self::new(domains, tiers, repetitions, models)
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }
}

fn check_unique(
    dimension: &'static str,
    values: impl Iterator<Item = String>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value.clone()) {
            return Err(ConfigError::DuplicateEntry { dimension, value });
        }
    }
    Ok(())
}

/// Pure index <-> position mapping over an [`IndexerConfig`].
#[derive(Debug, Clone)]
pub struct ScenarioIndexer {
    config: IndexerConfig,
    per_domain_tier: u64,
    per_domain: u64,
    total: u64,
}

impl ScenarioIndexer {
    pub fn new(config: IndexerConfig) -> Self {
        let per_domain_tier = config.repetitions as u64 * config.models.len() as u64;
        let per_domain = per_domain_tier * config.tiers.len() as u64;
        let total = per_domain * config.domains.len() as u64;
        Self {
            config,
            per_domain_tier,
            per_domain,
            total,
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Number of positions in the space.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Position for a global index, or `None` past the end.
    pub fn position_at(&self, index: u64) -> Option<Position> {
        if index >= self.total {
            return None;
        }
        let models = self.config.models.len() as u64;

        let domain_index = (index / self.per_domain) % self.config.domains.len() as u64;
        let tier_index =
            ((index % self.per_domain) / self.per_domain_tier) % self.config.tiers.len() as u64;
        let rep_index = (index % self.per_domain_tier) / models;
        let model_index = index % models;

        Some(Position {
            domain: self.config.domains[domain_index as usize],
            tier: self.config.tiers[tier_index as usize],
            repetition: rep_index as u32 + 1,
            model: self.config.models[model_index as usize].clone(),
        })
    }

    /// Inverse of [`position_at`](Self::position_at).
    pub fn index_of(&self, position: &Position) -> Option<u64> {
        let domain = self.config.domains.iter().position(|d| *d == position.domain)? as u64;
        let tier = self.config.tiers.iter().position(|t| *t == position.tier)? as u64;
        let model = self
            .config
            .models
            .iter()
            .position(|m| *m == position.model)? as u64;
        if position.repetition == 0 || position.repetition > self.config.repetitions {
            return None;
        }
        let rep = (position.repetition - 1) as u64;
        let models = self.config.models.len() as u64;

        Some(domain * self.per_domain + tier * self.per_domain_tier + rep * models + model)
    }

    /// Sequential sweep over every position from `start` to the end.
    pub fn positions_from(&self, start: u64) -> Sweep<'_> {
        Sweep::new(self, start)
    }

    /// Full sequential sweep.
    pub fn sweep(&self) -> Sweep<'_> {
        self.positions_from(0)
    }
}

/// Odometer-style iterator yielding `(index, position)` pairs.
///
/// Advances the innermost digit (model) first and carries outward, without
/// recomputing the division chain for each element.
#[derive(Debug)]
pub struct Sweep<'a> {
    indexer: &'a ScenarioIndexer,
    next_index: u64,
    domain: usize,
    tier: usize,
    rep: u32,
    model: usize,
}

impl<'a> Sweep<'a> {
    fn new(indexer: &'a ScenarioIndexer, start: u64) -> Self {
        let mut sweep = Self {
            indexer,
            next_index: start,
            domain: 0,
            tier: 0,
            rep: 0,
            model: 0,
        };
        if let Some(position) = indexer.position_at(start) {
            let config = &indexer.config;
            sweep.domain = config
                .domains
                .iter()
                .position(|d| *d == position.domain)
                .unwrap_or(0);
            sweep.tier = config
                .tiers
                .iter()
                .position(|t| *t == position.tier)
                .unwrap_or(0);
            sweep.rep = position.repetition - 1;
            sweep.model = (start % config.models.len() as u64) as usize;
        }
        sweep
    }

    fn advance(&mut self) {
        let config = &self.indexer.config;
        self.model += 1;
        if self.model < config.models.len() {
            return;
        }
        self.model = 0;
        self.rep += 1;
        if self.rep < config.repetitions {
            return;
        }
        self.rep = 0;
        self.tier += 1;
        if self.tier < config.tiers.len() {
            return;
        }
        self.tier = 0;
        self.domain += 1;
    }
}

impl Iterator for Sweep<'_> {
    type Item = (u64, Position);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index >= self.indexer.total {
            return None;
        }
        let config = &self.indexer.config;
        let position = Position {
            domain: config.domains[self.domain],
            tier: config.tiers[self.tier],
            repetition: self.rep + 1,
            model: config.models[self.model].clone(),
        };
        let index = self.next_index;
        self.next_index += 1;
        self.advance();
        Some((index, position))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.indexer.total.saturating_sub(self.next_index) as usize;
        (remaining, Some(remaining))
    }
}
