// SPDX-License-Identifier: MIT

//! Few-shot examples for SQL generation
//!
//! Examples are either the built-in set or a YAML list read from disk.
//! Selection ranks them by word overlap with the incoming question.

use crate::adk::error::Result;
use crate::nl2sql::resolver::normalize_name;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const DEFAULT_EXAMPLE_COUNT: usize = 3;

/// A question paired with a known-good query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    #[serde(default)]
    pub id: String,
    pub natural_language_query: String,
    pub query: String,
}

impl Example {
    pub fn new(
        id: impl Into<String>,
        natural_language_query: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            natural_language_query: natural_language_query.into(),
            query: query.into(),
        }
    }
}

static BUILTIN_EXAMPLES: Lazy<Vec<Example>> = Lazy::new(|| {
    vec![
        Example::new(
            "local-1",
            "Hoe vaak heeft Feyenoord gewonnen van Ajax?",
            "SELECT COUNT(*) FROM matches WHERE ((homeClubId = (SELECT clubId FROM clubs WHERE clubName = 'Feyenoord') AND awayClubId = (SELECT clubId FROM clubs WHERE clubName = 'Ajax') AND homeClubFinalScore > awayClubFinalScore) OR (homeClubId = (SELECT clubId FROM clubs WHERE clubName = 'Ajax') AND awayClubId = (SELECT clubId FROM clubs WHERE clubName = 'Feyenoord') AND awayClubFinalScore > homeClubFinalScore));",
        ),
        Example::new(
            "local-2",
            "Hoe vaak hebben Coen Moulijn en Sjaak Swart tegelijk in een wedstrijd gescoord?",
            "SELECT p1.playerName AS player1, p2.playerName AS player2, COUNT(DISTINCT g1.matchId) AS matches_together FROM goals g1 JOIN goals g2 ON g1.matchId = g2.matchId AND g1.playerId != g2.playerId JOIN players p1 ON g1.playerId = p1.playerId JOIN players p2 ON g2.playerId = p2.playerId WHERE p1.playerName = 'Coen Moulijn' AND p2.playerName = 'Sjaak Swart' GROUP BY player1, player2;",
        ),
        Example::new(
            "local-3",
            "Wat is de grootste overwinning van Feyenoord op PSV?",
            "SELECT m.dateAndTime, m.homeClubName, m.awayClubName, m.homeClubFinalScore, m.awayClubFinalScore FROM matches m WHERE (m.homeClubId = (SELECT clubId FROM clubs WHERE clubName = 'Feyenoord') AND m.awayClubId = (SELECT clubId FROM clubs WHERE clubName = 'PSV') AND m.homeClubFinalScore > m.awayClubFinalScore) OR (m.homeClubId = (SELECT clubId FROM clubs WHERE clubName = 'PSV') AND m.awayClubId = (SELECT clubId FROM clubs WHERE clubName = 'Feyenoord') AND m.awayClubFinalScore > m.homeClubFinalScore) ORDER BY ABS(m.homeClubFinalScore - m.awayClubFinalScore) DESC, m.dateAndTime ASC LIMIT 5;",
        ),
    ]
});

/// In-memory example set
#[derive(Debug, Clone, Default)]
pub struct ExampleStore {
    examples: Vec<Example>,
}

impl ExampleStore {
    pub fn new(examples: Vec<Example>) -> Self {
        Self { examples }
    }

    /// The built-in examples
    pub fn builtin() -> Self {
        Self::new(BUILTIN_EXAMPLES.clone())
    }

    /// Load a YAML list of examples
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut examples: Vec<Example> = serde_yaml::from_str(&content)?;
        for (i, ex) in examples.iter_mut().enumerate() {
            if ex.id.is_empty() {
                ex.id = format!("file-{}", i + 1);
            }
        }
        log::info!("Loaded {} examples from {}", examples.len(), path.display());
        Ok(Self::new(examples))
    }

    /// Load from `path` when given, falling back to the built-in set
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::from_yaml_file(p).unwrap_or_else(|e| {
                log::warn!(
                    "Could not load examples from {}: {}. Using built-in examples.",
                    p.display(),
                    e
                );
                Self::builtin()
            }),
            None => Self::builtin(),
        }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Up to `k` examples most similar to `question`
    pub fn select(&self, question: &str, k: usize) -> Vec<Example> {
        let target = tokens(question);
        let mut scored: Vec<(usize, f64)> = self
            .examples
            .iter()
            .enumerate()
            .map(|(i, ex)| (i, jaccard(&target, &tokens(&ex.natural_language_query))))
            .collect();
        // Stable sort keeps original order on ties
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(i, _)| self.examples[i].clone())
            .collect()
    }
}

fn tokens(text: &str) -> HashSet<String> {
    normalize_name(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
