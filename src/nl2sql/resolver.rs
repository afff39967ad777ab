// SPDX-License-Identifier: MIT

//! Entity resolution
//!
//! Finds player and club mentions in a question, maps them to the
//! canonical names stored in the database and asks for clarification
//! when a mention fits several names equally well.

use crate::adk::error::Result;
use crate::nl2sql::config::NameColumn;
use crate::nl2sql::schema::SchemaDescription;
use async_trait::async_trait;
use regex::{Captures, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Minimum normalized Levenshtein similarity for a fuzzy match
pub const FUZZY_THRESHOLD: f64 = 0.85;

/// Windows shorter than this are never fuzzy matched
const MIN_FUZZY_LEN: usize = 4;

/// Result of resolving a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Resolved {
        question: String,
        entities: BTreeMap<String, String>,
    },
    ClarificationNeeded {
        prompt: String,
        mentions: Vec<String>,
    },
}

impl Resolution {
    /// Clarification asking about the given mentions
    pub fn clarify(mentions: Vec<String>) -> Self {
        let prompt = format!(
            "I found multiple possibilities for: {}. Could you be more specific?",
            mentions.join(", ")
        );
        Resolution::ClarificationNeeded { prompt, mentions }
    }
}

/// Disambiguates entity mentions in a raw question
#[async_trait]
pub trait EntityResolver: Send + Sync {
    async fn resolve(&self, raw_question: &str, schema: &SchemaDescription) -> Result<Resolution>;
}

/// Supplies the canonical names held in a table column
#[async_trait]
pub trait NameSource: Send + Sync {
    async fn distinct_names(&self, column: &NameColumn) -> Result<Vec<String>>;
}

/// Resolver that accepts every question as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughResolver;

#[async_trait]
impl EntityResolver for PassthroughResolver {
    async fn resolve(&self, raw_question: &str, _schema: &SchemaDescription) -> Result<Resolution> {
        Ok(Resolution::Resolved {
            question: collapse_whitespace(raw_question),
            entities: BTreeMap::new(),
        })
    }
}

/// Lowercase, strip diacritics and collapse whitespace
pub fn normalize_name(name: &str) -> String {
    let stripped: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    collapse_whitespace(&stripped)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace each mention with its canonical name (case-insensitive, whole words).
///
/// All mentions are matched in a single pass, longest first, so text that
/// was just inserted is never matched again.
pub fn canonicalize_query(question: &str, entities: &BTreeMap<String, String>) -> String {
    let collapsed = collapse_whitespace(question);
    let lookup: HashMap<String, &String> = entities
        .iter()
        .map(|(mention, canonical)| (collapse_whitespace(mention).to_lowercase(), canonical))
        .filter(|(mention, _)| !mention.is_empty())
        .collect();
    if lookup.is_empty() {
        return collapsed;
    }

    let mut mentions: Vec<&String> = lookup.keys().collect();
    mentions.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    let alternation = mentions
        .iter()
        .map(|m| regex::escape(m))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r"\b(?:{})\b", alternation);

    let re = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re,
        Err(e) => {
            log::warn!("Could not build mention pattern, keeping question as-is: {}", e);
            return collapsed;
        }
    };
    let result = re
        .replace_all(&collapsed, |caps: &Captures| {
            let found = &caps[0];
            lookup
                .get(&found.to_lowercase())
                .map(|canonical| canonical.to_string())
                .unwrap_or_else(|| found.to_string())
        })
        .into_owned();
    log::info!("Canonicalized query: '{}'", result);
    result
}

/// Lookup tables built from the known names
struct NameIndex {
    /// normalized full name → canonical
    full: HashMap<String, String>,
    /// normalized surname → canonicals sharing it
    surnames: HashMap<String, Vec<String>>,
    max_words: usize,
}

enum Match {
    Resolved(String),
    Ambiguous,
}

impl NameIndex {
    fn build(names: &[String]) -> Self {
        let mut full = HashMap::new();
        let mut surnames: HashMap<String, Vec<String>> = HashMap::new();
        let mut max_words = 1;

        for name in names {
            let norm = normalize_name(name);
            if norm.is_empty() {
                continue;
            }
            let words: Vec<&str> = norm.split(' ').collect();
            max_words = max_words.max(words.len());
            if words.len() > 1 {
                if let Some(last) = words.last() {
                    let entry = surnames.entry(last.to_string()).or_default();
                    if !entry.contains(name) {
                        entry.push(name.clone());
                    }
                }
            }
            full.entry(norm).or_insert_with(|| name.clone());
        }

        Self {
            full,
            surnames,
            max_words,
        }
    }

    fn lookup(&self, window: &str, words: usize) -> Option<Match> {
        let norm = normalize_name(window);
        if let Some(canonical) = self.full.get(&norm) {
            return Some(Match::Resolved(canonical.clone()));
        }
        if words == 1 {
            if let Some(candidates) = self.surnames.get(&norm) {
                return Some(match candidates.as_slice() {
                    [only] => Match::Resolved(only.clone()),
                    _ => Match::Ambiguous,
                });
            }
        }
        if norm.chars().count() < MIN_FUZZY_LEN {
            return None;
        }
        self.fuzzy(&norm, words)
    }

    fn fuzzy(&self, norm: &str, words: usize) -> Option<Match> {
        let mut candidates: Vec<(&str, &String)> =
            self.full.iter().map(|(k, c)| (k.as_str(), c)).collect();
        if words == 1 {
            for (key, canonicals) in &self.surnames {
                candidates.extend(canonicals.iter().map(|c| (key.as_str(), c)));
            }
        }

        let mut best = 0.0_f64;
        let mut winners: Vec<&String> = Vec::new();
        for (key, canonical) in candidates {
            let score = strsim::normalized_levenshtein(norm, key);
            if score < FUZZY_THRESHOLD {
                continue;
            }
            if score > best {
                best = score;
                winners.clear();
                winners.push(canonical);
            } else if score == best && !winners.contains(&canonical) {
                winners.push(canonical);
            }
        }

        match winners.as_slice() {
            [] => None,
            [only] => Some(Match::Resolved((*only).clone())),
            _ => Some(Match::Ambiguous),
        }
    }
}

/// Resolver matching mentions against names read from the database
pub struct FuzzyEntityResolver {
    source: Arc<dyn NameSource>,
    columns: Vec<NameColumn>,
}

impl FuzzyEntityResolver {
    pub fn new(source: Arc<dyn NameSource>, columns: Vec<NameColumn>) -> Self {
        Self { source, columns }
    }

    async fn known_names(&self, schema: &SchemaDescription) -> Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for column in &self.columns {
            let present = schema
                .table(&column.table)
                .map(|cols| cols.iter().any(|c| c.name == column.column))
                .unwrap_or(false);
            if !present {
                log::debug!(
                    "Skipping name column {}.{}: not in schema",
                    column.table,
                    column.column
                );
                continue;
            }
            for name in self.source.distinct_names(column).await? {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }
}

/// Words of the question with surrounding punctuation removed
fn question_words(question: &str) -> Vec<&str> {
    question
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect()
}

#[async_trait]
impl EntityResolver for FuzzyEntityResolver {
    async fn resolve(&self, raw_question: &str, schema: &SchemaDescription) -> Result<Resolution> {
        let names = self.known_names(schema).await?;
        if names.is_empty() {
            return PassthroughResolver.resolve(raw_question, schema).await;
        }
        let index = NameIndex::build(&names);
        let words = question_words(raw_question);

        let mut entities = BTreeMap::new();
        let mut ambiguous: Vec<String> = Vec::new();

        let mut i = 0;
        while i < words.len() {
            let longest = index.max_words.min(words.len() - i);
            let mut consumed = 1;
            for n in (1..=longest).rev() {
                let window = words[i..i + n].join(" ");
                match index.lookup(&window, n) {
                    Some(Match::Resolved(canonical)) => {
                        log::info!("Matched '{}' to canonical '{}'", window, canonical);
                        entities.insert(window, canonical);
                        consumed = n;
                        break;
                    }
                    Some(Match::Ambiguous) => {
                        log::warn!("Ambiguous mention '{}'", window);
                        if !ambiguous.contains(&window) {
                            ambiguous.push(window);
                        }
                        consumed = n;
                        break;
                    }
                    None => {}
                }
            }
            i += consumed;
        }

        if !ambiguous.is_empty() {
            return Ok(Resolution::clarify(ambiguous));
        }
        Ok(Resolution::Resolved {
            question: canonicalize_query(raw_question, &entities),
            entities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nl2sql::schema::ColumnDef;

    struct StaticNames;

    #[async_trait]
    impl NameSource for StaticNames {
        async fn distinct_names(&self, column: &NameColumn) -> Result<Vec<String>> {
            Ok(match column.table.as_str() {
                "players" => vec![
                    "Santiago Giménez".to_string(),
                    "Coen Moulijn".to_string(),
                    "Sjaak Swart".to_string(),
                    "Luis Suárez".to_string(),
                    "Denis Suárez".to_string(),
                ],
                "clubs" => vec!["Feyenoord".to_string(), "Ajax".to_string()],
                _ => vec![],
            })
        }
    }

    fn schema() -> SchemaDescription {
        SchemaDescription::new()
            .with_table("players", vec![ColumnDef::new("playerName", "TEXT")])
            .with_table("clubs", vec![ColumnDef::new("clubName", "TEXT")])
    }

    fn resolver() -> FuzzyEntityResolver {
        FuzzyEntityResolver::new(
            Arc::new(StaticNames),
            vec![
                NameColumn::new("players", "playerName"),
                NameColumn::new("clubs", "clubName"),
            ],
        )
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Santiago   Giménez "), "santiago gimenez");
        assert_eq!(normalize_name("Suárez"), "suarez");
    }

    #[test]
    fn test_canonicalize_query() {
        let mut entities = BTreeMap::new();
        entities.insert("gimenez".to_string(), "Santiago Giménez".to_string());
        let out = canonicalize_query("Goals  by GIMENEZ\nthis season", &entities);
        assert_eq!(out, "Goals by Santiago Giménez this season");
    }

    #[test]
    fn test_canonicalize_does_not_rescan_inserted_names() {
        let mut entities = BTreeMap::new();
        entities.insert("Sjaak Swart".to_string(), "Sjaak Swart".to_string());
        entities.insert("Swart".to_string(), "Sjaak Swart".to_string());
        assert_eq!(
            canonicalize_query(
                "Hoeveel goals maakte Sjaak Swart en wanneer stopte Swart?",
                &entities
            ),
            "Hoeveel goals maakte Sjaak Swart en wanneer stopte Sjaak Swart?"
        );
        assert_eq!(canonicalize_query("  geen   namen ", &BTreeMap::new()), "geen namen");
    }

    #[test]
    fn test_canonicalize_respects_word_bounds() {
        let mut entities = BTreeMap::new();
        entities.insert("Ajax".to_string(), "AFC Ajax".to_string());
        assert_eq!(
            canonicalize_query("Ajaxied vs Ajax", &entities),
            "Ajaxied vs AFC Ajax"
        );
    }

    #[tokio::test]
    async fn test_resolves_surname_and_club() {
        let res = resolver()
            .resolve(
                "Hoeveel doelpunten heeft Gimenez gemaakt voor Feyenoord?",
                &schema(),
            )
            .await
            .unwrap();

        match res {
            Resolution::Resolved { question, entities } => {
                assert_eq!(
                    question,
                    "Hoeveel doelpunten heeft Santiago Giménez gemaakt voor Feyenoord?"
                );
                assert_eq!(entities.get("Gimenez").unwrap(), "Santiago Giménez");
                assert_eq!(entities.get("Feyenoord").unwrap(), "Feyenoord");
            }
            other => panic!("expected resolution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_name_and_surname_in_one_question() {
        let res = resolver()
            .resolve(
                "Hoeveel goals maakte Sjaak Swart en wanneer stopte Swart?",
                &schema(),
            )
            .await
            .unwrap();
        match res {
            Resolution::Resolved { question, entities } => {
                assert_eq!(
                    question,
                    "Hoeveel goals maakte Sjaak Swart en wanneer stopte Sjaak Swart?"
                );
                assert_eq!(entities.get("Swart").unwrap(), "Sjaak Swart");
            }
            other => panic!("expected resolution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fuzzy_typo_resolves() {
        let res = resolver()
            .resolve("Hoe vaak scoorde Sjaak Swarte?", &schema())
            .await
            .unwrap();
        match res {
            Resolution::Resolved { entities, .. } => {
                assert_eq!(entities.get("Sjaak Swarte").unwrap(), "Sjaak Swart");
            }
            other => panic!("expected resolution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shared_surname_needs_clarification() {
        let res = resolver()
            .resolve("Hoeveel goals maakte Suarez?", &schema())
            .await
            .unwrap();
        match res {
            Resolution::ClarificationNeeded { prompt, mentions } => {
                assert_eq!(mentions, vec!["Suarez".to_string()]);
                assert_eq!(
                    prompt,
                    "I found multiple possibilities for: Suarez. Could you be more specific?"
                );
            }
            other => panic!("expected clarification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_name_is_not_ambiguous() {
        let res = resolver()
            .resolve("Goals van Luis Suarez", &schema())
            .await
            .unwrap();
        assert!(matches!(res, Resolution::Resolved { .. }));
    }

    #[tokio::test]
    async fn test_columns_missing_from_schema_skipped() {
        let res = resolver()
            .resolve("Goals van Suarez", &SchemaDescription::new())
            .await
            .unwrap();
        match res {
            Resolution::Resolved { question, entities } => {
                assert_eq!(question, "Goals van Suarez");
                assert!(entities.is_empty());
            }
            other => panic!("expected passthrough, got {:?}", other),
        }
    }
}
