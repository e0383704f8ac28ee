//! In-memory search index over the public dataset catalog.
//!
//! Built once at startup from the example/loadable dataset summaries plus
//! optional whitelist and blacklist files; read-only afterwards. Indexed
//! fields: title, description, group and every sample metadata value.
//! Queries return dataset ids ranked by weighted term frequency.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use gsa_common::models::ExternalData;

/// Relative weight of a match per field
const WEIGHT_TITLE: f32 = 3.0;
const WEIGHT_GROUP: f32 = 2.0;
const WEIGHT_TEXT: f32 = 1.0;

/// One ranked search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub score: f32,
}

struct Document {
    id: String,
    title: String,
    description: Option<String>,
    group: Option<String>,
    /// token -> accumulated field weight
    terms: HashMap<String, f32>,
}

/// The read-only index shared by all request handlers
pub struct SearchIndex {
    documents: Vec<Document>,
}

impl SearchIndex {
    /// Build the index from the dataset catalog and curation files
    pub fn build(
        catalog: &[ExternalData],
        whitelist: Option<&Path>,
        blacklist: Option<&Path>,
    ) -> Self {
        let whitelist = whitelist.and_then(read_id_list);
        let blacklist = blacklist.and_then(read_id_list).unwrap_or_default();

        let mut documents = Vec::new();
        for entry in catalog {
            if let Some(allowed) = &whitelist {
                if !allowed.contains(&entry.id) {
                    continue;
                }
            }
            if blacklist.contains(&entry.id) {
                continue;
            }
            documents.push(index_entry(entry));
        }

        tracing::info!(documents = documents.len(), "Search index built");
        Self { documents }
    }

    /// Ranked lookup; `group` restricts hits to one data source group
    pub fn search(&self, query: &str, group: Option<&str>, limit: usize) -> Vec<SearchHit> {
        let terms: Vec<String> = tokenize(query).collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .documents
            .iter()
            .filter(|doc| match group {
                Some(group) => doc
                    .group
                    .as_deref()
                    .map(|g| g.eq_ignore_ascii_case(group))
                    .unwrap_or(false),
                None => true,
            })
            .filter_map(|doc| {
                let score: f32 = terms
                    .iter()
                    .map(|term| doc.terms.get(term).copied().unwrap_or(0.0))
                    .sum();
                // Every query term must match somewhere
                let all_match = terms
                    .iter()
                    .all(|term| doc.terms.contains_key(term));
                (all_match && score > 0.0).then(|| SearchHit {
                    id: doc.id.clone(),
                    title: doc.title.clone(),
                    description: doc.description.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        hits
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn index_entry(entry: &ExternalData) -> Document {
    let mut terms: HashMap<String, f32> = HashMap::new();
    let mut add = |text: &str, weight: f32| {
        for token in tokenize(text) {
            *terms.entry(token).or_insert(0.0) += weight;
        }
    };

    add(&entry.title, WEIGHT_TITLE);
    if let Some(description) = &entry.description {
        add(description, WEIGHT_TEXT);
    }
    if let Some(group) = &entry.group {
        add(group, WEIGHT_GROUP);
    }
    for metadata in &entry.sample_metadata {
        for value in &metadata.values {
            add(value, WEIGHT_TEXT);
        }
    }

    Document {
        id: entry.id.clone(),
        title: entry.title.clone(),
        description: entry.description.clone(),
        group: entry.group.clone(),
        terms,
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 1)
        .map(|token| token.to_lowercase())
}

/// Read one dataset id per line; '#' starts a comment
fn read_id_list(path: &Path) -> Option<std::collections::HashSet<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Some(
            contents
                .lines()
                .map(|line| line.split('#').next().unwrap_or("").trim())
                .filter(|line| !line.is_empty())
                .map(|line| line.to_string())
                .collect(),
        ),
        Err(err) => {
            tracing::warn!(file = %path.display(), error = %err, "Cannot read curation list");
            None
        }
    }
}
