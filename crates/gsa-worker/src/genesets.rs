//! Pathway gene sets and their mapping onto a submitted dataset.
//!
//! Gene set files are tab-delimited with three columns: pathway id,
//! pathway name and a comma-separated gene list. Variants with
//! interactor-extended or disease-free pathways live next to the base
//! file; when a variant is missing the base file is used.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use gsa_common::{GsaError, Result};

/// One curated pathway
#[derive(Debug, Clone)]
pub struct PathwayDef {
    pub id: String,
    pub name: String,
    pub genes: HashSet<String>,
}

/// A loaded pathway database
#[derive(Debug, Clone)]
pub struct GeneSet {
    pathways: Vec<PathwayDef>,
}

impl GeneSet {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GsaError::Kernel(format!(
                "Failed to load pathway database {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_tsv(&contents)
    }

    pub fn from_tsv(contents: &str) -> Result<Self> {
        let mut pathways = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split('\t');
            let (Some(id), Some(name), Some(genes)) =
                (fields.next(), fields.next(), fields.next())
            else {
                return Err(GsaError::Kernel(format!(
                    "Pathway database line {} is malformed",
                    number + 1
                )));
            };

            pathways.push(PathwayDef {
                id: id.to_string(),
                name: name.to_string(),
                genes: genes
                    .split(',')
                    .map(|gene| gene.trim().to_uppercase())
                    .filter(|gene| !gene.is_empty())
                    .collect(),
            });
        }

        if pathways.is_empty() {
            return Err(GsaError::Kernel(
                "Pathway database contains no pathways".to_string(),
            ));
        }
        Ok(Self { pathways })
    }

    /// Small built-in pathway set used when no database directory is
    /// configured (tests, standalone runs).
    pub fn sample() -> Self {
        let def = |id: &str, name: &str, genes: &[&str]| PathwayDef {
            id: id.to_string(),
            name: name.to_string(),
            genes: genes.iter().map(|g| g.to_string()).collect(),
        };
        Self {
            pathways: vec![
                def(
                    "P-0001",
                    "B cell receptor signaling",
                    &["CD19", "CD79A", "CD79B", "BLNK", "SYK"],
                ),
                def(
                    "P-0002",
                    "Melanocyte development",
                    &["MITF", "TYR", "PMEL", "DCT"],
                ),
                def(
                    "P-0003",
                    "TP53 regulated transcription",
                    &["TP53", "MDM2", "CDKN1A", "BAX"],
                ),
                def(
                    "P-0004",
                    "Interferon signaling",
                    &["STAT1", "STAT2", "IRF1", "IRF9", "JAK1"],
                ),
            ],
        }
    }

    pub fn pathways(&self) -> &[PathwayDef] {
        &self.pathways
    }

    pub fn len(&self) -> usize {
        self.pathways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pathways.is_empty()
    }
}

/// Resolve the gene set file for the requested pathway variant, falling
/// back to the base file when the variant does not exist.
pub fn pathway_file(
    directory: &Path,
    resource: &str,
    use_interactors: bool,
    include_disease: bool,
) -> PathBuf {
    let mut stem = resource.to_string();
    if use_interactors {
        stem.push_str("_interactors");
    }
    if !include_disease {
        stem.push_str("_no_disease");
    }

    let candidate = directory.join(format!("{}.tsv", stem));
    if candidate.is_file() {
        return candidate;
    }

    let base = directory.join(format!("{}.tsv", resource));
    tracing::debug!(
        requested = %candidate.display(),
        fallback = %base.display(),
        "Pathway variant not available, using base file"
    );
    base
}

/// One pathway resolved against a dataset: which matrix rows belong to it
#[derive(Debug, Clone)]
pub struct MappedPathway {
    pub id: String,
    pub name: String,
    pub rows: Vec<usize>,
}

/// The gene set mapping for one dataset
#[derive(Debug, Clone)]
pub struct GeneSetMapping {
    entries: Vec<MappedPathway>,
    /// Row index -> number of pathways containing that row
    frequency: HashMap<usize, usize>,
}

impl GeneSetMapping {
    /// Resolve pathway membership through the identifier mappings
    pub fn create(
        gene_set: &GeneSet,
        identifiers: &[String],
        identifier_mappings: &HashMap<String, Vec<String>>,
    ) -> Self {
        let mut entries = Vec::new();
        let mut frequency: HashMap<usize, usize> = HashMap::new();

        for pathway in gene_set.pathways() {
            let mut rows = Vec::new();
            for (row, identifier) in identifiers.iter().enumerate() {
                let Some(mapped) = identifier_mappings.get(identifier) else {
                    continue;
                };
                if mapped.iter().any(|m| pathway.genes.contains(&m.to_uppercase())) {
                    rows.push(row);
                }
            }

            if rows.is_empty() {
                continue;
            }
            for &row in &rows {
                *frequency.entry(row).or_insert(0) += 1;
            }
            entries.push(MappedPathway {
                id: pathway.id.clone(),
                name: pathway.name.clone(),
                rows,
            });
        }

        Self { entries, frequency }
    }

    pub fn pathways(&self) -> &[MappedPathway] {
        &self.entries
    }

    /// In how many mapped pathways the given matrix row occurs
    pub fn row_frequency(&self, row: usize) -> usize {
        self.frequency.get(&row).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
