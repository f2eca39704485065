//! Semantic code comparison, consensus clustering, and drift rates.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::normalizer::Normalizer;

/// Comparison weights and thresholds.
#[derive(Debug, Clone)]
pub struct ComparatorConfig {
    /// Weight of the section-histogram similarity
    pub structural_weight: f64,
    /// Weight of the line-set Jaccard similarity
    pub content_weight: f64,
    /// Similarity at or above which two inputs are considered identical
    pub identical_threshold: f64,
    /// Bound on the reported difference list
    pub max_differences: usize,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            structural_weight: 0.4,
            content_weight: 0.6,
            identical_threshold: 0.98,
            max_differences: 20,
        }
    }
}

/// One line-level difference between two normalized inputs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Difference {
    /// 1-based line number in the normalized texts
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
}

/// Outcome of comparing two inputs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub identical: bool,
    pub similarity: f64,
    pub structural_similarity: f64,
    pub content_similarity: f64,
    pub differences: Vec<Difference>,
}

/// Majority cluster over a set of samples.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consensus {
    /// Original (un-normalized) text of the majority cluster's first member
    pub output: String,
    /// Majority cluster size over total samples
    pub agreement_rate: f64,
    pub cluster_size: usize,
    pub clusters: usize,
}

/// Variant statistics over a set of samples.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftStats {
    pub unique_variants: usize,
    /// `(unique_variants - 1) / samples * 100`, zero for no samples
    pub drift_rate: f64,
}

/// Line role for the structural histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SectionType {
    Import,
    Definition,
    ControlFlow,
    Assignment,
    Return,
    Other,
}

/// Compares code samples through the normalizer.
pub struct Comparator {
    normalizer: Normalizer,
    config: ComparatorConfig,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(Normalizer::default(), ComparatorConfig::default())
    }
}

impl Comparator {
    pub fn new(normalizer: Normalizer, config: ComparatorConfig) -> Self {
        Self { normalizer, config }
    }

    /// Compare two inputs. Equal normalization hashes short-circuit to an
    /// identical result with similarity 1.0.
    pub fn compare(&self, a: &str, b: &str) -> ComparisonResult {
        let left = self.normalizer.normalize(a);
        let right = self.normalizer.normalize(b);

        if left.hash == right.hash {
            return ComparisonResult {
                identical: true,
                similarity: 1.0,
                structural_similarity: 1.0,
                content_similarity: 1.0,
                differences: Vec::new(),
            };
        }

        let structural = self.structural_similarity(&left.normalized, &right.normalized);
        let content = content_similarity(&left.normalized, &right.normalized);
        let weight_sum = self.config.structural_weight + self.config.content_weight;
        let similarity = if weight_sum > 0.0 {
            (self.config.structural_weight * structural + self.config.content_weight * content)
                / weight_sum
        } else {
            0.0
        };

        ComparisonResult {
            identical: similarity >= self.config.identical_threshold,
            similarity,
            structural_similarity: structural,
            content_similarity: content,
            differences: line_differences(
                &left.normalized,
                &right.normalized,
                self.config.max_differences,
            ),
        }
    }

    /// Group samples by normalized hash and return the largest cluster.
    /// `None` for an empty input.
    pub fn find_consensus(&self, codes: &[String]) -> Option<Consensus> {
        if codes.is_empty() {
            return None;
        }
        let clusters = self.cluster(codes);
        let (_, members) = clusters
            .iter()
            .max_by_key(|(_, members)| members.len())?;
        let first_index = *members.first()?;
        Some(Consensus {
            output: codes[first_index].clone(),
            agreement_rate: members.len() as f64 / codes.len() as f64,
            cluster_size: members.len(),
            clusters: clusters.len(),
        })
    }

    /// Variant statistics: clusters under the normalizer's hash.
    pub fn calculate_drift(&self, samples: &[String]) -> DriftStats {
        if samples.is_empty() {
            return DriftStats {
                unique_variants: 0,
                drift_rate: 0.0,
            };
        }
        let unique_variants = self.cluster(samples).len();
        DriftStats {
            unique_variants,
            drift_rate: (unique_variants - 1) as f64 / samples.len() as f64 * 100.0,
        }
    }

    /// Cluster sample indexes by normalized hash, in first-seen order.
    fn cluster(&self, codes: &[String]) -> Vec<(String, Vec<usize>)> {
        let mut order: Vec<String> = Vec::new();
        let mut clusters: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, code) in codes.iter().enumerate() {
            let hash = self.normalizer.normalize(code).hash;
            if !clusters.contains_key(&hash) {
                order.push(hash.clone());
            }
            clusters.entry(hash).or_default().push(index);
        }
        order
            .into_iter()
            .map(|hash| {
                let members = clusters.remove(&hash).unwrap_or_default();
                (hash, members)
            })
            .collect()
    }

    /// Section-type histogram overlap: `Σ min / Σ max` per section type.
    fn structural_similarity(&self, a: &str, b: &str) -> f64 {
        let histogram_a = self.histogram(a);
        let histogram_b = self.histogram(b);
        let keys: HashSet<SectionType> = histogram_a
            .keys()
            .chain(histogram_b.keys())
            .copied()
            .collect();
        if keys.is_empty() {
            return 1.0;
        }
        let mut min_sum = 0usize;
        let mut max_sum = 0usize;
        for key in keys {
            let count_a = histogram_a.get(&key).copied().unwrap_or(0);
            let count_b = histogram_b.get(&key).copied().unwrap_or(0);
            min_sum += count_a.min(count_b);
            max_sum += count_a.max(count_b);
        }
        if max_sum == 0 {
            1.0
        } else {
            min_sum as f64 / max_sum as f64
        }
    }

    fn histogram(&self, text: &str) -> HashMap<SectionType, usize> {
        let mut histogram = HashMap::new();
        for line in text.lines() {
            *histogram.entry(self.classify(line)).or_insert(0) += 1;
        }
        histogram
    }

    fn classify(&self, line: &str) -> SectionType {
        let trimmed = line.trim_start();
        if self.normalizer.is_import_line(line) {
            SectionType::Import
        } else if trimmed.starts_with("fn ")
            || trimmed.starts_with("function")
            || trimmed.starts_with("def ")
            || trimmed.starts_with("class ")
            || trimmed.starts_with("struct ")
            || trimmed.starts_with("impl ")
            || trimmed.starts_with("trait ")
        {
            SectionType::Definition
        } else if trimmed.starts_with("if ")
            || trimmed.starts_with("for ")
            || trimmed.starts_with("while ")
            || trimmed.starts_with("match ")
            || trimmed.starts_with("loop")
            || trimmed.starts_with("switch")
        {
            SectionType::ControlFlow
        } else if trimmed.starts_with("return") {
            SectionType::Return
        } else if trimmed.contains('=') {
            SectionType::Assignment
        } else {
            SectionType::Other
        }
    }
}

/// Jaccard similarity over the sets of normalized lines.
fn content_similarity(a: &str, b: &str) -> f64 {
    let lines_a: HashSet<&str> = a.lines().collect();
    let lines_b: HashSet<&str> = b.lines().collect();
    if lines_a.is_empty() && lines_b.is_empty() {
        return 1.0;
    }
    let intersection = lines_a.intersection(&lines_b).count();
    let union = lines_a.union(&lines_b).count();
    intersection as f64 / union as f64
}

/// Pairwise line differences, bounded at `cap` entries.
fn line_differences(a: &str, b: &str, cap: usize) -> Vec<Difference> {
    let lines_a: Vec<&str> = a.lines().collect();
    let lines_b: Vec<&str> = b.lines().collect();
    let mut differences = Vec::new();
    for index in 0..lines_a.len().max(lines_b.len()) {
        if differences.len() >= cap {
            break;
        }
        let left = lines_a.get(index).copied();
        let right = lines_b.get(index).copied();
        if left != right {
            differences.push(Difference {
                line: index + 1,
                left: left.map(str::to_string),
                right: right.map(str::to_string),
            });
        }
    }
    differences
}
