use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::debug;

use crate::model::{FeatureVector, NormalizedEntity, SimilarityMatrix};
use crate::normalize::MISSING_CATEGORY;

/// Column order of every vector in a batch: numeric features first, then one
/// dummy column per (categorical field, non-reference level).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureLayout {
    pub numeric: Vec<String>,
    pub one_hot: Vec<(String, String)>,
}

impl FeatureLayout {
    pub fn dimension(&self) -> usize {
        self.numeric.len() + self.one_hot.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.numeric
            .iter()
            .cloned()
            .chain(self.one_hot.iter().map(|(f, v)| format!("{f}={v}")))
            .collect()
    }
}

/// Entities in batch order, with their vectors at the same positions.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub entities: Vec<NormalizedEntity>,
    pub layout: FeatureLayout,
    pub vectors: Vec<FeatureVector>,
}

/// Ranked neighbours of each entity, computed once per batch.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    pub features: FeatureSet,
    pub matrix: SimilarityMatrix,
}

impl SimilarityIndex {
    pub fn build(
        entities: Vec<NormalizedEntity>,
        numeric_fields: &[String],
        categorical_fields: &[String],
    ) -> Self {
        let mut features = build_feature_vectors(entities, numeric_fields, categorical_fields);
        standardize_columns(&mut features.vectors);
        let matrix = compute_similarity(&features.vectors);
        debug!(
            entities = features.entities.len(),
            dims = features.layout.dimension(),
            "built similarity index"
        );
        Self { features, matrix }
    }

    pub fn len(&self) -> usize {
        self.features.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.entities.is_empty()
    }

    pub fn similar_to(&self, target: usize, k: usize) -> Vec<(&NormalizedEntity, f64)> {
        top_k_similar(&self.matrix, target, k)
            .into_iter()
            .filter_map(|(idx, score)| self.features.entities.get(idx).map(|e| (e, score)))
            .collect()
    }
}

/// Dummy-encode categoricals against the first sorted level and lay numeric
/// features out in the given order. Values are raw; see `standardize_columns`.
pub fn build_feature_vectors(
    entities: Vec<NormalizedEntity>,
    numeric_fields: &[String],
    categorical_fields: &[String],
) -> FeatureSet {
    let mut one_hot = Vec::new();
    for field in categorical_fields {
        let levels: BTreeSet<&str> = entities
            .iter()
            .map(|e| e.categorical(field).unwrap_or(MISSING_CATEGORY))
            .collect();
        // First sorted level is the reference and gets no column.
        for level in levels.into_iter().skip(1) {
            one_hot.push((field.clone(), level.to_string()));
        }
    }

    let layout = FeatureLayout {
        numeric: numeric_fields.to_vec(),
        one_hot,
    };

    let vectors = entities
        .iter()
        .map(|entity| {
            let mut v = Vec::with_capacity(layout.dimension());
            for name in &layout.numeric {
                v.push(entity.numeric(name).unwrap_or(0.0));
            }
            for (field, level) in &layout.one_hot {
                let hit = entity.categorical(field).unwrap_or(MISSING_CATEGORY) == level;
                v.push(if hit { 1.0 } else { 0.0 });
            }
            v
        })
        .collect();

    FeatureSet {
        entities,
        layout,
        vectors,
    }
}

/// Center each column to zero mean and scale to unit (population) variance.
/// A constant column becomes all zeros instead of dividing by zero.
pub fn standardize_columns(vectors: &mut [FeatureVector]) {
    let Some(dim) = vectors.first().map(|v| v.len()) else {
        return;
    };
    let n = vectors.len() as f64;
    for col in 0..dim {
        let mean = vectors.iter().map(|v| v[col]).sum::<f64>() / n;
        let var = vectors
            .iter()
            .map(|v| {
                let d = v[col] - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let std = var.sqrt();
        for v in vectors.iter_mut() {
            v[col] = if std <= 1e-12 {
                0.0
            } else {
                (v[col] - mean) / std
            };
        }
    }
}

/// `(a·b) / (|a||b|)`, or 0.0 when either side has zero norm.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut na = 0.0;
    let mut nb = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    // sqrt of the product (not product of sqrts) keeps sim(a, a) at exactly 1.0.
    (dot / (na * nb).sqrt()).clamp(-1.0, 1.0)
}

pub fn compute_similarity(vectors: &[FeatureVector]) -> SimilarityMatrix {
    let rows = (0..vectors.len())
        .into_par_iter()
        .map(|i| {
            vectors
                .iter()
                .map(|other| cosine_similarity(&vectors[i], other))
                .collect::<Vec<f64>>()
        })
        .collect();
    SimilarityMatrix::from_rows(rows)
}

/// Up to `k` neighbours of `target`, best first, never including `target`.
/// Equal scores keep batch order.
pub fn top_k_similar(matrix: &SimilarityMatrix, target: usize, k: usize) -> Vec<(usize, f64)> {
    if matrix.len() < 2 {
        return Vec::new();
    }
    let Some(row) = matrix.row(target) else {
        return Vec::new();
    };
    let mut ranked: Vec<(usize, f64)> = row
        .iter()
        .copied()
        .enumerate()
        .filter(|(idx, _)| *idx != target)
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}
