use ndarray::{Array2, ArrayView1};
use std::cmp::Ordering;

/// Result entry for a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Insertion position of the matched entry.
    pub index: usize,
    /// Cosine similarity in [-1, 1], higher is more similar.
    pub score: f32,
    /// Metadata stored with the matched entry.
    pub metadata: serde_json::Value,
}

/// How rows are scored against a query vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoringMode {
    /// One dot product per row in a plain loop. The reference path.
    Scalar,
    /// A single matrix-vector product over the whole embedding matrix.
    #[default]
    Matrix,
}

/// Score every row of `matrix` against `query`.
pub(crate) fn score_rows(matrix: &Array2<f32>, query: &[f32], mode: ScoringMode) -> Vec<f32> {
    match mode {
        ScoringMode::Scalar => matrix
            .rows()
            .into_iter()
            .map(|row| row.iter().zip(query).map(|(a, b)| a * b).sum())
            .collect(),
        ScoringMode::Matrix => matrix.dot(&ArrayView1::from(query)).to_vec(),
    }
}

#[inline]
fn by_score_then_position(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Positions and scores of the best `k` entries: descending score, equal
/// scores by ascending position.
pub fn rank_top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    if k == 0 || scores.is_empty() {
        return Vec::new();
    }
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    if k < ranked.len() {
        ranked.select_nth_unstable_by(k - 1, by_score_then_position);
        ranked.truncate(k);
    }
    ranked.sort_by(by_score_then_position);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_orders_by_score_descending() {
        let ranked = rank_top_k(&[0.1, 0.9, 0.5], 3);
        let order: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn rank_breaks_ties_by_position() {
        let ranked = rank_top_k(&[0.5, 0.7, 0.5, 0.7, 0.5], 4);
        let order: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);
    }

    #[test]
    fn rank_truncates_and_handles_empty() {
        assert_eq!(rank_top_k(&[0.3, 0.2, 0.1], 1), vec![(0, 0.3)]);
        assert!(rank_top_k(&[], 5).is_empty());
        assert!(rank_top_k(&[1.0], 0).is_empty());
        assert_eq!(rank_top_k(&[0.2, 0.4], 10).len(), 2);
    }

    #[test]
    fn partial_selection_matches_full_sort() {
        let scores: Vec<f32> = (0..200).map(|i| ((i * 37) % 101) as f32 / 101.0).collect();
        let full = rank_top_k(&scores, scores.len());
        for k in [1, 5, 17, 99, 150] {
            assert_eq!(rank_top_k(&scores, k), full[..k].to_vec(), "k={k}");
        }
    }

    #[test]
    fn scalar_and_matrix_scores_agree() {
        let rows = 50;
        let dim = 8;
        let data: Vec<f32> = (0..rows * dim).map(|i| ((i % 13) as f32 - 6.0) / 7.0).collect();
        let matrix = Array2::from_shape_vec((rows, dim), data).unwrap();
        let query: Vec<f32> = (0..dim).map(|i| (i as f32 - 3.5) / 10.0).collect();

        let scalar = score_rows(&matrix, &query, ScoringMode::Scalar);
        let fast = score_rows(&matrix, &query, ScoringMode::Matrix);
        assert_eq!(scalar.len(), rows);
        for (a, b) in scalar.iter().zip(&fast) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn empty_matrix_scores_nothing() {
        let matrix = Array2::<f32>::zeros((0, 4));
        assert!(score_rows(&matrix, &[0.0; 4], ScoringMode::Matrix).is_empty());
        assert!(score_rows(&matrix, &[0.0; 4], ScoringMode::Scalar).is_empty());
    }
}
