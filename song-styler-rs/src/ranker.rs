use crate::catalog::Catalog;
use crate::{Result, StylerError};
use ndarray::ArrayView1;
use serde::Serialize;
use tracing::debug;

/// One catalog record and its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedEntry {
    /// Position of the record in the catalog.
    pub index: usize,
    pub score: f32,
}

/// Score every catalog record by dot product with `query`, best first.
///
/// Ties keep catalog order. NaN scores sink to the end.
pub fn rank(query: &[f32], catalog: &Catalog) -> Result<Vec<RankedEntry>> {
    if catalog.is_empty() {
        return Err(StylerError::EmptyCatalog);
    }
    if query.len() != catalog.dim() {
        return Err(StylerError::DimensionMismatch {
            expected: catalog.dim(),
            got: query.len(),
        });
    }
    let scores = catalog.embeddings().dot(&ArrayView1::from(query));
    let mut ranking: Vec<RankedEntry> = scores
        .iter()
        .enumerate()
        .map(|(index, &score)| RankedEntry { index, score })
        .collect();
    ranking.sort_by(|a, b| sort_key(b.score).total_cmp(&sort_key(a.score)));
    debug!(
        entries = ranking.len(),
        top = ranking.first().map(|e| e.score),
        "ranked descriptors"
    );
    Ok(ranking)
}

fn sort_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DescriptorRecord;

    fn catalog(rows: Vec<Vec<f32>>) -> Catalog {
        let records = (0..rows.len())
            .map(|i| DescriptorRecord::new("Genre", "Style", format!("t{i}")))
            .collect();
        Catalog::new(records, rows).unwrap()
    }

    #[test]
    fn covers_every_record_in_descending_order() {
        let cat = catalog(vec![
            vec![0.1, 0.0],
            vec![0.9, 0.0],
            vec![0.5, 0.5],
            vec![-0.3, 1.0],
        ]);
        let ranking = rank(&[1.0, 0.0], &cat).unwrap();
        assert_eq!(ranking.len(), cat.len());
        let mut seen: Vec<usize> = ranking.iter().map(|e| e.index).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert!(ranking.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(ranking[0].index, 1);
    }

    #[test]
    fn ties_keep_catalog_order() {
        let cat = catalog(vec![vec![0.5], vec![0.7], vec![0.5], vec![0.5]]);
        let order: Vec<usize> = rank(&[1.0], &cat)
            .unwrap()
            .iter()
            .map(|e| e.index)
            .collect();
        assert_eq!(order, vec![1, 0, 2, 3]);
    }

    #[test]
    fn nan_scores_go_last() {
        let cat = catalog(vec![vec![f32::NAN], vec![0.2], vec![0.4]]);
        let order: Vec<usize> = rank(&[1.0], &cat)
            .unwrap()
            .iter()
            .map(|e| e.index)
            .collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn rejects_wrong_query_width() {
        let cat = catalog(vec![vec![1.0, 0.0, 0.0]]);
        let err = rank(&[1.0, 0.0], &cat).unwrap_err();
        assert!(matches!(
            err,
            StylerError::DimensionMismatch {
                expected: 3,
                got: 2
            }
        ));
    }

    #[test]
    fn rejects_empty_catalog() {
        let cat = Catalog::new(Vec::new(), Vec::new()).unwrap();
        assert!(matches!(rank(&[], &cat), Err(StylerError::EmptyCatalog)));
    }
}
