//! Include / exclude cut points over a descending ranking.

use crate::config::{DEFAULT_EXCLUDE_OFFSET, DEFAULT_INCLUDE_OFFSET};
use crate::ranker::RankedEntry;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub include_offset: f32,
    pub exclude_offset: f32,
    /// Keep at most this many entries on each side.
    pub window: Option<usize>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            include_offset: DEFAULT_INCLUDE_OFFSET,
            exclude_offset: DEFAULT_EXCLUDE_OFFSET,
            window: None,
        }
    }
}

impl Thresholds {
    pub fn include_threshold(&self, top_score: f32) -> f32 {
        top_score - self.include_offset
    }

    pub fn exclude_threshold(&self, top_score: f32) -> f32 {
        top_score - self.exclude_offset
    }
}

/// Index ranges into the ranking the selection was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    pub include: Range<usize>,
    pub exclude: Range<usize>,
}

impl Selection {
    pub fn include_entries<'a>(&self, ranking: &'a [RankedEntry]) -> &'a [RankedEntry] {
        &ranking[self.include.clone()]
    }

    pub fn exclude_entries<'a>(&self, ranking: &'a [RankedEntry]) -> &'a [RankedEntry] {
        &ranking[self.exclude.clone()]
    }
}

/// Split a descending ranking relative to its top score.
///
/// The include prefix stops at the first score below
/// `top - include_offset`; the exclude suffix starts at the first score at
/// or below `top - exclude_offset`.
pub fn select(ranking: &[RankedEntry], thresholds: &Thresholds) -> Selection {
    let Some(top) = ranking.first().map(|e| e.score) else {
        return Selection::default();
    };
    let include_threshold = thresholds.include_threshold(top);
    let exclude_threshold = thresholds.exclude_threshold(top);

    let include_end = ranking
        .iter()
        .position(|e| e.score < include_threshold)
        .unwrap_or(ranking.len());
    let exclude_start = ranking
        .iter()
        .position(|e| e.score <= exclude_threshold)
        .unwrap_or(ranking.len());

    let mut include = 0..include_end;
    let mut exclude = exclude_start..ranking.len();
    if let Some(window) = thresholds.window {
        include.end = include.end.min(window);
        exclude.start = exclude.start.max(exclude.end.saturating_sub(window));
    }
    Selection { include, exclude }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(scores: &[f32]) -> Vec<RankedEntry> {
        scores
            .iter()
            .enumerate()
            .map(|(index, &score)| RankedEntry { index, score })
            .collect()
    }

    #[test]
    fn single_dominant_match() {
        let r = ranking(&[0.90, 0.80, 0.70]);
        let sel = select(&r, &Thresholds::default());
        assert_eq!(sel.include, 0..1);
        assert_eq!(sel.exclude, 1..3);
    }

    #[test]
    fn clustered_scores_include_everything() {
        let r = ranking(&[0.50, 0.495, 0.49, 0.485]);
        let sel = select(&r, &Thresholds::default());
        assert_eq!(sel.include, 0..4);
        assert!(sel.exclude.is_empty());
    }

    #[test]
    fn gap_between_include_and_exclude() {
        let r = ranking(&[0.90, 0.89, 0.87, 0.85, 0.40]);
        let sel = select(&r, &Thresholds::default());
        assert_eq!(sel.include, 0..2);
        assert_eq!(sel.exclude, 3..5);
        assert_eq!(sel.include_entries(&r).len(), 2);
        assert_eq!(sel.exclude_entries(&r)[0].score, 0.85);
    }

    #[test]
    fn single_entry_is_never_excluded() {
        let sel = select(&ranking(&[0.3]), &Thresholds::default());
        assert_eq!(sel.include, 0..1);
        assert!(sel.exclude.is_empty());
    }

    #[test]
    fn empty_ranking_selects_nothing() {
        assert_eq!(select(&[], &Thresholds::default()), Selection::default());
    }

    #[test]
    fn include_threshold_sits_above_exclude_threshold() {
        let t = Thresholds::default();
        for top in [-1.0f32, 0.0, 0.42, 1.0] {
            assert!(t.include_threshold(top) > t.exclude_threshold(top));
        }
    }

    #[test]
    fn window_caps_both_sides() {
        let r = ranking(&[1.0, 0.995, 0.99, 0.5, 0.4, 0.3, 0.2]);
        let t = Thresholds {
            window: Some(2),
            ..Default::default()
        };
        let sel = select(&r, &t);
        assert_eq!(sel.include, 0..2);
        assert_eq!(sel.exclude, 5..7);
    }
}
