use crate::assembler::assemble;
use crate::backend::EmbeddingBackend;
use crate::catalog::{Catalog, DescriptorRecord};
use crate::config::StylerConfig;
use crate::ranker::{rank, RankedEntry};
use crate::threshold::select;
use crate::{Result, StylerError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Include and exclude style strings for one prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongStyles {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl SongStyles {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn include_text(&self) -> String {
        self.include.join(", ")
    }

    pub fn exclude_text(&self) -> String {
        self.exclude.join(", ")
    }
}

/// `"NN/MAX"` length label for a display string.
pub fn char_counter(text: &str, max: usize) -> String {
    format!("{}/{}", text.chars().count(), max)
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredDescriptor<'a> {
    pub rank: usize,
    pub score: f32,
    #[serde(flatten)]
    pub descriptor: &'a DescriptorRecord,
}

/// Prompt-to-styles pipeline over a shared, read-only catalog.
pub struct Styler<B: EmbeddingBackend> {
    backend: B,
    catalog: Arc<Catalog>,
    config: StylerConfig,
}

impl<B: EmbeddingBackend> Styler<B> {
    pub fn new(backend: B, catalog: Arc<Catalog>, config: StylerConfig) -> Self {
        Self {
            backend,
            catalog,
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &StylerConfig {
        &self.config
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.backend
            .embed_text(&[text])?
            .pop()
            .ok_or_else(|| StylerError::Other("embedding backend returned no vector".into()))
    }

    /// Full ranking of the catalog against `text`; empty for a blank prompt.
    pub fn rank(&self, text: &str) -> Result<Vec<ScoredDescriptor<'_>>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embed(text)?;
        let ranking = rank(&query, &self.catalog)?;
        Ok(ranking
            .iter()
            .enumerate()
            .map(|(i, e)| ScoredDescriptor {
                rank: i + 1,
                score: e.score,
                descriptor: self.catalog.record(e.index),
            })
            .collect())
    }

    /// Include / exclude strings for a prompt.
    ///
    /// A blank prompt yields empty styles without touching the backend.
    #[instrument(skip(self), fields(model = self.backend.model_name()))]
    pub fn song_styles(&self, text: &str) -> Result<SongStyles> {
        if text.trim().is_empty() {
            return Ok(SongStyles::default());
        }
        let query = self.embed(text)?;
        let ranking = rank(&query, &self.catalog)?;
        Ok(self.styles_for_ranking(&ranking))
    }

    /// Threshold split and assembly over an existing ranking.
    pub fn styles_for_ranking(&self, ranking: &[RankedEntry]) -> SongStyles {
        let selection = select(ranking, &self.config.thresholds());
        debug!(
            include = selection.include.len(),
            exclude = selection.exclude.len(),
            "threshold split"
        );
        let catalog = &self.catalog;
        SongStyles {
            include: assemble(
                selection
                    .include_entries(ranking)
                    .iter()
                    .map(|e| catalog.record(e.index)),
                self.config.budget,
            ),
            // least similar first
            exclude: assemble(
                selection
                    .exclude_entries(ranking)
                    .iter()
                    .rev()
                    .map(|e| catalog.record(e.index)),
                self.config.budget,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::joined_len;
    use crate::backend::DummyBackend;
    use std::cell::Cell;

    /// Returns a fixed query vector and counts calls.
    struct FixedBackend {
        query: Vec<f32>,
        calls: Cell<usize>,
    }

    impl FixedBackend {
        fn new(query: Vec<f32>) -> Self {
            Self {
                query,
                calls: Cell::new(0),
            }
        }
    }

    impl EmbeddingBackend for FixedBackend {
        fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.calls.set(self.calls.get() + 1);
            Ok(texts.iter().map(|_| self.query.clone()).collect())
        }
        fn dim(&self) -> usize {
            self.query.len()
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn three_way_catalog() -> Arc<Catalog> {
        let records = vec![
            DescriptorRecord::new("Mood", "Mood", "Dark"),
            DescriptorRecord::new("Genre", "Rock", "Punk"),
            DescriptorRecord::new("Tempo", "Tempo", "Fast"),
        ];
        let rows = vec![vec![0.80, 0.0], vec![0.90, 0.1], vec![0.70, 0.2]];
        Arc::new(Catalog::new(records, rows).unwrap())
    }

    #[test]
    fn blank_prompt_skips_backend() {
        let styler = Styler::new(
            FixedBackend::new(vec![1.0, 0.0]),
            three_way_catalog(),
            StylerConfig::default(),
        );
        assert_eq!(styler.song_styles("").unwrap(), SongStyles::default());
        assert_eq!(styler.song_styles("  \n\t").unwrap(), SongStyles::default());
        assert!(styler.rank(" ").unwrap().is_empty());
        assert_eq!(styler.backend().calls.get(), 0);
    }

    #[test]
    fn dominant_match_includes_one_and_excludes_the_rest() {
        let styler = Styler::new(
            FixedBackend::new(vec![1.0, 0.0]),
            three_way_catalog(),
            StylerConfig::default(),
        );
        let styles = styler.song_styles("loud and fast").unwrap();
        assert_eq!(styles.include, vec!["Rock Punk"]);
        // Least similar exclusion comes first.
        assert_eq!(styles.exclude, vec!["Tempo Fast", "Mood Dark"]);
        assert_eq!(styles.include_text(), "Rock Punk");
        assert_eq!(styles.exclude_text(), "Tempo Fast, Mood Dark");
        assert_eq!(styler.backend().calls.get(), 1);
    }

    #[test]
    fn wrong_query_width_is_reported() {
        let styler = Styler::new(
            FixedBackend::new(vec![1.0, 0.0, 0.0]),
            three_way_catalog(),
            StylerConfig::default(),
        );
        assert!(matches!(
            styler.song_styles("anything"),
            Err(StylerError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn rank_lists_every_descriptor() {
        let styler = Styler::new(
            FixedBackend::new(vec![1.0, 0.0]),
            three_way_catalog(),
            StylerConfig::default(),
        );
        let ranked = styler.rank("punk").unwrap();
        let tags: Vec<&str> = ranked.iter().map(|r| r.descriptor.tag.as_str()).collect();
        assert_eq!(tags, vec!["Punk", "Dark", "Fast"]);
        assert_eq!(ranked[0].rank, 1);
    }

    #[test]
    fn dummy_backend_output_respects_budget() {
        let backend = DummyBackend::with_dim(64);
        let mut records = Vec::new();
        for (group, tags) in [
            ("Rock", &["Punk", "Garage", "Grunge", "Indie"][..]),
            ("Instruments", &["Piano", "Guitar", "Drums", "Synth"][..]),
            ("Voice", &["Male", "Female", "Duet"][..]),
            ("Mood", &["Dark", "Uplifting", "Melancholic"][..]),
        ] {
            for tag in tags {
                records.push(DescriptorRecord::new("Style", group, *tag));
            }
        }
        let catalog = Arc::new(Catalog::embed_with(records, &backend).unwrap());
        let config = StylerConfig {
            budget: 30,
            include_offset: 0.2,
            exclude_offset: 0.3,
            window: None,
        };
        let styler = Styler::new(backend, catalog, config);
        let first = styler.song_styles("dark punk with piano").unwrap();
        assert!(joined_len(&first.include) <= 30);
        assert!(joined_len(&first.exclude) <= 30);
        assert_eq!(first, styler.song_styles("dark punk with piano").unwrap());
    }

    #[test]
    fn counter_label() {
        assert_eq!(char_counter("Rock Punk", 200), "9/200");
        assert_eq!(char_counter("", 200), "0/200");
    }
}
