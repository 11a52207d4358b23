//! Descriptor vocabulary and its stacked embedding matrix.
//!
//! A catalog is two files: `descriptors.json` holding the ordered records
//! (`{ "descriptors": [{ "category", "group", "tag" }, ...] }`) and a
//! stacked tensor `{ "data": [...], "shape": [N, D], "dtype": "float32" }`
//! with one embedding row per record. Records may instead carry their own
//! `embedding` array, or be embedded on load with a backend.

use crate::backend::EmbeddingBackend;
use crate::{Result, StylerError};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const INSTRUMENTS_GROUP: &str = "Instruments";
pub const VOICE_GROUP: &str = "Voice";
/// Tag text that suppresses the rest of its group.
pub const IGNORE_TAG: &str = "Ignore";

const FLOAT32: &str = "float32";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKind {
    Generic,
    /// Tags merge into one comma-separated list with no group prefix.
    Instruments,
    /// At most one of Male / Female / Duet is kept.
    Voice,
}

impl GroupKind {
    pub fn resolve(group: &str) -> Self {
        match group {
            INSTRUMENTS_GROUP => Self::Instruments,
            VOICE_GROUP => Self::Voice,
            _ => Self::Generic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoiceType {
    Male,
    Female,
    Duet,
}

impl VoiceType {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "Male" => Some(Self::Male),
            "Female" => Some(Self::Female),
            "Duet" => Some(Self::Duet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Duet => "Duet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagKind {
    Plain,
    Ignore,
    Voice(VoiceType),
}

impl TagKind {
    pub fn resolve(tag: &str) -> Self {
        if tag == IGNORE_TAG {
            return Self::Ignore;
        }
        VoiceType::parse(tag).map_or(Self::Plain, Self::Voice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorRecord {
    pub category: String,
    pub group: String,
    pub tag: String,
    #[serde(skip)]
    pub group_kind: GroupKind,
    #[serde(skip)]
    pub tag_kind: TagKind,
}

impl DescriptorRecord {
    pub fn new(
        category: impl Into<String>,
        group: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        let group = group.into();
        let tag = tag.into();
        Self {
            category: category.into(),
            group_kind: GroupKind::resolve(&group),
            tag_kind: TagKind::resolve(&tag),
            group,
            tag,
        }
    }

    /// Text handed to an embedding backend when the catalog ships without vectors.
    pub fn descriptor_text(&self) -> String {
        format!("{} {}", self.group, self.tag)
    }
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    category: String,
    group: String,
    tag: String,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct DescriptorsFile {
    descriptors: Vec<RawDescriptor>,
}

/// Row-major embedding tensor as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackedEmbeddings {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
    #[serde(default = "default_dtype")]
    pub dtype: String,
}

fn default_dtype() -> String {
    FLOAT32.to_string()
}

impl StackedEmbeddings {
    pub fn into_matrix(self) -> Result<Array2<f32>> {
        if self.dtype != FLOAT32 {
            return Err(StylerError::Invalid(format!(
                "unsupported embedding dtype {:?}",
                self.dtype
            )));
        }
        let [rows, cols] = self.shape[..] else {
            return Err(StylerError::Invalid(format!(
                "embedding shape must have two axes, got {:?}",
                self.shape
            )));
        };
        if rows * cols != self.data.len() {
            return Err(StylerError::Invalid(format!(
                "embedding shape {rows}x{cols} does not match {} values",
                self.data.len()
            )));
        }
        Array2::from_shape_vec((rows, cols), self.data)
            .map_err(|e| StylerError::Other(e.to_string()))
    }
}

/// Immutable descriptor list plus one embedding row per record.
#[derive(Debug, Clone)]
pub struct Catalog {
    records: Vec<DescriptorRecord>,
    embeddings: Array2<f32>,
}

impl Catalog {
    /// Build from records and per-record vectors, which must share one width.
    pub fn new(records: Vec<DescriptorRecord>, rows: Vec<Vec<f32>>) -> Result<Self> {
        if rows.len() != records.len() {
            return Err(StylerError::Invalid(format!(
                "{} descriptors but {} embeddings",
                records.len(),
                rows.len()
            )));
        }
        let dim = rows.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            if row.len() != dim {
                return Err(StylerError::DimensionMismatch {
                    expected: dim,
                    got: row.len(),
                });
            }
            flat.extend(row);
        }
        let embeddings = Array2::from_shape_vec((records.len(), dim), flat)
            .map_err(|e| StylerError::Other(e.to_string()))?;
        Ok(Self {
            records,
            embeddings,
        })
    }

    pub fn from_matrix(records: Vec<DescriptorRecord>, embeddings: Array2<f32>) -> Result<Self> {
        if embeddings.nrows() != records.len() {
            return Err(StylerError::Invalid(format!(
                "{} descriptors but {} embedding rows",
                records.len(),
                embeddings.nrows()
            )));
        }
        Ok(Self {
            records,
            embeddings,
        })
    }

    /// Load descriptors and, when given, the stacked embeddings file.
    ///
    /// Without an embeddings file every record must carry an inline
    /// `embedding`.
    pub fn load(descriptors: &Path, embeddings: Option<&Path>) -> Result<Self> {
        let (records, inline) = read_descriptors(descriptors)?;
        let catalog = match embeddings {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let stacked: StackedEmbeddings = serde_json::from_str(&raw)?;
                Self::from_matrix(records, stacked.into_matrix()?)?
            }
            None => {
                let rows = inline.ok_or_else(|| {
                    StylerError::Invalid(format!(
                        "{} has no inline embeddings and no embeddings file was given",
                        descriptors.display()
                    ))
                })?;
                Self::new(records, rows)?
            }
        };
        info!(
            records = catalog.len(),
            dim = catalog.dim(),
            "descriptor catalog loaded"
        );
        Ok(catalog)
    }

    /// Like [`Catalog::load`], but embeds the descriptors with `backend`
    /// when neither an embeddings file nor inline vectors are available.
    pub fn load_or_embed<B: EmbeddingBackend + ?Sized>(
        descriptors: &Path,
        embeddings: Option<&Path>,
        backend: &B,
    ) -> Result<Self> {
        if embeddings.is_some() {
            return Self::load(descriptors, embeddings);
        }
        let (records, inline) = read_descriptors(descriptors)?;
        match inline {
            Some(rows) => Self::new(records, rows),
            None => Self::embed_with(records, backend),
        }
    }

    /// Descriptor records alone, ignoring any inline embeddings.
    pub fn read_records(path: &Path) -> Result<Vec<DescriptorRecord>> {
        Ok(read_descriptors(path)?.0)
    }

    pub fn embed_with<B: EmbeddingBackend + ?Sized>(
        records: Vec<DescriptorRecord>,
        backend: &B,
    ) -> Result<Self> {
        let texts: Vec<String> = records.iter().map(DescriptorRecord::descriptor_text).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let rows = backend.embed_text(&refs)?;
        debug!(
            model = backend.model_name(),
            records = records.len(),
            "embedded descriptor catalog"
        );
        Self::new(records, rows)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Embedding width shared by every record.
    pub fn dim(&self) -> usize {
        self.embeddings.ncols()
    }

    pub fn records(&self) -> &[DescriptorRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> &DescriptorRecord {
        &self.records[index]
    }

    pub fn embeddings(&self) -> &Array2<f32> {
        &self.embeddings
    }

    pub fn embedding(&self, index: usize) -> ArrayView1<'_, f32> {
        self.embeddings.row(index)
    }

    pub fn to_stacked(&self) -> StackedEmbeddings {
        StackedEmbeddings {
            data: self.embeddings.iter().copied().collect(),
            shape: vec![self.embeddings.nrows(), self.embeddings.ncols()],
            dtype: default_dtype(),
        }
    }

    pub fn write_embeddings(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(&self.to_stacked())?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

type DescriptorRows = (Vec<DescriptorRecord>, Option<Vec<Vec<f32>>>);

/// Inline embeddings are returned only when every record has one.
fn read_descriptors(path: &Path) -> Result<DescriptorRows> {
    let raw = std::fs::read_to_string(path)?;
    let file: DescriptorsFile = serde_json::from_str(&raw)?;
    let mut records = Vec::with_capacity(file.descriptors.len());
    let mut inline = Some(Vec::with_capacity(file.descriptors.len()));
    for d in file.descriptors {
        match (d.embedding, inline.as_mut()) {
            (Some(e), Some(rows)) => rows.push(e),
            _ => inline = None,
        }
        records.push(DescriptorRecord::new(d.category, d.group, d.tag));
    }
    Ok((records, inline))
}
