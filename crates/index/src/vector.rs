use arc_swap::ArcSwap;
use ndarray::Array2;
use semantic::{is_unit_length, l2_normalize_in_place, Embedder};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::artifact::{encode_artifact, read_artifact, write_atomic, IndexArtifact};
use crate::query::{rank_top_k, score_rows};
use crate::{IndexConfig, IndexError, QueryResult, INDEX_SCHEMA_VERSION, PROVENANCE_EMBEDDING_MODEL};

/// Immutable view of the index at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// `rows x dimension`, one L2-normalized embedding per row.
    matrix: Array2<f32>,
    /// Shared with older snapshots; appending copies pointers, not records.
    metadata: Vec<Arc<Value>>,
    provenance: BTreeMap<String, String>,
}

impl Snapshot {
    fn empty(provenance: BTreeMap<String, String>) -> Self {
        Self {
            matrix: Array2::zeros((0, 0)),
            metadata: Vec::new(),
            provenance,
        }
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Row dimension, `None` until the first entry fixes it.
    pub fn dimension(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(self.matrix.ncols())
        }
    }

    pub fn matrix(&self) -> &Array2<f32> {
        &self.matrix
    }

    pub fn metadata(&self) -> &[Arc<Value>] {
        &self.metadata
    }

    pub fn provenance(&self) -> &BTreeMap<String, String> {
        &self.provenance
    }

    /// Embedding stored at `index`.
    pub fn embedding(&self, index: usize) -> Option<Vec<f32>> {
        (index < self.len()).then(|| self.matrix.row(index).to_vec())
    }

    /// A new snapshot with `vectors` appended. `self` is left untouched.
    fn extended(&self, vectors: Vec<Vec<f32>>, metadatas: Vec<Value>) -> Result<Self, IndexError> {
        let dim = match (self.dimension(), vectors.first()) {
            (Some(d), _) => d,
            (None, Some(first)) => first.len(),
            (None, None) => return Ok(self.clone()),
        };
        let rows = self.len() + vectors.len();

        let mut data = Vec::with_capacity(rows * dim);
        data.extend(self.matrix.iter().copied());
        for v in vectors {
            data.extend(v);
        }
        let matrix = Array2::from_shape_vec((rows, dim), data).map_err(IndexError::storage)?;

        let mut metadata = Vec::with_capacity(rows);
        metadata.extend(self.metadata.iter().cloned());
        metadata.extend(metadatas.into_iter().map(Arc::new));

        Ok(Self {
            matrix,
            metadata,
            provenance: self.provenance.clone(),
        })
    }

    fn to_artifact(&self) -> Result<IndexArtifact, IndexError> {
        let metadata = self
            .metadata
            .iter()
            .map(|record| serde_json::to_string(&**record))
            .collect::<Result<Vec<_>, _>>()
            .map_err(IndexError::storage)?;
        Ok(IndexArtifact {
            schema_version: INDEX_SCHEMA_VERSION,
            rows: self.len() as u64,
            dimension: self.dimension().unwrap_or(0) as u32,
            matrix: self.matrix.iter().copied().collect(),
            metadata,
            provenance: self.provenance.clone(),
        })
    }

    fn from_artifact(artifact: IndexArtifact) -> Result<Self, IndexError> {
        let rows = artifact.metadata.len();
        let dim = artifact.dimension as usize;
        let metadata = artifact
            .metadata
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                serde_json::from_str::<Value>(raw)
                    .map(Arc::new)
                    .map_err(|e| IndexError::Storage(format!("metadata record {i} is not JSON: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let matrix = if rows == 0 {
            Array2::zeros((0, 0))
        } else {
            Array2::from_shape_vec((rows, dim), artifact.matrix).map_err(IndexError::storage)?
        };
        Ok(Self {
            matrix,
            metadata,
            provenance: artifact.provenance,
        })
    }
}

/// Norm audit and provenance of an index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub entries: usize,
    pub dimension: Option<usize>,
    pub provenance: BTreeMap<String, String>,
    pub norm_min: f32,
    pub norm_max: f32,
    pub norm_mean: f32,
    /// Rows whose norm falls outside 1 ± tolerance.
    pub off_unit_rows: usize,
}

/// Ordered, append-only collection of (embedding, metadata) entries.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    cfg: IndexConfig,
    current: ArcSwap<Snapshot>,
    /// Serializes writers; readers never take it.
    writer: Mutex<()>,
    /// Serializes saves so the newest snapshot is always the last one written.
    persist: Mutex<()>,
}

impl VectorIndex {
    /// An empty index whose provenance records the embedder's model.
    pub fn new(embedder: Arc<dyn Embedder>, cfg: IndexConfig) -> Self {
        let provenance = BTreeMap::from([(
            PROVENANCE_EMBEDDING_MODEL.to_string(),
            embedder.model_name().to_string(),
        )]);
        Self {
            embedder,
            cfg,
            current: ArcSwap::from_pointee(Snapshot::empty(provenance)),
            writer: Mutex::new(()),
            persist: Mutex::new(()),
        }
    }

    /// Create an index and load `path` into it. A missing file yields an empty index.
    pub fn open(
        embedder: Arc<dyn Embedder>,
        cfg: IndexConfig,
        path: impl AsRef<Path>,
    ) -> Result<Self, IndexError> {
        let index = Self::new(embedder, cfg);
        index.load(path)?;
        Ok(index)
    }

    /// The current snapshot. Holding it keeps that version alive.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.current.load().dimension()
    }

    pub fn provenance(&self) -> BTreeMap<String, String> {
        self.current.load().provenance.clone()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed `texts` and append them with their metadata. Returns the new entry count.
    pub async fn add(&self, texts: &[String], metadatas: Vec<Value>) -> Result<usize, IndexError> {
        if texts.len() != metadatas.len() {
            return Err(IndexError::InvalidInput(format!(
                "{} texts but {} metadata records",
                texts.len(),
                metadatas.len()
            )));
        }
        if texts.is_empty() {
            return Ok(self.len());
        }
        let vectors = self.embedder.embed(texts).await?;
        if vectors.len() != texts.len() {
            return Err(IndexError::InvalidInput(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        self.add_vectors(vectors, metadatas)
    }

    /// Append precomputed embeddings. Nothing is committed unless every vector is valid.
    pub fn add_vectors(
        &self,
        mut vectors: Vec<Vec<f32>>,
        metadatas: Vec<Value>,
    ) -> Result<usize, IndexError> {
        if vectors.len() != metadatas.len() {
            return Err(IndexError::InvalidInput(format!(
                "{} vectors but {} metadata records",
                vectors.len(),
                metadatas.len()
            )));
        }
        for (i, v) in vectors.iter_mut().enumerate() {
            if v.is_empty() {
                return Err(IndexError::InvalidInput(format!("vector {i} is empty")));
            }
            if !is_unit_length(v) && !l2_normalize_in_place(v) {
                return Err(IndexError::InvalidInput(format!("vector {i} has zero norm")));
            }
        }

        let _guard = self
            .writer
            .lock()
            .map_err(|_| IndexError::storage("writer lock poisoned"))?;
        let current = self.current.load_full();

        let expected = current
            .dimension()
            .or_else(|| vectors.first().map(Vec::len))
            .unwrap_or(0);
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                got: bad.len(),
            });
        }

        let next = current.extended(vectors, metadatas)?;
        let rows = next.len();
        self.current.store(Arc::new(next));
        Ok(rows)
    }

    /// Up to `top_k` nearest entries to `text`, best first.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<QueryResult>, IndexError> {
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_one(text).await?;
        self.query_vector(&vector, top_k)
    }

    /// Up to `top_k` nearest entries to a precomputed embedding, best first.
    pub fn query_vector(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryResult>, IndexError> {
        let snapshot = self.current.load_full();
        let Some(dim) = snapshot.dimension() else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != dim {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                got: vector.len(),
            });
        }

        let mode = self.cfg.scoring_for(snapshot.len());
        let scores = score_rows(&snapshot.matrix, vector, mode);
        Ok(rank_top_k(&scores, top_k)
            .into_iter()
            .map(|(index, score)| QueryResult {
                index,
                score,
                metadata: Value::clone(&snapshot.metadata[index]),
            })
            .collect())
    }

    /// Persist the current contents to `path` atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let path = path.as_ref();
        let _guard = self
            .persist
            .lock()
            .map_err(|_| IndexError::storage("persist lock poisoned"))?;
        let snapshot = self.current.load_full();
        let bytes = encode_artifact(&snapshot.to_artifact()?, &self.cfg.compression)?;
        write_atomic(path, &bytes)?;
        log::debug!("saved {} entries to {}", snapshot.len(), path.display());
        Ok(())
    }

    /// Replace the contents with the artifact at `path`.
    ///
    /// Returns `Ok(false)` and leaves the index as it was when the file does not exist.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<bool, IndexError> {
        let path = path.as_ref();
        let Some(artifact) = read_artifact(path)? else {
            log::info!("no index artifact at {}, starting empty", path.display());
            return Ok(false);
        };
        let mut loaded = Snapshot::from_artifact(artifact)?;

        let live_model = self.embedder.model_name();
        match loaded.provenance.get(PROVENANCE_EMBEDDING_MODEL) {
            Some(stored) if stored != live_model => {
                if self.cfg.reject_model_mismatch {
                    return Err(IndexError::Storage(format!(
                        "{} was built with embedding model '{stored}', configured model is '{live_model}'",
                        path.display()
                    )));
                }
                log::warn!(
                    "{} was built with embedding model '{stored}' but '{live_model}' is configured; similarities may be meaningless",
                    path.display()
                );
            }
            Some(_) => {}
            None => {
                loaded
                    .provenance
                    .insert(PROVENANCE_EMBEDDING_MODEL.to_string(), live_model.to_string());
            }
        }
        if let (Some(dim), Some(live_dim)) = (loaded.dimension(), self.embedder.dimension()) {
            if dim != live_dim {
                return Err(IndexError::DimensionMismatch {
                    expected: live_dim,
                    got: dim,
                });
            }
        }

        let _guard = self
            .writer
            .lock()
            .map_err(|_| IndexError::storage("writer lock poisoned"))?;
        let rows = loaded.len();
        self.current.store(Arc::new(loaded));
        log::info!("loaded {rows} entries from {}", path.display());
        Ok(true)
    }

    /// Entry count, dimension, provenance and a norm audit of every row.
    pub fn stats(&self) -> IndexStats {
        let snapshot = self.current.load_full();
        let norms: Vec<f32> = snapshot
            .matrix
            .rows()
            .into_iter()
            .map(|row| row.dot(&row).sqrt())
            .collect();
        let (norm_min, norm_max, norm_mean) = if norms.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let min = norms.iter().copied().fold(f32::INFINITY, f32::min);
            let max = norms.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mean = norms.iter().sum::<f32>() / norms.len() as f32;
            (min, max, mean)
        };
        IndexStats {
            entries: snapshot.len(),
            dimension: snapshot.dimension(),
            provenance: snapshot.provenance.clone(),
            norm_min,
            norm_max,
            norm_mean,
            off_unit_rows: norms
                .iter()
                .filter(|n| (**n - 1.0).abs() > semantic::NORM_TOLERANCE)
                .count(),
        }
    }
}
