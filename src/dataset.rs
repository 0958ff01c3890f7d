//! JSONL datasets of curated corrections.
//!
//! Items are normalized to one schema (`input`, `correction`, `reasoning`,
//! `error_type`, `error_spans`, `metadata`), split into support and
//! evaluation sets, and embedded into a support index.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use index::{IndexError, VectorIndex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::SupportExample;

/// Default fraction of items held out for evaluation.
pub const DEFAULT_EVAL_FRACTION: f64 = 0.1;
/// Default shuffle seed for [`split_items`].
pub const DEFAULT_SPLIT_SEED: u64 = 1337;
/// Items embedded per `add` call in [`build_support_index`].
pub const DEFAULT_BATCH_SIZE: usize = 64;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON on line {line} of {path}: {message}")]
    Json {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("item {item}: {message}")]
    InvalidItem { item: usize, message: String },
    #[error("{} inputs appear in both support and eval sets", .0.len())]
    Overlap(Vec<String>),
    #[error("failed to serialize item: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// One normalized dataset line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub input: String,
    pub correction: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_spans: Vec<Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl From<&DatasetItem> for SupportExample {
    fn from(item: &DatasetItem) -> Self {
        Self {
            input: item.input.clone(),
            reasoning: item.reasoning.clone(),
            correction: item.correction.clone(),
            error_type: item.error_type.clone(),
        }
    }
}

/// Every non-blank line of `path` as JSON.
pub fn read_jsonl(path: &Path) -> Result<Vec<Value>, DatasetError> {
    let file = File::open(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut items = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(&line).map_err(|e| DatasetError::Json {
            path: path.to_path_buf(),
            line: i + 1,
            message: e.to_string(),
        })?;
        items.push(value);
    }
    Ok(items)
}

/// Write `items` one JSON object per line, creating parent directories.
pub fn write_jsonl<T: Serialize>(items: &[T], path: &Path) -> Result<(), DatasetError> {
    let io_err = |source: std::io::Error| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    for item in items {
        let line = serde_json::to_string(item)?;
        writeln!(out, "{line}").map_err(io_err)?;
    }
    out.flush().map_err(io_err)
}

/// Map one raw record onto [`DatasetItem`]. `original` and `corrected` are
/// accepted for `input` and `correction`.
pub fn normalize_item(raw: &Value, item: usize) -> Result<DatasetItem, DatasetError> {
    let invalid = |message: String| DatasetError::InvalidItem { item, message };
    let Value::Object(obj) = raw else {
        return Err(invalid("not a JSON object".into()));
    };

    let input = match obj.get("input").or_else(|| obj.get("original")) {
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(invalid("'input' must be a string".into())),
        None => return Err(invalid("missing required field 'input'".into())),
    };
    let correction = match obj.get("correction").or_else(|| obj.get("corrected")) {
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(invalid("'correction' must be a string".into())),
        None => return Err(invalid("missing required field 'correction'".into())),
    };
    let reasoning = match obj.get("reasoning") {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(_) => return Err(invalid("'reasoning' must be a string".into())),
    };
    let error_type = match obj.get("error_type") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::String(_)) | None | Some(Value::Null) => None,
        Some(_) => return Err(invalid("'error_type' must be a string".into())),
    };
    let error_spans = match obj.get("error_spans") {
        Some(Value::Array(spans)) => spans.clone(),
        None | Some(Value::Null) => Vec::new(),
        Some(_) => return Err(invalid("'error_spans' must be a list".into())),
    };
    let metadata = match obj.get("metadata") {
        Some(Value::Object(m)) => m.clone(),
        None | Some(Value::Null) => Map::new(),
        Some(_) => return Err(invalid("'metadata' must be an object".into())),
    };

    if input.trim().is_empty() {
        return Err(invalid("empty 'input'".into()));
    }

    Ok(DatasetItem {
        input,
        correction,
        reasoning,
        error_type,
        error_spans,
        metadata,
    })
}

/// Normalize every record, collecting one message per bad item (1-based).
pub fn validate_items(raw: &[Value]) -> (Vec<DatasetItem>, Vec<DatasetError>) {
    let mut items = Vec::with_capacity(raw.len());
    let mut errors = Vec::new();
    for (i, value) in raw.iter().enumerate() {
        match normalize_item(value, i + 1) {
            Ok(item) => items.push(item),
            Err(e) => errors.push(e),
        }
    }
    (items, errors)
}

/// Seeded shuffle, then hold out `max(1, floor(n * eval_fraction))` items.
/// Returns `(support, eval)`.
pub fn split_items(
    items: &[DatasetItem],
    eval_fraction: f64,
    seed: u64,
) -> (Vec<DatasetItem>, Vec<DatasetItem>) {
    if items.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let mut shuffled = items.to_vec();
    fastrand::Rng::with_seed(seed).shuffle(&mut shuffled);

    let n_eval = ((shuffled.len() as f64 * eval_fraction) as usize)
        .max(1)
        .min(shuffled.len());
    let support = shuffled.split_off(n_eval);
    (support, shuffled)
}

/// Inputs (trimmed) present in both sets, sorted.
pub fn find_overlap(a: &[DatasetItem], b: &[DatasetItem]) -> Vec<String> {
    let left: BTreeSet<&str> = a.iter().map(|x| x.input.trim()).collect();
    let right: BTreeSet<&str> = b.iter().map(|x| x.input.trim()).collect();
    left.intersection(&right).map(|s| s.to_string()).collect()
}

/// [`split_items`] followed by an overlap check.
pub fn split_checked(
    items: &[DatasetItem],
    eval_fraction: f64,
    seed: u64,
) -> Result<(Vec<DatasetItem>, Vec<DatasetItem>), DatasetError> {
    let (support, eval) = split_items(items, eval_fraction, seed);
    let overlap = find_overlap(&support, &eval);
    if !overlap.is_empty() {
        return Err(DatasetError::Overlap(overlap));
    }
    Ok((support, eval))
}

/// Embed `items` into `index` keyed by their input, `batch_size` at a time.
/// Returns the final entry count.
pub async fn build_support_index(
    index: &VectorIndex,
    items: &[DatasetItem],
    batch_size: usize,
) -> Result<usize, DatasetError> {
    let mut rows = index.len();
    for (n, batch) in items.chunks(batch_size.max(1)).enumerate() {
        let texts: Vec<String> = batch.iter().map(|item| item.input.clone()).collect();
        let metadatas = batch
            .iter()
            .map(|item| serde_json::json!({ "value": SupportExample::from(item) }))
            .collect();
        rows = index.add(&texts, metadatas).await?;
        tracing::debug!(batch = n, rows, "support batch embedded");
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use index::IndexConfig;
    use semantic::HashingEmbedder;
    use serde_json::json;
    use std::sync::Arc;

    fn item(input: &str) -> DatasetItem {
        normalize_item(&json!({"input": input, "correction": "x"}), 1).unwrap()
    }

    #[test]
    fn normalize_fills_defaults_and_aliases() {
        let raw = json!({"original": "He go.", "corrected": "He goes.", "extra": 1});
        let item = normalize_item(&raw, 1).unwrap();
        assert_eq!(item.input, "He go.");
        assert_eq!(item.correction, "He goes.");
        assert_eq!(item.reasoning, "");
        assert_eq!(item.error_type, None);
        assert!(item.error_spans.is_empty());
        assert!(item.metadata.is_empty());
    }

    #[test]
    fn validate_reports_each_bad_item() {
        let raw = vec![
            json!({"input": "ok", "correction": "ok"}),
            json!({"input": "  ", "correction": "x"}),
            json!({"correction": "x"}),
            json!({"input": "a", "correction": 3}),
            json!("not an object"),
        ];
        let (items, errors) = validate_items(&raw);
        assert_eq!(items.len(), 1);
        assert_eq!(errors.len(), 4);
        assert!(errors[0].to_string().starts_with("item 2:"));
        assert!(errors[1].to_string().contains("missing required field 'input'"));
    }

    #[test]
    fn jsonl_round_trip_and_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/items.jsonl");
        write_jsonl(&[item("a"), item("b")], &path).unwrap();
        let values = read_jsonl(&path).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["input"], "b");

        let bad = dir.path().join("bad.jsonl");
        fs::write(&bad, "{\"input\":\"a\"}\n\n{oops\n").unwrap();
        let err = read_jsonl(&bad).unwrap_err();
        assert!(matches!(err, DatasetError::Json { line: 3, .. }));
    }

    #[test]
    fn split_is_seeded_and_disjoint() {
        let items: Vec<DatasetItem> = (0..20).map(|i| item(&format!("sentence {i}"))).collect();
        let (support, eval) = split_checked(&items, 0.1, DEFAULT_SPLIT_SEED).unwrap();
        assert_eq!(eval.len(), 2);
        assert_eq!(support.len(), 18);

        let again = split_items(&items, 0.1, DEFAULT_SPLIT_SEED);
        assert_eq!(again, (support, eval));
    }

    #[test]
    fn split_holds_out_at_least_one() {
        let items = vec![item("a"), item("b"), item("c")];
        let (support, eval) = split_items(&items, 0.01, 7);
        assert_eq!(eval.len(), 1);
        assert_eq!(support.len(), 2);
        assert_eq!(split_items(&[], 0.5, 7), (vec![], vec![]));
    }

    #[test]
    fn duplicate_inputs_are_reported() {
        let items = vec![item("same"), item("same")];
        let err = split_checked(&items, 0.5, 1).unwrap_err();
        assert!(matches!(err, DatasetError::Overlap(ref v) if v == &vec!["same".to_string()]));
    }

    #[tokio::test]
    async fn builds_index_in_batches() {
        let embedder = Arc::new(HashingEmbedder::new("hash-test", 32));
        let index = VectorIndex::new(embedder, IndexConfig::default());
        let items: Vec<DatasetItem> = (0..5).map(|i| item(&format!("line {i}"))).collect();

        let rows = build_support_index(&index, &items, 2).await.unwrap();
        assert_eq!(rows, 5);
        let first = SupportExample::from_metadata(&index.snapshot().metadata()[0]).unwrap();
        assert_eq!(first.input, "line 0");
    }
}
