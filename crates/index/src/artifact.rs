use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use zstd::{decode_all, encode_all};

use crate::{CompressionCodec, CompressionConfig, IndexError};

/// Leading bytes of every index artifact.
pub const ARTIFACT_MAGIC: &[u8; 8] = b"GECIDX01";

/// Bump this value whenever the artifact record layout changes.
pub const INDEX_SCHEMA_VERSION: u16 = 1;

const CODEC_RAW: u8 = 0;
const CODEC_ZSTD: u8 = 1;

/// On-disk form of a whole index.
///
/// Metadata records are kept as JSON text because bincode cannot round-trip
/// self-describing values such as `serde_json::Value`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct IndexArtifact {
    pub schema_version: u16,
    pub rows: u64,
    pub dimension: u32,
    /// Row-major embedding matrix, `rows * dimension` values.
    pub matrix: Vec<f32>,
    pub metadata: Vec<String>,
    pub provenance: BTreeMap<String, String>,
}

impl IndexArtifact {
    /// Structural checks shared by every reader.
    pub(crate) fn validate(&self) -> Result<(), IndexError> {
        if self.schema_version != INDEX_SCHEMA_VERSION {
            return Err(IndexError::Storage(format!(
                "unsupported schema version {} (expected {INDEX_SCHEMA_VERSION})",
                self.schema_version
            )));
        }
        let rows = usize::try_from(self.rows).map_err(IndexError::storage)?;
        if rows != self.metadata.len() {
            return Err(IndexError::Storage(format!(
                "matrix has {rows} rows but {} metadata records",
                self.metadata.len()
            )));
        }
        let expected = rows
            .checked_mul(self.dimension as usize)
            .ok_or_else(|| IndexError::storage("matrix size overflows"))?;
        if self.matrix.len() != expected {
            return Err(IndexError::Storage(format!(
                "matrix holds {} values, expected {rows} x {}",
                self.matrix.len(),
                self.dimension
            )));
        }
        if rows > 0 && self.dimension == 0 {
            return Err(IndexError::storage("non-empty matrix with zero dimension"));
        }
        Ok(())
    }
}

pub(crate) fn encode_artifact(
    artifact: &IndexArtifact,
    compression: &CompressionConfig,
) -> Result<Vec<u8>, IndexError> {
    let encoded = encode_to_vec(artifact, standard())?;
    let (codec, body) = match compression.codec {
        CompressionCodec::None => (CODEC_RAW, encoded),
        CompressionCodec::Zstd => (CODEC_ZSTD, encode_all(encoded.as_slice(), compression.level)?),
    };

    let mut out = Vec::with_capacity(ARTIFACT_MAGIC.len() + 1 + body.len());
    out.extend_from_slice(ARTIFACT_MAGIC);
    out.push(codec);
    out.extend_from_slice(&body);
    Ok(out)
}

pub(crate) fn decode_artifact(bytes: &[u8]) -> Result<IndexArtifact, IndexError> {
    let header = ARTIFACT_MAGIC.len();
    if bytes.len() <= header || &bytes[..header] != ARTIFACT_MAGIC {
        return Err(IndexError::storage("not an index artifact (bad magic)"));
    }
    let body = &bytes[header + 1..];
    let decompressed = match bytes[header] {
        CODEC_RAW => body.to_vec(),
        CODEC_ZSTD => decode_all(body)?,
        other => return Err(IndexError::Storage(format!("unknown codec byte {other}"))),
    };

    let (artifact, read): (IndexArtifact, usize) = decode_from_slice(&decompressed, standard())?;
    if read != decompressed.len() {
        return Err(IndexError::Storage(format!(
            "{} trailing bytes after artifact record",
            decompressed.len() - read
        )));
    }
    artifact.validate()?;
    Ok(artifact)
}

/// Write `bytes` to `path` atomically: temp file in the same directory, fsync, rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| IndexError::storage(e.error))?;
    Ok(())
}

/// Read the artifact at `path`. A missing file is `Ok(None)`.
pub(crate) fn read_artifact(path: &Path) -> Result<Option<IndexArtifact>, IndexError> {
    match fs::read(path) {
        Ok(bytes) => decode_artifact(&bytes).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexArtifact {
        IndexArtifact {
            schema_version: INDEX_SCHEMA_VERSION,
            rows: 2,
            dimension: 2,
            matrix: vec![1.0, 0.0, 0.0, 1.0],
            metadata: vec![r#"{"a":1}"#.into(), r#"{"b":2}"#.into()],
            provenance: BTreeMap::from([("embedding_model".to_string(), "hash".to_string())]),
        }
    }

    #[test]
    fn encode_decode_both_codecs() {
        for codec in [CompressionCodec::None, CompressionCodec::Zstd] {
            let cfg = CompressionConfig::default().with_codec(codec);
            let bytes = encode_artifact(&sample(), &cfg).unwrap();
            assert_eq!(&bytes[..8], ARTIFACT_MAGIC);
            assert_eq!(decode_artifact(&bytes).unwrap(), sample());
        }
    }

    #[test]
    fn decode_rejects_bad_magic_and_codec() {
        assert!(decode_artifact(b"nope").is_err());

        let mut bytes = encode_artifact(&sample(), &CompressionConfig::default()).unwrap();
        bytes[8] = 7;
        let err = decode_artifact(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown codec"));
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let cfg = CompressionConfig::default().with_codec(CompressionCodec::None);
        let bytes = encode_artifact(&sample(), &cfg).unwrap();
        let err = decode_artifact(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(err.is_storage());
    }

    #[test]
    fn validate_rejects_row_metadata_mismatch() {
        let mut artifact = sample();
        artifact.metadata.pop();
        let err = artifact.validate().unwrap_err();
        assert!(err.to_string().contains("metadata records"));
    }

    #[test]
    fn validate_rejects_short_matrix() {
        let mut artifact = sample();
        artifact.matrix.pop();
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn atomic_write_and_missing_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.bin");
        assert!(read_artifact(&path).unwrap().is_none());

        let bytes = encode_artifact(&sample(), &CompressionConfig::default()).unwrap();
        write_atomic(&path, &bytes).unwrap();
        assert_eq!(read_artifact(&path).unwrap(), Some(sample()));
    }
}
