//! Partition loading from JSON files

use std::path::Path;

use super::DatasetPartition;

/// Error type for partition loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid partition {id}: {reason}")]
    Invalid { id: String, reason: String },
}

/// Load and validate a partition file.
///
/// The file stem becomes the partition id when the file does not name one.
pub fn load_partition(path: impl AsRef<Path>) -> Result<DatasetPartition, LoadError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let fallback_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    load_partition_from_str(&content, &fallback_id)
}

/// Parse and validate a partition from a JSON string
pub fn load_partition_from_str(content: &str, fallback_id: &str) -> Result<DatasetPartition, LoadError> {
    let mut value: serde_json::Value = serde_json::from_str(content)?;
    if let Some(obj) = value.as_object_mut() {
        obj.entry("id")
            .or_insert_with(|| serde_json::Value::String(fallback_id.to_string()));
    }
    let partition: DatasetPartition = serde_json::from_value(value)?;
    validate(&partition)?;
    Ok(partition)
}

fn validate(partition: &DatasetPartition) -> Result<(), LoadError> {
    let invalid = |reason: String| LoadError::Invalid {
        id: partition.id.clone(),
        reason,
    };

    let ranges = std::iter::once(partition.scale.value).chain(partition.scale.values);
    for range in ranges {
        if !(range.min.is_finite() && range.max.is_finite()) || range.min >= range.max {
            return Err(invalid(format!("scale {}..{} is empty", range.min, range.max)));
        }
    }

    if partition.data.is_empty() {
        return Err(invalid("no data".to_string()));
    }

    for (idx, entry) in partition.data.iter().enumerate() {
        if entry.term1.trim().is_empty() || entry.term2.trim().is_empty() {
            return Err(invalid(format!("entry {} has an empty term", idx)));
        }
        if entry.resolved_value(&partition.scale).is_none() {
            return Err(invalid(format!(
                "entry {} ({}, {}) has no value",
                idx, entry.term1, entry.term2
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MeasureType;

    const PARTITION: &str = r#"{
        "language": "en",
        "measure_type": "similarity",
        "scale": { "value": { "min": 0, "max": 10 } },
        "data": [
            { "term1": "Car", "term2": "automobile", "value": 9.5 },
            { "term1": "cup", "term2": "forest", "values": [0, 1, 2] }
        ]
    }"#;

    #[test]
    fn test_load_partition_from_str() {
        let partition = load_partition_from_str(PARTITION, "simlex-en").unwrap();
        assert_eq!(partition.id, "simlex-en");
        assert_eq!(partition.measure_type, MeasureType::Similarity);
        assert_eq!(partition.data.len(), 2);
    }

    #[test]
    fn test_rejects_empty_scale() {
        let bad = PARTITION.replace(r#""max": 10"#, r#""max": 0"#);
        assert!(matches!(
            load_partition_from_str(&bad, "x"),
            Err(LoadError::Invalid { .. })
        ));
    }

    #[test]
    fn test_rejects_entry_without_value() {
        let bad = PARTITION.replace(r#", "values": [0, 1, 2]"#, "");
        assert!(matches!(
            load_partition_from_str(&bad, "x"),
            Err(LoadError::Invalid { .. })
        ));
    }

    #[test]
    fn test_load_partition_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wordsim-en.json");
        std::fs::write(&path, PARTITION).unwrap();

        let partition = load_partition(&path).unwrap();
        assert_eq!(partition.id, "wordsim-en");
    }
}
