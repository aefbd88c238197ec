use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use simeval_types::Sample;

#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn load(&self) -> Result<Vec<Sample>>;
}

pub struct VecSampleSource {
    samples: Vec<Sample>,
}

impl VecSampleSource {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

#[async_trait]
impl SampleSource for VecSampleSource {
    async fn load(&self) -> Result<Vec<Sample>> {
        Ok(self.samples.clone())
    }
}

/// Read JSONL where each line is:
/// {"id"?: "...", "prediction": "...", "reference": "...", "context"?: "...",
///  "conversation"?: [{"role": "user", "content": "..."}]}
pub struct JsonlSampleSource {
    path: PathBuf,
}

impl JsonlSampleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SampleSource for JsonlSampleSource {
    async fn load(&self) -> Result<Vec<Sample>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        let mut samples = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let sample: Sample = serde_json::from_str(line)
                .with_context(|| format!("Invalid sample on line {}", idx + 1))?;
            samples.push(sample);
        }
        if samples.is_empty() {
            return Err(anyhow!("{:?} contains no samples", self.path));
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use simeval_types::{Role, Turn};

    use super::*;

    #[tokio::test]
    async fn test_jsonl_reads_optional_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"q1","prediction":"A","reference":"a"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"prediction":"París","reference":"Paris","context":"Francia","conversation":[{{"role":"user","content":"¿Capital?"}}]}}"#
        )
        .unwrap();

        let samples = JsonlSampleSource::new(file.path()).load().await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].id.as_deref(), Some("q1"));
        assert_eq!(samples[1].context.as_deref(), Some("Francia"));
        assert_eq!(samples[1].conversation, vec![Turn::new(Role::User, "¿Capital?")]);
    }

    #[tokio::test]
    async fn test_jsonl_names_bad_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"prediction":"A","reference":"a"}}"#).unwrap();
        writeln!(file, r#"{{"prediction":"missing reference"}}"#).unwrap();

        let err = JsonlSampleSource::new(file.path()).load().await.unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_empty_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(JsonlSampleSource::new(file.path()).load().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.jsonl");
        let err = JsonlSampleSource::new(&path).load().await.unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[tokio::test]
    async fn test_vec_source_returns_samples() {
        let source = VecSampleSource::new(vec![Sample::new("x", "y")]);
        assert_eq!(source.load().await.unwrap(), vec![Sample::new("x", "y")]);
    }
}
