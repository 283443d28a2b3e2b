use anyhow::{Context, Result};
use docsearch::{Indexable, SearchEngineService};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::time::Instant;

/// Source for documents to reindex
pub enum DocumentSource {
    FromFile(PathBuf),
    FromStdin,
}

impl DocumentSource {
    pub fn reader(&self) -> io::Result<Box<dyn BufRead + Send>> {
        match self {
            DocumentSource::FromFile(path) => {
                let file = File::open(path)?;
                Ok(Box::new(BufReader::new(file)))
            }
            DocumentSource::FromStdin => Ok(Box::new(BufReader::new(io::stdin()))),
        }
    }
}

/// A JSONL line with its id pulled out
#[derive(Debug)]
struct JsonDocument {
    id: String,
    body: Value,
}

impl Serialize for JsonDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

impl Indexable for JsonDocument {
    fn id(&self) -> String {
        self.id.clone()
    }
}

fn read_documents(source: &DocumentSource, id_field: &str) -> Result<Vec<JsonDocument>> {
    let reader = source.reader()?;
    let mut documents = Vec::new();

    for (line_no, line_result) in reader.lines().enumerate() {
        let line = line_result.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }

        let body: Value = serde_json::from_str(&line).with_context(|| {
            format!(
                "Line {}: failed to parse JSON: {}",
                line_no + 1,
                line.chars().take(100).collect::<String>()
            )
        })?;
        let id = match body.get(id_field) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => anyhow::bail!("Line {}: missing '{}' member", line_no + 1, id_field),
        };
        documents.push(JsonDocument { id, body });
    }
    Ok(documents)
}

/// Run reindex command
pub async fn run_reindex(
    service: &SearchEngineService,
    index: &str,
    source: DocumentSource,
    id_field: &str,
    parent: Option<&str>,
) -> Result<()> {
    let start = Instant::now();
    let documents = read_documents(&source, id_field)?;
    println!("Reindexing {} document(s) into '{}'", documents.len(), index);

    let summary = service
        .indexer()
        .reindex_all(index, &documents, parent)
        .await
        .with_context(|| format!("Reindex of {} failed", index))?;

    println!("Reindex completed:");
    println!("  Documents: {}", summary.succeeded);
    println!("  Time:      {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_jsonl(lines: &str) -> (tempfile::NamedTempFile, DocumentSource) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(lines.as_bytes()).unwrap();
        let source = DocumentSource::FromFile(file.path().to_path_buf());
        (file, source)
    }

    #[test]
    fn test_read_documents() {
        let (_file, source) = write_jsonl(
            "{\"id\": \"s1\", \"name\": \"A\"}\n\n{\"id\": 7, \"name\": \"B\"}\n",
        );
        let docs = read_documents(&source, "id").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id(), "s1");
        assert_eq!(docs[1].id(), "7");
        assert_eq!(
            serde_json::to_value(&docs[0]).unwrap(),
            serde_json::json!({"id": "s1", "name": "A"})
        );
    }

    #[test]
    fn test_read_documents_missing_id() {
        let (_file, source) = write_jsonl("{\"name\": \"A\"}\n");
        let err = read_documents(&source, "id").unwrap_err();
        assert!(err.to_string().contains("missing 'id'"));
    }

    #[test]
    fn test_read_documents_malformed_multibyte_line() {
        let line = format!("{{\"id\": \"{}é{}", "x".repeat(91), "é".repeat(20));
        let (_file, source) = write_jsonl(&line);
        let err = read_documents(&source, "id").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Line 1: failed to parse JSON"));
        assert!(message.contains('é'));
    }
}
