//! JSON Lines loaders for corpus snapshots and labeled evaluation queries.

use std::{
    collections::HashSet,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::{
    chunk::Document,
    error::{Error, Result},
    eval::LabeledQuery,
};

/// Read one [`Document`] per non-blank line.
///
/// Documents with empty text or a repeated id are rejected with the line
/// number.
pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let records: Vec<(usize, Document)> = read_jsonl(path)?;

    let mut seen = HashSet::new();
    let mut documents = Vec::with_capacity(records.len());
    for (line, document) in records {
        if document.text.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "{}:{line}: document {} has no text",
                path.display(),
                document.id
            )));
        }
        if !seen.insert(document.id.clone()) {
            return Err(Error::InvalidInput(format!(
                "{}:{line}: duplicate document id {}",
                path.display(),
                document.id
            )));
        }
        if document.source().is_none() {
            warn!(id = %document.id, "document has no source metadata");
        }
        documents.push(document);
    }

    info!(path = %path.display(), documents = documents.len(), "corpus loaded");
    Ok(documents)
}

/// Read one [`LabeledQuery`] per non-blank line.
pub fn read_labeled_queries(path: &Path) -> Result<Vec<LabeledQuery>> {
    let queries: Vec<LabeledQuery> =
        read_jsonl(path)?.into_iter().map(|(_, q)| q).collect();
    info!(path = %path.display(), queries = queries.len(), "labeled queries loaded");
    Ok(queries)
}

/// Parse every non-blank line, pairing each record with its 1-based line.
fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<(usize, T)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            Error::InvalidInput(format!("{}:{}: {e}", path.display(), i + 1))
        })?;
        records.push((i + 1, record));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::chunk::MetadataValue;

    fn jsonl(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn reads_documents_and_skips_blank_lines() {
        let file = jsonl(&[
            r#"{"id":"faq.md:0","text":"Reset it.","metadata":{"source":"faq.md","page":3}}"#,
            "",
            r#"{"id":"b","text":"No metadata."}"#,
        ]);

        let docs = read_documents(file.path()).unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source(), Some("faq.md"));
        assert_eq!(docs[0].metadata["page"], MetadataValue::Int(3));
        assert!(docs[1].metadata.is_empty());
    }

    #[test]
    fn rejects_empty_text_with_line_number() {
        let file = jsonl(&[r#"{"id":"a","text":"ok"}"#, r#"{"id":"b","text":"  "}"#]);

        let err = read_documents(file.path()).unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains(":2:"), "{err}");
    }

    #[test]
    fn rejects_duplicate_ids() {
        let file = jsonl(&[r#"{"id":"a","text":"one"}"#, r#"{"id":"a","text":"two"}"#]);

        let err = read_documents(file.path()).unwrap_err();

        assert!(err.to_string().contains("duplicate document id a"), "{err}");
    }

    #[test]
    fn malformed_line_is_invalid_input() {
        let file = jsonl(&[r#"{"id":"a""#]);

        let err = read_documents(file.path()).unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains(":1:"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_documents(&dir.path().join("absent.jsonl")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn reads_labeled_queries() {
        let file = jsonl(&[
            r#"{"query":"reset password","expected_ids":["faq.md:0"]}"#,
            r#"{"query":"invoice","expected_ids":[]}"#,
        ]);

        let queries = read_labeled_queries(file.path()).unwrap();

        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].expected_ids, vec!["faq.md:0"]);
    }
}
