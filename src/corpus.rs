//! Dataset/vocabulary row shapes, their CSV codecs, and corpus assembly.
//!
//! Both preprocess artifacts are headerless CSV with a fixed column order,
//! matching the warehouse export format. Fields are flat category labels;
//! the codec rejects embedded separators instead of quoting.

use serde::{Deserialize, Serialize};

use crate::dictionary::{BowDocument, Dictionary};
use crate::errors::PipelineError;
use crate::types::{RecordKey, Token};

/// One dataset row: an external record identifier plus its token fields.
///
/// Empty fields are preserved for the result join but contribute no tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: RecordKey,
    pub fields: Vec<Token>,
}

impl DatasetRecord {
    /// Token fields that actually carry a token.
    pub fn tokens(&self) -> Vec<Token> {
        self.fields
            .iter()
            .filter(|field| !field.is_empty())
            .cloned()
            .collect()
    }
}

/// Ordered bag-of-words corpus with record identity retained out-of-band.
///
/// `docs[i]` is derived from `records[i]`; the pairing is positional and is
/// what the result assembly joins on.
#[derive(Clone, Debug, Default)]
pub struct Corpus {
    pub docs: Vec<BowDocument>,
    pub records: Vec<DatasetRecord>,
}

impl Corpus {
    /// Apply `dictionary` to every record, in order.
    pub fn build(dictionary: &Dictionary, records: Vec<DatasetRecord>) -> Self {
        let docs = records
            .iter()
            .map(|record| dictionary.doc_to_bow(&record.tokens()))
            .collect();
        Self { docs, records }
    }

    /// Number of documents (equals the number of records).
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True when the corpus holds no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Render vocabulary rows as a one-column headerless CSV artifact.
pub fn render_vocabulary(tokens: &[Token]) -> Result<String, PipelineError> {
    let mut out = String::new();
    for token in tokens {
        check_field(token)?;
        out.push_str(token);
        out.push('\n');
    }
    Ok(out)
}

/// Parse vocabulary rows; blank lines are skipped.
pub fn parse_vocabulary(bytes: &[u8]) -> Result<Vec<Token>, PipelineError> {
    let text = as_utf8(bytes)?;
    Ok(text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect())
}

/// Render dataset rows as a headerless CSV artifact (`id,field0,...`).
pub fn render_dataset(records: &[DatasetRecord]) -> Result<String, PipelineError> {
    let mut out = String::new();
    for record in records {
        check_field(&record.id)?;
        out.push_str(&record.id);
        for field in &record.fields {
            check_field(field)?;
            out.push(',');
            out.push_str(field);
        }
        out.push('\n');
    }
    Ok(out)
}

/// Parse dataset rows, requiring a consistent field count across rows.
pub fn parse_dataset(bytes: &[u8]) -> Result<Vec<DatasetRecord>, PipelineError> {
    let text = as_utf8(bytes)?;
    let mut records = Vec::new();
    let mut width: Option<usize> = None;
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let mut cells = line.split(',');
        let id = cells.next().unwrap_or_default().to_string();
        let fields: Vec<Token> = cells.map(|cell| cell.to_string()).collect();
        match width {
            None => width = Some(fields.len()),
            Some(expected) if expected != fields.len() => {
                return Err(PipelineError::Schema(format!(
                    "dataset row '{id}' has {} token fields, expected {expected}",
                    fields.len()
                )));
            }
            Some(_) => {}
        }
        records.push(DatasetRecord { id, fields });
    }
    Ok(records)
}

pub(crate) fn check_field(field: &str) -> Result<(), PipelineError> {
    if field.contains(',') || field.contains('\n') || field.contains('\r') {
        return Err(PipelineError::Schema(format!(
            "field '{field}' contains a separator character"
        )));
    }
    Ok(())
}

fn as_utf8(bytes: &[u8]) -> Result<&str, PipelineError> {
    std::str::from_utf8(bytes)
        .map_err(|err| PipelineError::Schema(format!("artifact is not utf-8: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, fields: &[&str]) -> DatasetRecord {
        DatasetRecord {
            id: id.to_string(),
            fields: fields.iter().map(|field| (*field).to_string()).collect(),
        }
    }

    #[test]
    fn vocabulary_roundtrips_through_csv() {
        let tokens = vec!["alpha".to_string(), "beta".to_string()];
        let rendered = render_vocabulary(&tokens).unwrap();
        assert_eq!(rendered, "alpha\nbeta\n");
        assert_eq!(parse_vocabulary(rendered.as_bytes()).unwrap(), tokens);
    }

    #[test]
    fn dataset_roundtrips_and_preserves_empty_fields() {
        let records = vec![record("1", &["alpha", "", "beta", "alpha"])];
        let rendered = render_dataset(&records).unwrap();
        assert_eq!(rendered, "1,alpha,,beta,alpha\n");
        assert_eq!(parse_dataset(rendered.as_bytes()).unwrap(), records);
    }

    #[test]
    fn inconsistent_row_width_is_a_schema_error() {
        let err = parse_dataset(b"1,alpha,beta\n2,alpha\n").unwrap_err();
        assert!(matches!(err, PipelineError::Schema(msg) if msg.contains("expected 2")));
    }

    #[test]
    fn separator_characters_are_rejected_on_encode() {
        let err = render_vocabulary(&["al,pha".to_string()]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn corpus_pairs_docs_with_records_positionally() {
        let dictionary = Dictionary::from_ordered_tokens(vec![
            "alpha".to_string(),
            "beta".to_string(),
        ]);
        let records = vec![
            record("1", &["alpha", "alpha", "beta", ""]),
            record("2", &["unknown", "", "", ""]),
        ];
        let corpus = Corpus::build(&dictionary, records);
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.docs[0], vec![(0, 2), (1, 1)]);
        assert!(corpus.docs[1].is_empty());
        assert_eq!(corpus.records[1].id, "2");
    }
}
