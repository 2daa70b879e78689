//! Result-row assembly and the result table artifact codec.
//!
//! Column order is fixed across the whole pipeline:
//! `date, id, token_0..token_{F-1}, topic_0..topic_{K-1}, execution_time,
//! pipeline_version`. Rows are immutable once assembled and are appended to
//! the durable sink verbatim.

use chrono::{FixedOffset, NaiveDate, Utc};

use crate::constants::results::{CLOCK_OFFSET_SECS, TIME_FORMAT};
use crate::corpus::check_field;
use crate::errors::PipelineError;
use crate::types::{RecordKey, Token, VersionTag};

/// One record's topic assignment for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct TopicAssignment {
    /// Run date.
    pub date: NaiveDate,
    /// External record identifier.
    pub id: RecordKey,
    /// The record's original token fields, in dataset order.
    pub fields: Vec<Token>,
    /// Full-width topic scores, one per topic slot.
    pub topics: Vec<f32>,
    /// Execution timestamp of the producing run.
    pub execution_time: String,
    /// Pipeline version tag of the producing run.
    pub pipeline_version: VersionTag,
}

/// Current wall-clock time in the pipeline's fixed-offset zone.
pub fn execution_timestamp() -> String {
    let offset = FixedOffset::east_opt(CLOCK_OFFSET_SECS).expect("valid fixed offset");
    Utc::now().with_timezone(&offset).format(TIME_FORMAT).to_string()
}

/// Render rows as the headerless result table artifact.
pub fn render_table(rows: &[TopicAssignment]) -> Result<String, PipelineError> {
    let mut out = String::new();
    for row in rows {
        check_field(&row.id)?;
        check_field(&row.execution_time)?;
        check_field(&row.pipeline_version)?;
        out.push_str(&row.date.to_string());
        out.push(',');
        out.push_str(&row.id);
        for field in &row.fields {
            check_field(field)?;
            out.push(',');
            out.push_str(field);
        }
        for score in &row.topics {
            out.push(',');
            out.push_str(&score.to_string());
        }
        out.push(',');
        out.push_str(&row.execution_time);
        out.push(',');
        out.push_str(&row.pipeline_version);
        out.push('\n');
    }
    Ok(out)
}

/// Parse the result table artifact against the fixed schema.
///
/// `token_fields` and `num_topics` are deployment constants; any row of a
/// different width, or with a non-numeric topic score, is a schema error.
pub fn parse_table(
    bytes: &[u8],
    token_fields: usize,
    num_topics: usize,
) -> Result<Vec<TopicAssignment>, PipelineError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| PipelineError::Schema(format!("result artifact is not utf-8: {err}")))?;
    let expected_width = 2 + token_fields + num_topics + 2;
    let mut rows = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() != expected_width {
            return Err(PipelineError::Schema(format!(
                "result row has {} columns, expected {expected_width}",
                cells.len()
            )));
        }
        let date = NaiveDate::parse_from_str(cells[0], "%Y-%m-%d")
            .map_err(|err| PipelineError::Schema(format!("bad date '{}': {err}", cells[0])))?;
        let id = cells[1].to_string();
        let fields: Vec<Token> = cells[2..2 + token_fields]
            .iter()
            .map(|cell| (*cell).to_string())
            .collect();
        let mut topics = Vec::with_capacity(num_topics);
        for cell in &cells[2 + token_fields..2 + token_fields + num_topics] {
            let score: f32 = cell.parse().map_err(|_| {
                PipelineError::Schema(format!("topic score '{cell}' is not a float"))
            })?;
            topics.push(score);
        }
        rows.push(TopicAssignment {
            date,
            id,
            fields,
            topics,
            execution_time: cells[expected_width - 2].to_string(),
            pipeline_version: cells[expected_width - 1].to_string(),
        });
    }
    Ok(rows)
}
