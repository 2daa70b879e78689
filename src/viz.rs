//! Topic visualization summary artifact.
//!
//! A data-only stand-in for a rendered topic browser: per-topic top terms and
//! per-document topic mixtures, derived from the same (model, corpus,
//! dictionary) triple as the result rows. Rendering itself is out of scope.

use serde::{Deserialize, Serialize};

use crate::constants::model::VIS_TOP_TERMS;
use crate::errors::PipelineError;
use crate::model::OnlineLda;
use crate::types::RecordKey;

/// Topic/term and topic/document relationships for one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopicVis {
    pub topics: Vec<TopicTerms>,
    pub documents: Vec<DocumentTopics>,
}

/// Heaviest terms of one topic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopicTerms {
    pub topic: usize,
    pub terms: Vec<TermWeight>,
}

/// One term's normalized weight within a topic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TermWeight {
    pub term: String,
    pub weight: f64,
}

/// One document's topic mixture.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentTopics {
    pub id: RecordKey,
    pub weights: Vec<f64>,
}

impl TopicVis {
    /// Summarize `model` together with the run's per-document distributions.
    ///
    /// `record_ids` and `distributions` are positional, in corpus order.
    pub fn prepare(
        model: &OnlineLda,
        record_ids: &[RecordKey],
        distributions: &[Vec<f64>],
    ) -> Self {
        let topics = (0..model.num_topics())
            .map(|topic| TopicTerms {
                topic,
                terms: model
                    .topic_terms(topic, VIS_TOP_TERMS)
                    .into_iter()
                    .filter_map(|(token_id, weight)| {
                        model.vocab().get(token_id as usize).map(|term| TermWeight {
                            term: term.clone(),
                            weight,
                        })
                    })
                    .collect(),
            })
            .collect();
        let documents = record_ids
            .iter()
            .zip(distributions)
            .map(|(id, weights)| DocumentTopics {
                id: id.clone(),
                weights: weights.clone(),
            })
            .collect();
        Self { topics, documents }
    }

    /// Serialize as the JSON artifact payload.
    pub fn to_json(&self) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec_pretty(self)
            .map_err(|err| PipelineError::Schema(format!("visualization encoding: {err}")))
    }
}
