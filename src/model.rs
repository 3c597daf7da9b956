use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A parsed document node as written by the upstream parser and searcher.
/// Fields this tool does not interpret are carried through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A retrieved node together with its retrieval score, in rank order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub node: NodeRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Passage {
    pub fn from_node(node: NodeRecord) -> Self {
        Self {
            node,
            score: None,
            extra: Map::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.node.text
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallResults {
    #[serde(default)]
    pub source_nodes: Vec<Passage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Required answer fragments. The flat form is the legacy dataset layout; in
/// the grouped form each inner list is one information point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FineKeywords {
    Flat(Vec<String>),
    Grouped(Vec<Vec<String>>),
}

impl Default for FineKeywords {
    fn default() -> Self {
        Self::Flat(Vec::new())
    }
}

/// One line of `recall_results.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query: String,
    #[serde(default)]
    pub fine_keywords: FineKeywords,
    #[serde(default)]
    pub coarse_keywords: Vec<String>,
    #[serde(default)]
    pub recall_results: RecallResults,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_info: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitBy {
    TopHit,
    RecallHit,
    OfflineHit,
    NoHit,
}

impl HitBy {
    /// Tiers in the order they are attempted.
    pub const PRIORITY: [HitBy; 3] = [Self::TopHit, Self::RecallHit, Self::OfflineHit];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopHit => "top_hit",
            Self::RecallHit => "recall_hit",
            Self::OfflineHit => "offline_hit",
            Self::NoHit => "no_hit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub hit_by: HitBy,
    pub hit_score: f64,
    pub keywords_missing: Vec<String>,
    pub keywords_content: String,
    pub gold_result: Vec<Passage>,
    #[serde(default)]
    pub prompt: String,
}

/// One line of `eval_results_detail.json`: the query record with its recall
/// list replaced by the evaluation outcome and the top-k slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatedRecord {
    pub query: String,
    pub fine_keywords: FineKeywords,
    pub coarse_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_info: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    pub eval_results: EvalResult,
    #[serde(default)]
    pub topk_results: Vec<Passage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub source_nodes: Vec<Passage>,
    #[serde(default)]
    pub metadata: Value,
}

/// One example of `predictions.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionExample {
    pub query: String,
    #[serde(default)]
    pub reference_answer: String,
    #[serde(default)]
    pub predictions: Prediction,
    #[serde(default, skip_serializing)]
    pub recall_results: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionSet {
    pub examples: Vec<PredictionExample>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputHash {
    pub path: String,
    pub sha256: String,
}

#[cfg(test)]
mod tests {
    use super::{FineKeywords, HitBy, QueryRecord};

    #[test]
    fn query_record_accepts_grouped_keywords_and_keeps_unknown_fields() {
        let raw = r#"
        {
          "query": "how is coal supplied?",
          "fine_keywords": [["stable", "supply"], ["transport"]],
          "coarse_keywords": ["coal"],
          "reference_answer": "by rail",
          "recall_results": {
            "response": null,
            "source_nodes": [
              {"node": {"id_": "n1", "text": "coal supply", "metadata": {"file": "a.pdf"}}, "score": 0.9}
            ],
            "metadata": null
          }
        }
        "#;

        let record: QueryRecord =
            serde_json::from_str(raw).expect("grouped record should deserialize");
        assert!(matches!(record.fine_keywords, FineKeywords::Grouped(ref groups) if groups.len() == 2));
        assert_eq!(record.recall_results.source_nodes.len(), 1);
        assert_eq!(record.recall_results.source_nodes[0].score, Some(0.9));
        assert_eq!(
            record.recall_results.source_nodes[0].node.extra.get("id_"),
            Some(&serde_json::json!("n1"))
        );
        assert_eq!(
            record.extra.get("reference_answer"),
            Some(&serde_json::json!("by rail"))
        );
        assert!(record.meta_info.is_none());
    }

    #[test]
    fn query_record_accepts_legacy_flat_keywords() {
        let raw = r#"{"query": "q", "fine_keywords": ["a", "b"], "coarse_keywords": ["c"]}"#;
        let record: QueryRecord =
            serde_json::from_str(raw).expect("flat record should deserialize");
        assert_eq!(
            record.fine_keywords,
            FineKeywords::Flat(vec!["a".to_string(), "b".to_string()])
        );
        assert!(record.recall_results.source_nodes.is_empty());
    }

    #[test]
    fn hit_by_serializes_as_snake_case() {
        let value = serde_json::to_value(HitBy::OfflineHit).expect("hit_by should serialize");
        assert_eq!(value, serde_json::json!("offline_hit"));
        assert_eq!(HitBy::NoHit.as_str(), "no_hit");
    }
}
