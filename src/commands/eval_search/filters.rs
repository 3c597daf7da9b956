use anyhow::{Result, bail};
use serde_json::Value;

/// Named record filters selectable from operator configs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum DatasetFilter {
    NoFilter,
    BusinessKnowledgeOnly,
}

impl DatasetFilter {
    pub(crate) const ALL: [DatasetFilter; 2] = [Self::NoFilter, Self::BusinessKnowledgeOnly];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::NoFilter => "no_filter",
            Self::BusinessKnowledgeOnly => "business_dataset_knowledge_only",
        }
    }

    pub(crate) fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(Self::NoFilter);
        }
        match Self::ALL.iter().find(|filter| filter.as_str() == trimmed) {
            Some(filter) => Ok(*filter),
            None => bail!(
                "unknown dataset filter '{trimmed}' (known: {})",
                Self::ALL
                    .iter()
                    .map(|filter| filter.as_str())
                    .collect::<Vec<&str>>()
                    .join(", ")
            ),
        }
    }

    pub(crate) fn accepts(self, meta_info: Option<&Value>) -> bool {
        match self {
            Self::NoFilter => true,
            Self::BusinessKnowledgeOnly => {
                let field = |key: &str| {
                    meta_info
                        .and_then(|meta| meta.get(key))
                        .and_then(Value::as_str)
                };
                field("is_abandoned") == Some("No")
                    && field("can_answer_be_found_in_url") == Some("Yes")
                    && field("range") == Some("Knowledge Base")
            }
        }
    }
}
