use std::path::Path;

use anyhow::Result;
use tracing::{error, info};

use crate::model::{NodeRecord, Passage};
use crate::text::normalize;
use crate::util::read_json;

/// Query-independent pool of every parsed node, searched as the last tier.
/// Text is normalized once here, so matching against it skips normalization.
#[derive(Debug, Clone, Default)]
pub(crate) struct OfflineCorpus {
    passages: Vec<Passage>,
}

impl OfflineCorpus {
    pub(crate) fn from_nodes(nodes: Vec<NodeRecord>) -> Self {
        let passages = nodes
            .into_iter()
            .map(|mut node| {
                node.text = normalize(&node.text);
                Passage::from_node(node)
            })
            .collect();
        Self { passages }
    }

    /// Loads `path`; a missing file yields an empty corpus so that the
    /// offline tier simply never matches.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            error!(
                path = %path.display(),
                "offline corpus not found; offline tier disabled (check the file or its link)"
            );
            return Ok(Self::default());
        }

        let nodes: Vec<NodeRecord> = read_json(path)?;
        info!(path = %path.display(), nodes = nodes.len(), "loaded offline corpus");
        Ok(Self::from_nodes(nodes))
    }

    pub(crate) fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub(crate) fn len(&self) -> usize {
        self.passages.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}
