//! Read-only data shared by every session
//!
//! The snapshot is loaded once at startup from the providers below and never
//! mutated afterwards, so sessions hold it behind an `Arc`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::{
    error::{AppError, AppResult},
    models::{Item, QuestionNode},
};

/// Source of catalog items (with their precomputed embeddings)
pub trait CatalogProvider: Send + Sync {
    fn items(&self) -> AppResult<Vec<Item>>;

    /// Precomputed tag -> IDF map. When `None` it is derived from the items.
    fn idf(&self) -> AppResult<Option<HashMap<String, f64>>> {
        Ok(None)
    }
}

/// Source of the branching question graph
pub trait QuestionGraphProvider: Send + Sync {
    fn questions(&self) -> AppResult<Vec<QuestionNode>>;
}

/// Source of tag embeddings, in the same vector space as item embeddings
pub trait TagEmbeddingProvider: Send + Sync {
    fn tag_embeddings(&self) -> AppResult<HashMap<String, Vec<f32>>>;
}

/// Item catalog with catalog-wide IDF weights
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<Item>,
    idf: HashMap<String, f64>,
}

impl Catalog {
    /// Builds a catalog and derives IDF from the full item list
    pub fn from_items(items: Vec<Item>) -> Self {
        let idf = Self::compute_idf(&items);
        Self { items, idf }
    }

    pub fn with_idf(items: Vec<Item>, idf: HashMap<String, f64>) -> Self {
        Self { items, idf }
    }

    /// IDF = ln(total / (1 + items containing tag))
    pub fn compute_idf(items: &[Item]) -> HashMap<String, f64> {
        let total = items.len() as f64;
        let mut document_frequency: HashMap<&str, usize> = HashMap::new();

        for item in items {
            let unique: HashSet<&str> = item.tags.iter().map(String::as_str).collect();
            for tag in unique {
                *document_frequency.entry(tag).or_insert(0) += 1;
            }
        }

        document_frequency
            .into_iter()
            .map(|(tag, df)| (tag.to_string(), (total / (1.0 + df as f64)).ln()))
            .collect()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    /// IDF weight for a tag; tags missing from the map weigh 1.0
    pub fn idf(&self, tag: &str) -> f64 {
        self.idf.get(tag).copied().unwrap_or(1.0)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Immutable question graph with a complete node -> topic mapping
#[derive(Debug, Clone, Default)]
pub struct QuestionGraph {
    nodes: Vec<QuestionNode>,
    topics: HashMap<String, String>,
}

impl QuestionGraph {
    /// Validates ids and resolves topics
    ///
    /// A node without its own topic inherits the topic of the question that
    /// owns its `parent_answer_id`, transitively up to the root.
    pub fn new(nodes: Vec<QuestionNode>) -> AppResult<Self> {
        let mut seen = HashSet::new();
        for node in &nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(AppError::InvalidArgument(format!(
                    "Duplicate question id {}",
                    node.id
                )));
            }
        }

        let answer_owner: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .flat_map(|(idx, node)| node.answers.iter().map(move |a| (a.id.as_str(), idx)))
            .collect();

        let mut topics = HashMap::new();
        for node in &nodes {
            let mut current = node;
            let mut hops = 0;
            let topic = loop {
                if let Some(topic) = &current.topic {
                    break Some(topic.clone());
                }
                let parent = current
                    .parent_answer_id
                    .as_deref()
                    .and_then(|answer_id| answer_owner.get(answer_id));
                match parent {
                    Some(&idx) if hops < nodes.len() => {
                        current = &nodes[idx];
                        hops += 1;
                    }
                    _ => break None,
                }
            };

            if let Some(topic) = topic {
                topics.insert(node.id.clone(), topic);
            }
        }

        tracing::debug!(
            nodes = nodes.len(),
            with_topic = topics.len(),
            "Question graph resolved"
        );

        Ok(Self { nodes, topics })
    }

    pub fn nodes(&self) -> &[QuestionNode] {
        &self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&QuestionNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn topic_of(&self, id: &str) -> Option<&str> {
        self.topics.get(id).map(String::as_str)
    }

    /// Distinct topics of root questions, in catalog order
    pub fn root_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for node in self.nodes.iter().filter(|n| n.parent_answer_id.is_none()) {
            if let Some(topic) = self.topic_of(&node.id) {
                if !topics.iter().any(|t| t == topic) {
                    topics.push(topic.to_string());
                }
            }
        }
        topics
    }
}

/// Everything a session reads but never writes
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub catalog: Catalog,
    pub graph: QuestionGraph,
    pub tag_embeddings: HashMap<String, Vec<f32>>,
}

impl Snapshot {
    pub fn load(
        items: &dyn CatalogProvider,
        questions: &dyn QuestionGraphProvider,
        tags: &dyn TagEmbeddingProvider,
    ) -> AppResult<Self> {
        let catalog = match items.idf()? {
            Some(idf) => Catalog::with_idf(items.items()?, idf),
            None => Catalog::from_items(items.items()?),
        };
        let graph = QuestionGraph::new(questions.questions()?)?;
        let tag_embeddings = tags.tag_embeddings()?;

        tracing::info!(
            items = catalog.len(),
            questions = graph.nodes().len(),
            tag_embeddings = tag_embeddings.len(),
            "Snapshot loaded"
        );

        Ok(Self {
            catalog,
            graph,
            tag_embeddings,
        })
    }
}

/// Loads the snapshot from JSON files on disk
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    pub catalog_path: PathBuf,
    pub questions_path: PathBuf,
    pub tag_embeddings_path: PathBuf,
}

impl JsonFileProvider {
    fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Internal(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            AppError::Internal(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}

impl CatalogProvider for JsonFileProvider {
    fn items(&self) -> AppResult<Vec<Item>> {
        Self::read_json(&self.catalog_path)
    }
}

impl QuestionGraphProvider for JsonFileProvider {
    fn questions(&self) -> AppResult<Vec<QuestionNode>> {
        Self::read_json(&self.questions_path)
    }
}

impl TagEmbeddingProvider for JsonFileProvider {
    fn tag_embeddings(&self) -> AppResult<HashMap<String, Vec<f32>>> {
        // Tag embeddings are optional
        if !self.tag_embeddings_path.exists() {
            tracing::warn!(
                path = %self.tag_embeddings_path.display(),
                "Tag embeddings not found, semantic similarity disabled"
            );
            return Ok(HashMap::new());
        }
        Self::read_json(&self.tag_embeddings_path)
    }
}
