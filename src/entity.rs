//! Entity and graph records.
//!
//! The loader boundary is deliberately small: an entity is an IRI plus an
//! ordered, de-duplicated list of labels. Label values that are not strings
//! (a JSON `null`, an IRI or blank node in `rdfs:label` position) are kept
//! aside as malformed so the worker can skip and count the affected pairs.
//! Nothing downstream knows which RDF library or file format produced it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A class from one of the two graphs being aligned.
///
/// Entities are immutable once constructed; stages after loading only ever
/// borrow them.
///
/// # Examples
///
/// ```
/// use lexalign::Entity;
///
/// let heart = Entity::new("http://mouse.owl#MA_0000072", ["heart", "Heart", "heart"]);
/// assert_eq!(heart.labels(), ["heart", "Heart"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "EntityRecord")]
pub struct Entity {
    iri: String,
    labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    malformed_labels: Vec<String>,
}

#[derive(Deserialize)]
struct EntityRecord {
    iri: String,
    #[serde(default)]
    labels: Vec<Value>,
    #[serde(default)]
    malformed_labels: Vec<String>,
}

impl From<EntityRecord> for Entity {
    fn from(record: EntityRecord) -> Self {
        let mut labels = Vec::with_capacity(record.labels.len());
        let mut malformed = record.malformed_labels;
        for value in record.labels {
            match value {
                Value::String(label) => labels.push(label),
                other => malformed.push(other.to_string()),
            }
        }
        Self::new(record.iri, labels).with_malformed_labels(malformed)
    }
}

impl Entity {
    /// Creates an entity. Duplicate labels are dropped, first occurrence wins.
    #[must_use]
    pub fn new<I, L>(iri: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for label in labels {
            let label = label.into();
            if !unique.contains(&label) {
                unique.push(label);
            }
        }
        Self {
            iri: iri.into(),
            labels: unique,
            malformed_labels: Vec::new(),
        }
    }

    /// Creates an entity without labels.
    #[must_use]
    pub fn unlabeled(iri: impl Into<String>) -> Self {
        Self::new(iri, Vec::<String>::new())
    }

    /// Attaches label values that are not strings, rendered as found.
    #[must_use]
    pub fn with_malformed_labels<I, L>(mut self, found: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.malformed_labels.extend(found.into_iter().map(Into::into));
        self
    }

    /// The entity's IRI.
    #[must_use]
    pub fn iri(&self) -> &str {
        &self.iri
    }

    /// Labels in load order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Label values that could not be read as strings.
    #[must_use]
    pub fn malformed_labels(&self) -> &[String] {
        &self.malformed_labels
    }

    /// Returns true if the entity carries no labels at all.
    #[must_use]
    pub fn is_unlabeled(&self) -> bool {
        self.labels.is_empty()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.iri)
    }
}

/// A loaded graph: the ordered entity list plus where it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    /// Source identifier (usually a file path).
    pub source: String,
    /// Entities in load order.
    pub entities: Vec<Entity>,
}

impl Graph {
    /// Creates a graph from an entity list.
    #[must_use]
    pub fn new(source: impl Into<String>, entities: Vec<Entity>) -> Self {
        Self {
            source: source.into(),
            entities,
        }
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the graph has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Total number of labels over all entities.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.entities.iter().map(|e| e.labels().len()).sum()
    }
}

/// One entity from each graph, considered jointly for a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidatePair<'a> {
    /// Entity from the first graph.
    pub source: &'a Entity,
    /// Entity from the second graph.
    pub target: &'a Entity,
}

impl<'a> CandidatePair<'a> {
    /// Pairs two borrowed entities.
    #[must_use]
    pub const fn new(source: &'a Entity, target: &'a Entity) -> Self {
        Self { source, target }
    }

    /// Number of label combinations the worker will score for this pair.
    #[must_use]
    pub fn combinations(&self) -> usize {
        self.source.labels().len() * self.target.labels().len()
    }
}
