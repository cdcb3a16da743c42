//! Graph loading.
//!
//! Turns an ontology file into a [`Graph`]: every named `owl:Class` subject
//! becomes an [`Entity`] carrying the lexical forms of its `rdfs:label`
//! literals. Turtle, N-Triples and RDF/XML go through Rio; `.json` files hold
//! a plain array of `{ "iri": ..., "labels": [...] }` records.
//!
//! An `rdfs:label` whose object is an IRI or blank node, and a JSON label that
//! is not a string, does not fail the load: it is kept on the entity as a
//! malformed label and the worker skips pairs involving that entity.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread;
use std::time::Instant;

use oxiri::Iri;
use rio_api::model::{Literal, NamedNode, Subject, Term, Triple};
use rio_api::parser::TriplesParser;
use rio_turtle::{NTriplesParser, TurtleParser};
use rio_xml::RdfXmlParser;
use tracing::{debug, info, warn};

use crate::entity::{Entity, Graph};
use crate::error::{AlignError, AlignResult, LoadError};

/// `rdf:type`.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
/// `rdfs:label`.
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
/// `owl:Class`.
pub const OWL_CLASS: &str = "http://www.w3.org/2002/07/owl#Class";

/// Source of entity collections.
///
/// Implementations must be shareable across threads; both graphs of a run
/// are loaded concurrently.
pub trait GraphLoader: Send + Sync {
    /// Loads the graph identified by `source`.
    ///
    /// # Errors
    /// `LoadError` if the source cannot be read or parsed.
    fn load(&self, source: &Path) -> Result<Graph, LoadError>;
}

/// On-disk graph formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    /// `.ttl` or `.turtle`.
    Turtle,
    /// `.nt`.
    NTriples,
    /// `.owl`, `.rdf` or `.xml`.
    RdfXml,
    /// `.json` entity array.
    Json,
}

impl GraphFormat {
    /// Picks the format from a path's extension (case-insensitive).
    ///
    /// # Errors
    /// `LoadError::UnsupportedFormat` for any other extension.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("ttl" | "turtle") => Ok(Self::Turtle),
            Some("nt") => Ok(Self::NTriples),
            Some("owl" | "rdf" | "xml") => Ok(Self::RdfXml),
            Some("json") => Ok(Self::Json),
            _ => Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Loads graphs from local files.
#[derive(Debug, Clone, Default)]
pub struct FileLoader {
    base_iri: Option<Iri<String>>,
}

impl FileLoader {
    /// Loader without a base IRI.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Base IRI used to resolve relative IRIs in Turtle and RDF/XML documents.
    ///
    /// # Errors
    /// `LoadError::InvalidIri` if `iri` is not an absolute IRI.
    pub fn with_base_iri(mut self, iri: &str) -> Result<Self, LoadError> {
        let parsed = Iri::parse(iri.to_string()).map_err(|e| LoadError::InvalidIri {
            iri: iri.to_string(),
            message: e.to_string(),
        })?;
        self.base_iri = Some(parsed);
        Ok(self)
    }

    /// Parses a Turtle document from a reader.
    ///
    /// # Errors
    /// `LoadError::Parse` on a syntax error; `path` only names the source.
    pub fn read_turtle<R: BufRead>(&self, reader: R, path: &Path) -> Result<Vec<Entity>, LoadError> {
        let mut parser = TurtleParser::new(reader, self.base_iri.clone());
        collect_classes(&mut parser, path)
    }

    /// Parses an N-Triples document from a reader.
    ///
    /// # Errors
    /// `LoadError::Parse` on a syntax error.
    pub fn read_ntriples<R: BufRead>(&self, reader: R, path: &Path) -> Result<Vec<Entity>, LoadError> {
        let mut parser = NTriplesParser::new(reader);
        collect_classes(&mut parser, path)
    }

    /// Parses an RDF/XML document (the usual `.owl` serialization).
    ///
    /// # Errors
    /// `LoadError::Parse` on malformed XML or RDF/XML syntax.
    pub fn read_rdf_xml<R: BufRead>(&self, reader: R, path: &Path) -> Result<Vec<Entity>, LoadError> {
        let mut parser = RdfXmlParser::new(reader, self.base_iri.clone());
        collect_classes(&mut parser, path)
    }

    /// Parses a JSON entity array from a reader.
    ///
    /// # Errors
    /// `LoadError::Parse` on malformed JSON. Non-string labels are kept as
    /// malformed labels instead.
    pub fn read_json<R: BufRead>(&self, reader: R, path: &Path) -> Result<Vec<Entity>, LoadError> {
        serde_json::from_reader(reader).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

impl GraphLoader for FileLoader {
    fn load(&self, source: &Path) -> Result<Graph, LoadError> {
        let format = GraphFormat::from_path(source)?;
        let start = Instant::now();
        let file = File::open(source).map_err(|e| LoadError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let reader = BufReader::new(file);

        let entities = match format {
            GraphFormat::Turtle => self.read_turtle(reader, source)?,
            GraphFormat::NTriples => self.read_ntriples(reader, source)?,
            GraphFormat::RdfXml => self.read_rdf_xml(reader, source)?,
            GraphFormat::Json => self.read_json(reader, source)?,
        };

        let graph = Graph::new(source.display().to_string(), entities);
        info!(
            path = %source.display(),
            format = ?format,
            entities = graph.len(),
            labels = graph.label_count(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "loaded graph"
        );
        Ok(graph)
    }
}

/// Class and label triples seen so far, in first-mention order.
#[derive(Default)]
struct ClassCollector {
    order: Vec<String>,
    mentioned: HashSet<String>,
    classes: HashSet<String>,
    labels: HashMap<String, Vec<String>>,
    malformed: HashMap<String, Vec<String>>,
}

impl ClassCollector {
    fn mention(&mut self, iri: &str) {
        if self.mentioned.insert(iri.to_string()) {
            self.order.push(iri.to_string());
        }
    }

    fn add(&mut self, triple: &Triple<'_>) {
        let Subject::NamedNode(NamedNode { iri: subject }) = triple.subject else {
            return;
        };
        match (triple.predicate.iri, &triple.object) {
            (RDF_TYPE, Term::NamedNode(NamedNode { iri: OWL_CLASS })) => {
                self.mention(subject);
                self.classes.insert(subject.to_string());
            }
            (RDFS_LABEL, Term::Literal(literal)) => {
                self.mention(subject);
                self.labels
                    .entry(subject.to_string())
                    .or_default()
                    .push(lexical_form(literal).to_string());
            }
            (RDFS_LABEL, object) => {
                self.mention(subject);
                self.malformed
                    .entry(subject.to_string())
                    .or_default()
                    .push(object.to_string());
            }
            _ => {}
        }
    }

    fn finish(self) -> Vec<Entity> {
        let Self {
            order,
            classes,
            mut labels,
            mut malformed,
            ..
        } = self;
        order
            .into_iter()
            .filter(|iri| classes.contains(iri))
            .map(|iri| {
                let class_labels = labels.remove(&iri).unwrap_or_default();
                let bad_labels = malformed.remove(&iri).unwrap_or_default();
                Entity::new(iri, class_labels).with_malformed_labels(bad_labels)
            })
            .collect()
    }
}

fn lexical_form<'a>(literal: &Literal<'a>) -> &'a str {
    match *literal {
        Literal::Simple { value }
        | Literal::LanguageTaggedString { value, .. }
        | Literal::Typed { value, .. } => value,
    }
}

fn collect_classes<P>(parser: &mut P, path: &Path) -> Result<Vec<Entity>, LoadError>
where
    P: TriplesParser,
    P::Error: fmt::Display,
{
    let mut collector = ClassCollector::default();
    let mut triples = 0u64;
    parser
        .parse_all(&mut |triple| {
            triples += 1;
            collector.add(&triple);
            Ok::<(), P::Error>(())
        })
        .map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    debug!(path = %path.display(), triples, "parsed triples");
    let entities = collector.finish();
    let malformed: usize = entities.iter().map(|e| e.malformed_labels().len()).sum();
    if malformed > 0 {
        warn!(path = %path.display(), malformed, "rdfs:label values that are not literals");
    }
    Ok(entities)
}

/// Loads both graphs of a run concurrently and waits for both.
///
/// # Errors
/// The source graph's error if both fail, otherwise whichever failed.
pub fn load_pair<L: GraphLoader + ?Sized>(
    loader: &L,
    source: &Path,
    target: &Path,
) -> AlignResult<(Graph, Graph)> {
    thread::scope(|scope| {
        let source_handle = thread::Builder::new()
            .name("lexalign-load-source".to_string())
            .spawn_scoped(scope, || loader.load(source))
            .map_err(|e| AlignError::internal(format!("failed to spawn source loader: {e}")))?;
        let target_handle = thread::Builder::new()
            .name("lexalign-load-target".to_string())
            .spawn_scoped(scope, || loader.load(target))
            .map_err(|e| AlignError::internal(format!("failed to spawn target loader: {e}")))?;

        let source_graph = source_handle
            .join()
            .map_err(|_| AlignError::internal("source loader panicked"))?;
        let target_graph = target_handle
            .join()
            .map_err(|_| AlignError::internal("target loader panicked"))?;
        Ok((source_graph?, target_graph?))
    })
}
