//! Persisted alignments.
//!
//! An alignment on disk is an equivalence-relation triple store: one
//! `<source> owl:equivalentClass <target>` triple per match. Turtle drops the
//! scores, so a reloaded Turtle alignment carries `1.0` for every pair. The
//! JSON form keeps them.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use rio_api::formatter::TriplesFormatter;
use rio_api::model::{NamedNode, Subject, Term, Triple};
use rio_api::parser::TriplesParser;
use rio_turtle::{TurtleError, TurtleFormatter, TurtleParser};
use tracing::{debug, info};

use crate::alignment::{Match, MatchSet};
use crate::error::{AlignResult, SerializationError};

/// `owl:equivalentClass`.
pub const OWL_EQUIVALENT_CLASS: &str = "http://www.w3.org/2002/07/owl#equivalentClass";

/// Writes and reads match sets.
pub trait AlignmentSerializer: Send + Sync {
    /// Writes every match of `matches`.
    ///
    /// # Errors
    /// `SerializationError` on I/O or encoding failure.
    fn write_alignment(
        &self,
        matches: &MatchSet,
        writer: &mut dyn Write,
    ) -> Result<(), SerializationError>;

    /// Reads a match set back.
    ///
    /// # Errors
    /// `SerializationError` on I/O or syntax failure.
    fn read_alignment(&self, reader: &mut dyn BufRead) -> Result<MatchSet, SerializationError>;
}

/// Turtle, `owl:equivalentClass` triples only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TurtleAlignment;

impl AlignmentSerializer for TurtleAlignment {
    fn write_alignment(
        &self,
        matches: &MatchSet,
        writer: &mut dyn Write,
    ) -> Result<(), SerializationError> {
        let mut formatter = TurtleFormatter::new(writer);
        for (source, target, _) in matches.iter() {
            formatter.format(&Triple {
                subject: Subject::NamedNode(NamedNode { iri: source }),
                predicate: NamedNode {
                    iri: OWL_EQUIVALENT_CLASS,
                },
                object: Term::NamedNode(NamedNode { iri: target }),
            })?;
        }
        formatter.finish()?.flush()?;
        Ok(())
    }

    fn read_alignment(&self, reader: &mut dyn BufRead) -> Result<MatchSet, SerializationError> {
        let mut matches = MatchSet::new();
        let mut ignored = 0u64;
        TurtleParser::new(reader, None)
            .parse_all(&mut |triple| {
                match triple {
                    Triple {
                        subject: Subject::NamedNode(source),
                        predicate: NamedNode {
                            iri: OWL_EQUIVALENT_CLASS,
                        },
                        object: Term::NamedNode(target),
                    } => matches.insert(Match::new(source.iri, target.iri, 1.0)),
                    _ => ignored += 1,
                }
                Ok::<(), TurtleError>(())
            })
            .map_err(|e| SerializationError::Rdf {
                message: e.to_string(),
            })?;
        if ignored > 0 {
            debug!(ignored, "ignored non-equivalence triples in alignment");
        }
        Ok(matches)
    }
}

/// JSON array of `{source, target, score}` objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonAlignment {
    /// Indent the output.
    pub pretty: bool,
}

impl AlignmentSerializer for JsonAlignment {
    fn write_alignment(
        &self,
        matches: &MatchSet,
        writer: &mut dyn Write,
    ) -> Result<(), SerializationError> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *writer, matches)?;
        } else {
            serde_json::to_writer(&mut *writer, matches)?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    fn read_alignment(&self, reader: &mut dyn BufRead) -> Result<MatchSet, SerializationError> {
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Supported alignment formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentFormat {
    #[default]
    Turtle,
    Json,
}

impl AlignmentFormat {
    /// Picks the format from a path's extension; anything but `.json` is Turtle.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Turtle,
        }
    }

    /// Serializer for this format.
    #[must_use]
    pub fn serializer(self) -> Box<dyn AlignmentSerializer> {
        match self {
            Self::Turtle => Box::new(TurtleAlignment),
            Self::Json => Box::new(JsonAlignment { pretty: true }),
        }
    }
}

impl FromStr for AlignmentFormat {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "turtle" | "ttl" => Ok(Self::Turtle),
            "json" => Ok(Self::Json),
            _ => Err(SerializationError::UnsupportedFormat {
                name: s.to_string(),
            }),
        }
    }
}

/// Writes an alignment file.
///
/// # Errors
/// `SerializationError` if the file cannot be created or written.
pub fn write_file(path: &Path, matches: &MatchSet, format: AlignmentFormat) -> AlignResult<()> {
    let file = File::create(path).map_err(SerializationError::from)?;
    let mut writer = BufWriter::new(file);
    format.serializer().write_alignment(matches, &mut writer)?;
    info!(path = %path.display(), ?format, matches = matches.len(), "wrote alignment");
    Ok(())
}

/// Reads an alignment file.
///
/// # Errors
/// `SerializationError` if the file cannot be opened or parsed.
pub fn read_file(path: &Path, format: AlignmentFormat) -> AlignResult<MatchSet> {
    let file = File::open(path).map_err(SerializationError::from)?;
    let mut reader = BufReader::new(file);
    let matches = format.serializer().read_alignment(&mut reader)?;
    info!(path = %path.display(), ?format, matches = matches.len(), "read alignment");
    Ok(matches)
}
