//! The on-disk codec for a single handle record.
//!
//! A record file carries three logical fields in a fixed order, with the
//! metadata payload allowed to continue over any number of lines:
//!
//! ```text
//! handle_id = <id>
//! last_seen = <location>
//! metadata = <first payload line>
//! <remaining payload lines, verbatim>
//! ```
//!
//! The decoder is positional: the three recognized keys are harvested as
//! they appear, and any unrecognized line is a continuation of the metadata
//! payload. A continuation line before `metadata = ` is malformed, as is a
//! record missing any field at end of input.
//!
//! The format cannot represent a metadata payload containing a line that
//! itself begins with one of the reserved prefixes, so [`HandleRecord::encode`]
//! refuses such payloads instead of writing bytes that would decode into a
//! different record. Serialized graph payloads never collide with the
//! prefixes in practice.

use thiserror::Error;

use crate::graph::{ns, Graph, NtParseError, Term, Triple};

const ID_PREFIX: &str = "handle_id = ";
const LOCATION_PREFIX: &str = "last_seen = ";
const METADATA_PREFIX: &str = "metadata = ";

const RESERVED_PREFIXES: [&str; 3] = [ID_PREFIX, LOCATION_PREFIX, METADATA_PREFIX];

/// The persisted tuple for one handle: an opaque identifier, the last known
/// location, and a serialized metadata graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleRecord {
    pub id: String,
    pub location: String,
    pub metadata: String,
}

/// A record file that does not decode, or a record that cannot be written
/// faithfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecordError {
    /// A payload continuation line appeared before the `metadata = ` key.
    #[error("continuation line before `metadata = `: {line:?}")]
    ContinuationBeforeMetadata { line: String },
    /// End of input was reached with a field still unset.
    #[error("record is missing the `{field}` field")]
    MissingField { field: &'static str },
    /// The metadata payload contains a line starting with a reserved key
    /// prefix and would not survive a round trip.
    #[error("metadata payload line collides with a reserved prefix: {line:?}")]
    ReservedPrefix { line: String },
    /// The id or location contains a line break the format cannot carry.
    #[error("the `{field}` field must not contain line breaks")]
    EmbeddedNewline { field: &'static str },
}

impl HandleRecord {
    pub fn new(
        id: impl Into<String>,
        location: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Self {
        HandleRecord {
            id: id.into(),
            location: location.into(),
            metadata: metadata.into(),
        }
    }

    /// Builds a record with the minimal metadata payload: a graph declaring
    /// `node_iri` as a handle. Useful as a starting point for handles that
    /// have no richer description yet.
    pub fn seed(id: impl Into<String>, location: impl Into<String>, node_iri: &str) -> Self {
        let mut graph = Graph::new();
        graph.insert(Triple::new(Term::iri(node_iri), ns::rdf_type(), ns::handle()));
        HandleRecord::new(id, location, graph.to_ntriples())
    }

    /// Parses the metadata payload as a graph.
    pub fn metadata_graph(&self) -> Result<Graph, NtParseError> {
        Graph::parse_ntriples(&self.metadata)
    }

    /// Serializes the record into its file form.
    pub fn encode(&self) -> Result<String, MalformedRecordError> {
        if self.id.contains('\n') {
            return Err(MalformedRecordError::EmbeddedNewline { field: "handle_id" });
        }
        if self.location.contains('\n') {
            return Err(MalformedRecordError::EmbeddedNewline { field: "last_seen" });
        }
        for line in self.metadata.lines() {
            if RESERVED_PREFIXES.iter().any(|p| line.starts_with(p)) {
                return Err(MalformedRecordError::ReservedPrefix {
                    line: line.to_owned(),
                });
            }
        }

        Ok(format!(
            "{ID_PREFIX}{}\n{LOCATION_PREFIX}{}\n{METADATA_PREFIX}{}\n",
            self.id, self.location, self.metadata
        ))
    }

    /// Decodes a record from its file form.
    pub fn decode(content: &str) -> Result<Self, MalformedRecordError> {
        let mut id: Option<String> = None;
        let mut location: Option<String> = None;
        let mut metadata: Option<String> = None;

        for line in content.lines() {
            if let Some(rest) = line.strip_prefix(ID_PREFIX) {
                id = Some(rest.to_owned());
            } else if let Some(rest) = line.strip_prefix(LOCATION_PREFIX) {
                location = Some(rest.to_owned());
            } else if let Some(rest) = line.strip_prefix(METADATA_PREFIX) {
                metadata = Some(rest.to_owned());
            } else {
                match metadata.as_mut() {
                    Some(payload) => {
                        payload.push('\n');
                        payload.push_str(line);
                    }
                    None => {
                        return Err(MalformedRecordError::ContinuationBeforeMetadata {
                            line: line.to_owned(),
                        })
                    }
                }
            }
        }

        let id = id.ok_or(MalformedRecordError::MissingField { field: "handle_id" })?;
        let location = location.ok_or(MalformedRecordError::MissingField { field: "last_seen" })?;
        let metadata = metadata.ok_or(MalformedRecordError::MissingField { field: "metadata" })?;

        Ok(HandleRecord {
            id,
            location,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_in_field_order() {
        let record = HandleRecord::new("abc123", "/data/alpha", "<urn:a> <urn:p> <urn:o> .");
        let encoded = record.encode().expect("encode");
        assert_eq!(
            encoded,
            "handle_id = abc123\nlast_seen = /data/alpha\nmetadata = <urn:a> <urn:p> <urn:o> .\n"
        );
    }

    #[test]
    fn multiline_metadata_round_trips() {
        let record = HandleRecord::new(
            "abc123",
            "/data/alpha",
            "<urn:a> <urn:p> <urn:o> .\n<urn:a> <urn:q> \"two\" .",
        );
        let decoded = HandleRecord::decode(&record.encode().expect("encode")).expect("decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn empty_metadata_round_trips() {
        let record = HandleRecord::new("abc123", "/data/alpha", "");
        let decoded = HandleRecord::decode(&record.encode().expect("encode")).expect("decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn continuation_before_metadata_is_malformed() {
        let err = HandleRecord::decode("handle_id = x\nstray line\n").unwrap_err();
        assert!(matches!(
            err,
            MalformedRecordError::ContinuationBeforeMetadata { .. }
        ));
    }

    #[test]
    fn missing_fields_are_reported() {
        let err = HandleRecord::decode("handle_id = x\nmetadata = y\n").unwrap_err();
        assert_eq!(
            err,
            MalformedRecordError::MissingField { field: "last_seen" }
        );

        let err = HandleRecord::decode("").unwrap_err();
        assert_eq!(
            err,
            MalformedRecordError::MissingField { field: "handle_id" }
        );
    }

    #[test]
    fn reserved_prefix_in_payload_is_refused() {
        let record = HandleRecord::new("abc", "/p", "fine line\nhandle_id = sneaky");
        assert!(matches!(
            record.encode().unwrap_err(),
            MalformedRecordError::ReservedPrefix { .. }
        ));
    }

    #[test]
    fn newline_in_id_is_refused() {
        let record = HandleRecord::new("a\nb", "/p", "");
        assert!(matches!(
            record.encode().unwrap_err(),
            MalformedRecordError::EmbeddedNewline { field: "handle_id" }
        ));
    }

    #[test]
    fn seed_declares_the_handle_node() {
        let record = HandleRecord::seed("abc123", "/data/alpha", "urn:cairn:alpha");
        let graph = record.metadata_graph().expect("parse");
        let rdf_type = ns::rdf_type();
        let handle = ns::handle();
        let subjects: Vec<_> = graph
            .subjects_with(&rdf_type, &handle)
            .collect();
        assert_eq!(subjects, vec![&crate::graph::Term::iri("urn:cairn:alpha")]);
    }

    proptest! {
        #[test]
        fn round_trip_over_encoder_domain(
            id in "[!-~]{1,16}",
            location in "[!-~]{0,24}",
            lines in proptest::collection::vec("[ -~]{0,32}", 0..6),
        ) {
            let record = HandleRecord::new(id, location, lines.join("\n"));
            // Payloads colliding with a reserved prefix are exactly the ones
            // the encoder refuses; everything else must round-trip.
            match record.encode() {
                Ok(encoded) => {
                    let decoded = HandleRecord::decode(&encoded).expect("decode");
                    prop_assert_eq!(decoded, record);
                }
                Err(MalformedRecordError::ReservedPrefix { .. }) => {}
                Err(other) => return Err(TestCaseError::fail(format!("unexpected: {other}"))),
            }
        }
    }
}
