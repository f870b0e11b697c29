//! A small triple store for catalog metadata.
//!
//! Handle metadata is exchanged as flat N-Triples payloads, so the graph
//! layer stays deliberately modest: a [`Term`] is an IRI, a blank node or a
//! literal, a [`Triple`] is one statement, and a [`Graph`] is an ordered set
//! of statements. Graphs compose with `+=`, which makes joining a
//! collection's handle graphs (and later every branch's joined graph) a
//! plain set union: duplicate statements collapse, and insertion order
//! never matters.
//!
//! Querying is structural: [`Graph::triples_matching`] walks statements
//! against a [`TriplePattern`], and [`Graph::subjects_with`] answers the
//! common "which node carries this predicate/object pair" lookup used to
//! locate a handle node by its declared type.
//!
//! Parsing and serialization of the N-Triples line format live in
//! [`ntriples`].

pub mod ntriples;

use std::collections::BTreeSet;
use std::fmt;
use std::ops::AddAssign;

pub use ntriples::NtParseError;

/// Vocabulary used by the catalog's own statements.
pub mod ns {
    use super::Term;

    /// The `rdf:type` predicate.
    pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    /// Namespace of the catalog terms.
    pub const TERMS: &str = "https://w3id.org/cairn/terms/";

    pub fn rdf_type() -> Term {
        Term::iri(RDF_TYPE)
    }

    /// Type of a collection node.
    pub fn collection() -> Term {
        Term::iri(format!("{TERMS}Collection"))
    }

    /// Type of a handle node.
    pub fn handle() -> Term {
        Term::iri(format!("{TERMS}Handle"))
    }

    /// Edge from a collection node to a handle node it contains.
    pub fn contains() -> Term {
        Term::iri(format!("{TERMS}contains"))
    }
}

/// A single RDF term.
///
/// Literals carry their lexical form plus at most one of a language tag or a
/// datatype IRI; the parser upholds that exclusivity. The derived `Ord`
/// gives graphs a stable statement order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal {
        lexical: String,
        lang: Option<String>,
        datatype: Option<String>,
    },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank(label.into())
    }

    pub fn literal(lexical: impl Into<String>) -> Self {
        Term::Literal {
            lexical: lexical.into(),
            lang: None,
            datatype: None,
        }
    }

    pub fn lang_literal(lexical: impl Into<String>, lang: impl Into<String>) -> Self {
        Term::Literal {
            lexical: lexical.into(),
            lang: Some(lang.into()),
            datatype: None,
        }
    }

    pub fn typed_literal(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            lexical: lexical.into(),
            lang: None,
            datatype: Some(datatype.into()),
        }
    }

    /// Returns the IRI if this term is one.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ntriples::format_term(self))
    }
}

/// One statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Triple {
            subject,
            predicate,
            object,
        }
    }
}

/// Matches a single term position of a [`TriplePattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermPattern {
    /// Matches any term.
    Any,
    /// Matches exactly this term.
    Is(Term),
}

impl TermPattern {
    pub fn matches(&self, term: &Term) -> bool {
        match self {
            TermPattern::Any => true,
            TermPattern::Is(want) => want == term,
        }
    }
}

impl From<Term> for TermPattern {
    fn from(term: Term) -> Self {
        TermPattern::Is(term)
    }
}

/// A structural pattern over statements, one [`TermPattern`] per position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: TermPattern,
    pub predicate: TermPattern,
    pub object: TermPattern,
}

impl TriplePattern {
    pub fn new(
        subject: impl Into<TermPattern>,
        predicate: impl Into<TermPattern>,
        object: impl Into<TermPattern>,
    ) -> Self {
        TriplePattern {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// The pattern matching every statement.
    pub fn any() -> Self {
        TriplePattern {
            subject: TermPattern::Any,
            predicate: TermPattern::Any,
            object: TermPattern::Any,
        }
    }

    pub fn matches(&self, triple: &Triple) -> bool {
        self.subject.matches(&triple.subject)
            && self.predicate.matches(&triple.predicate)
            && self.object.matches(&triple.object)
    }
}

/// An ordered set of statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    triples: BTreeSet<Triple>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    /// Inserts a statement, returning whether it was new.
    pub fn insert(&mut self, triple: Triple) -> bool {
        self.triples.insert(triple)
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Statements matching `pattern`, in graph order.
    pub fn triples_matching<'a>(
        &'a self,
        pattern: &'a TriplePattern,
    ) -> impl Iterator<Item = &'a Triple> + 'a {
        self.triples.iter().filter(move |t| pattern.matches(t))
    }

    /// Subjects carrying the given predicate/object pair.
    ///
    /// This is the type lookup used to find the node a metadata graph
    /// declares as its handle.
    pub fn subjects_with<'a>(
        &'a self,
        predicate: &'a Term,
        object: &'a Term,
    ) -> impl Iterator<Item = &'a Term> + 'a {
        self.triples
            .iter()
            .filter(move |t| &t.predicate == predicate && &t.object == object)
            .map(|t| &t.subject)
    }

    /// Parses an N-Triples payload into a graph.
    pub fn parse_ntriples(input: &str) -> Result<Self, NtParseError> {
        ntriples::parse(input)
    }

    /// Serializes the graph as N-Triples, one statement per line in graph
    /// order.
    pub fn to_ntriples(&self) -> String {
        ntriples::serialize(self)
    }
}

impl AddAssign<Graph> for Graph {
    fn add_assign(&mut self, rhs: Graph) {
        self.triples.extend(rhs.triples);
    }
}

impl AddAssign<&Graph> for Graph {
    fn add_assign(&mut self, rhs: &Graph) {
        self.triples.extend(rhs.triples.iter().cloned());
    }
}

impl Extend<Triple> for Graph {
    fn extend<I: IntoIterator<Item = Triple>>(&mut self, iter: I) {
        self.triples.extend(iter);
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        Graph {
            triples: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Graph {
    type Item = Triple;
    type IntoIter = std::collections::btree_set::IntoIter<Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.into_iter()
    }
}

impl<'a> IntoIterator for &'a Graph {
    type Item = &'a Triple;
    type IntoIter = std::collections::btree_set::Iter<'a, Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(Term::iri(s), Term::iri(p), Term::iri(o))
    }

    #[test]
    fn union_is_idempotent() {
        let mut a = Graph::new();
        a.insert(statement("urn:s", "urn:p", "urn:o"));
        let mut b = Graph::new();
        b.insert(statement("urn:s", "urn:p", "urn:o"));
        b.insert(statement("urn:s2", "urn:p", "urn:o"));

        a += &b;
        a += b;
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn subjects_with_finds_typed_node() {
        let mut g = Graph::new();
        g.insert(Triple::new(
            Term::iri("urn:h"),
            ns::rdf_type(),
            ns::handle(),
        ));
        g.insert(Triple::new(
            Term::iri("urn:h"),
            Term::iri("urn:p"),
            Term::literal("x"),
        ));

        let rdf_type = ns::rdf_type();
        let handle = ns::handle();
        let subjects: Vec<_> = g.subjects_with(&rdf_type, &handle).collect();
        assert_eq!(subjects, vec![&Term::iri("urn:h")]);
    }

    #[test]
    fn pattern_matching_filters_positions() {
        let mut g = Graph::new();
        g.insert(statement("urn:a", "urn:p", "urn:x"));
        g.insert(statement("urn:b", "urn:p", "urn:y"));
        g.insert(statement("urn:b", "urn:q", "urn:y"));

        let pattern = TriplePattern::new(TermPattern::Any, Term::iri("urn:p"), TermPattern::Any);
        assert_eq!(g.triples_matching(&pattern).count(), 2);

        let pattern = TriplePattern::new(Term::iri("urn:b"), TermPattern::Any, Term::iri("urn:y"));
        assert_eq!(g.triples_matching(&pattern).count(), 2);

        assert_eq!(g.triples_matching(&TriplePattern::any()).count(), 3);
    }
}
