//! Multiplicity checks between an import and its candidate exports

use std::fmt;

use crate::contract::ContractName;
use crate::error::CompositionError;

/// Number of exports an import accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportCardinality {
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMore,
}

impl ImportCardinality {
    pub fn is_at_most_one(self) -> bool {
        matches!(self, ImportCardinality::ExactlyOne | ImportCardinality::ZeroOrOne)
    }
}

impl fmt::Display for ImportCardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportCardinality::ExactlyOne => f.write_str("exactly one export"),
            ImportCardinality::ZeroOrOne => f.write_str("zero or one export"),
            ImportCardinality::ZeroOrMore => f.write_str("any number of exports"),
        }
    }
}

/// Observed number of candidates, bucketed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedCount {
    Zero,
    One,
    Many,
}

impl ObservedCount {
    /// Classify a candidate sequence, reading at most two items
    pub fn of<I: IntoIterator>(candidates: I) -> Self {
        let mut iter = candidates.into_iter();
        match (iter.next(), iter.next()) {
            (None, _) => ObservedCount::Zero,
            (Some(_), None) => ObservedCount::One,
            (Some(_), Some(_)) => ObservedCount::Many,
        }
    }
}

impl From<usize> for ObservedCount {
    fn from(count: usize) -> Self {
        match count {
            0 => ObservedCount::Zero,
            1 => ObservedCount::One,
            _ => ObservedCount::Many,
        }
    }
}

/// Outcome of a cardinality check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardinalityVerdict {
    Match,
    NoExports,
    TooManyExports,
}

impl CardinalityVerdict {
    pub fn is_match(self) -> bool {
        self == CardinalityVerdict::Match
    }

    /// Describe a mismatch as an error record, for callers that collect errors
    pub fn into_error(self, contract: &ContractName, cardinality: ImportCardinality) -> Option<CompositionError> {
        match self {
            CardinalityVerdict::Match => None,
            verdict => Some(CompositionError::cardinality(contract, cardinality, verdict)),
        }
    }
}

impl fmt::Display for CardinalityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardinalityVerdict::Match => f.write_str("a matching number of exports"),
            CardinalityVerdict::NoExports => f.write_str("no exports"),
            CardinalityVerdict::TooManyExports => f.write_str("too many exports"),
        }
    }
}

/// Compare the observed candidates with the cardinality of an import
pub fn check_cardinality(cardinality: ImportCardinality, observed: ObservedCount) -> CardinalityVerdict {
    match (observed, cardinality) {
        (ObservedCount::Zero, ImportCardinality::ExactlyOne) => CardinalityVerdict::NoExports,
        (ObservedCount::Zero, _) | (ObservedCount::One, _) => CardinalityVerdict::Match,
        (ObservedCount::Many, c) if c.is_at_most_one() => CardinalityVerdict::TooManyExports,
        (ObservedCount::Many, _) => CardinalityVerdict::Match,
    }
}
