//! Common types for DIMSE operations

use dicom_object::InMemDicomObject;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// DICOM query/retrieve levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryLevel {
    /// Patient level
    Patient,
    /// Study level
    Study,
    /// Series level
    Series,
    /// Image level
    Image,
}

/// Query/Retrieve information models for C-FIND
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryModel {
    /// Patient Root Query/Retrieve Information Model - FIND
    PatientRootFind,
    /// Study Root Query/Retrieve Information Model - FIND
    StudyRootFind,
}

/// Transfer syntaxes offered for query contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferSyntax {
    /// Explicit VR Little Endian
    ExplicitVrLittleEndian,
    /// Explicit VR Big Endian (retired, still offered for old archives)
    ExplicitVrBigEndian,
    /// Implicit VR Little Endian
    ImplicitVrLittleEndian,
}

/// Presentation context identifier.
///
/// Negotiated contexts carry odd ids in 1..=255. Id 0 never appears on the
/// wire and stands for "not found": a client receiving it picks any accepted
/// context for the query model on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PresentationContextId(pub u8);

/// How an association ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseKind {
    /// Orderly A-RELEASE
    Release,
    /// A-ABORT, used when a run is torn down unexpectedly
    Abort,
}

/// Outcome of a single C-FIND exchange.
///
/// Matches received before a failure are kept; `status` tells whether the
/// exchange completed normally.
#[derive(Debug)]
pub struct FindResponses {
    /// Identifiers of the pending responses, in arrival order
    pub matches: Vec<InMemDicomObject>,
    /// Final status of the exchange
    pub status: Result<()>,
}

impl QueryLevel {
    /// Value written into QueryRetrieveLevel (0008,0052)
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryLevel::Patient => "PATIENT",
            QueryLevel::Study => "STUDY",
            QueryLevel::Series => "SERIES",
            QueryLevel::Image => "IMAGE",
        }
    }
}

impl QueryModel {
    /// SOP Class UID of the information model
    pub fn uid(&self) -> &'static str {
        match self {
            QueryModel::PatientRootFind => "1.2.840.10008.5.1.4.1.2.1.1",
            QueryModel::StudyRootFind => "1.2.840.10008.5.1.4.1.2.2.1",
        }
    }
}

impl TransferSyntax {
    /// Transfer syntax UID
    pub fn uid(&self) -> &'static str {
        match self {
            TransferSyntax::ExplicitVrLittleEndian => "1.2.840.10008.1.2.1",
            TransferSyntax::ExplicitVrBigEndian => "1.2.840.10008.1.2.2",
            TransferSyntax::ImplicitVrLittleEndian => "1.2.840.10008.1.2",
        }
    }

    /// The preference order used when probing negotiated contexts
    pub fn preference_order() -> [TransferSyntax; 3] {
        [
            TransferSyntax::ExplicitVrLittleEndian,
            TransferSyntax::ExplicitVrBigEndian,
            TransferSyntax::ImplicitVrLittleEndian,
        ]
    }
}

impl PresentationContextId {
    /// Placeholder used when no acceptable context was found
    pub const NOT_FOUND: PresentationContextId = PresentationContextId(0);

    /// Whether this id refers to a negotiated context
    pub fn is_found(&self) -> bool {
        self.0 != 0
    }
}

impl FindResponses {
    /// A completed exchange
    pub fn success(matches: Vec<InMemDicomObject>) -> Self {
        Self {
            matches,
            status: Ok(()),
        }
    }

    /// A failed exchange with whatever matches arrived before the failure
    pub fn failure(matches: Vec<InMemDicomObject>, error: crate::DimseError) -> Self {
        Self {
            matches,
            status: Err(error),
        }
    }
}

impl std::fmt::Display for QueryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for PresentationContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for QueryLevel {
    type Err = crate::error::DimseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PATIENT" => Ok(QueryLevel::Patient),
            "STUDY" => Ok(QueryLevel::Study),
            "SERIES" => Ok(QueryLevel::Series),
            "IMAGE" => Ok(QueryLevel::Image),
            _ => Err(crate::error::DimseError::config(format!(
                "Invalid query level: {}",
                s
            ))),
        }
    }
}
