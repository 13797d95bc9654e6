//! DIMSE (DICOM Message Service Element) client support
//!
//! This crate provides the Service Class User (SCU) side of DICOM Query/Retrieve
//! used by the query cascade.
//!
//! # Features
//! - `AssociationClient` trait: the association surface a query run drives
//! - `DcmtkAssociation`: C-ECHO and C-FIND through DCMTK (feature = "dcmtk_cli")

pub mod association;
pub mod config;
pub mod error;
pub mod scu;
pub mod types;

// Re-export commonly used types
pub use association::AssociationClient;
pub use config::{RemoteNode, ScuConfig};
pub use error::{DimseError, Result};
pub use scu::{AssociationState, DcmtkAssociation, ScuBuilder};
pub use types::{
    FindResponses, PresentationContextId, QueryLevel, QueryModel, ReleaseKind, TransferSyntax,
};

/// Default DICOM port (non-TLS)
pub const DEFAULT_DIMSE_PORT: u16 = 11112;
