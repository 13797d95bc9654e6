//! The association surface consumed by query orchestration

use async_trait::async_trait;
use dicom_object::InMemDicomObject;

use crate::types::{FindResponses, PresentationContextId, QueryModel, ReleaseKind, TransferSyntax};
use crate::Result;

/// A client-side DICOM association.
///
/// Callers configure the peer, register the query contexts to offer, then
/// drive `initialize_network` → `negotiate_association` → `send_query`* →
/// `close`. Every call is awaited before the next one is issued; an
/// implementation never sees overlapping requests.
///
/// `close` must be called exactly once for every association whose network
/// initialization succeeded. It is synchronous so it can run from `Drop`.
#[async_trait]
pub trait AssociationClient: Send {
    /// Set the calling (local) AE title
    fn set_local_title(&mut self, title: &str);

    /// Set the called (peer) AE title
    fn set_peer_title(&mut self, title: &str);

    /// Set the peer host name or address
    fn set_peer_host(&mut self, host: &str);

    /// Set the peer port
    fn set_peer_port(&mut self, port: u16);

    /// Register a query model with the transfer syntaxes to offer for it, in
    /// order of preference
    fn add_query_context(&mut self, model: QueryModel, transfer_syntaxes: &[TransferSyntax]);

    /// Prepare the network layer. Fails with `DimseError::NetworkInit`.
    async fn initialize_network(&mut self) -> Result<()>;

    /// Negotiate the association with the peer
    async fn negotiate_association(&mut self) -> Result<()>;

    /// Look up an accepted presentation context for a model and transfer syntax
    fn find_context_id(
        &self,
        model: QueryModel,
        transfer_syntax: TransferSyntax,
    ) -> Option<PresentationContextId>;

    /// Send a C-FIND identifier and collect every pending response.
    ///
    /// `PresentationContextId::NOT_FOUND` lets the client pick any accepted
    /// context; if there is none the exchange fails without touching the
    /// network.
    async fn send_query(
        &mut self,
        context: PresentationContextId,
        dataset: &InMemDicomObject,
    ) -> FindResponses;

    /// Release or abort the association
    fn close(&mut self, kind: ReleaseKind);
}
