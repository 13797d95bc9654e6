//! Study → series query cascade against a remote archive

use std::ops::{Deref, DerefMut};

use dicom_object::InMemDicomObject;
use dimse::{
    AssociationClient, PresentationContextId, QueryLevel, QueryModel, ReleaseKind,
    TransferSyntax,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::config::QueryConfig;
use crate::query::dataset::{link_identifier, QueryDataset};
use crate::query::filters::{self, FilterSet};
use crate::query::progress::{series_progress, ProgressReporter};
use crate::storage::ResultIngestor;

/// Query client for one remote archive.
///
/// A run queries studies matching the filters, then the series of every
/// study found, handing each match to a [`ResultIngestor`]. Failures never
/// surface as errors: they are logged and reported as progress text, and
/// every run ends with progress 100.
pub struct DicomQuery<A: AssociationClient> {
    calling_ae_title: String,
    called_ae_title: String,
    host: String,
    port: u16,
    filters: FilterSet,
    association: A,
    cancel: CancellationToken,
    study_instance_uids: Vec<String>,
}

impl<A: AssociationClient> DicomQuery<A> {
    pub fn new(association: A) -> Self {
        Self {
            calling_ae_title: String::new(),
            called_ae_title: String::new(),
            host: String::new(),
            port: dimse::DEFAULT_DIMSE_PORT,
            filters: FilterSet::new(),
            association,
            cancel: CancellationToken::new(),
            study_instance_uids: Vec::new(),
        }
    }

    pub fn from_config(config: &QueryConfig, association: A) -> Self {
        let mut query = Self::new(association);
        query.set_calling_ae_title(&config.calling_ae_title);
        query.set_called_ae_title(&config.called_ae_title);
        query.set_host(&config.host);
        query.set_port(config.port);
        query.set_filters(config.filters.clone());
        query
    }

    pub fn set_calling_ae_title(&mut self, title: impl Into<String>) {
        self.calling_ae_title = title.into();
    }

    pub fn calling_ae_title(&self) -> &str {
        &self.calling_ae_title
    }

    pub fn set_called_ae_title(&mut self, title: impl Into<String>) {
        self.called_ae_title = title.into();
    }

    pub fn called_ae_title(&self) -> &str {
        &self.called_ae_title
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_filters(&mut self, filters: FilterSet) {
        self.filters = filters;
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn association(&self) -> &A {
        &self.association
    }

    /// Study instance UIDs found by the most recent run, in arrival order
    pub fn study_instance_uids_queried(&self) -> &[String] {
        &self.study_instance_uids
    }

    /// Token for the next run. Cancelling it stops that run's series stage
    /// before its next query. Every run consumes its token, so a cancelled
    /// run does not affect later ones.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the cascade once.
    pub async fn run_query(
        &mut self,
        ingestor: &dyn ResultIngestor,
        reporter: &dyn ProgressReporter,
    ) {
        let span = info_span!(
            "dicom_query",
            peer = %self.called_ae_title,
            host = %self.host,
            port = self.port
        );
        let cancel = std::mem::replace(&mut self.cancel, CancellationToken::new());
        self.run(ingestor, reporter, cancel).instrument(span).await
    }

    async fn run(
        &mut self,
        ingestor: &dyn ResultIngestor,
        reporter: &dyn ProgressReporter,
        cancel: CancellationToken,
    ) {
        if ingestor.is_open() {
            debug!("Result store open");
            reporter.message("Result store open");
        } else {
            warn!("Result store not open");
            reporter.message("Result store not open");
        }
        reporter.progress(0);

        self.study_instance_uids.clear();
        let mut dataset = QueryDataset::new();
        dataset.set_level(QueryLevel::Study);
        dataset.apply_filter_values(&filters::translate(&self.filters));

        self.association.set_local_title(&self.calling_ae_title);
        self.association.set_peer_title(&self.called_ae_title);
        self.association.set_peer_host(&self.host);
        self.association.set_peer_port(self.port);

        debug!("Setting transfer syntaxes");
        reporter.message("Setting transfer syntaxes");
        reporter.progress(10);
        self.association.add_query_context(
            QueryModel::StudyRootFind,
            &TransferSyntax::preference_order(),
        );

        if let Err(e) = self.association.initialize_network().await {
            error!("Error initializing the network: {}", e);
            reporter.message(&format!("Error initializing the network: {}", e));
            reporter.progress(100);
            return;
        }

        let mut session = OpenAssociation::new(&mut self.association);

        debug!("Negotiating association");
        reporter.message("Negotiating association");
        reporter.progress(20);
        if let Err(e) = session.negotiate_association().await {
            warn!("Association negotiation failed: {}", e);
            reporter.message(&format!("Association negotiation failed: {}", e));
        }

        reporter.progress(30);
        let context = find_study_context(&*session);
        match context {
            Some(id) => {
                info!("Found useful presentation context {}", id);
                reporter.message("Found useful presentation context");
            }
            None => {
                error!("Failed to find acceptable presentation context");
                reporter.message("Failed to find acceptable presentation context");
            }
        }
        reporter.progress(40);

        let responses = session
            .send_query(
                context.unwrap_or(PresentationContextId::NOT_FOUND),
                &dataset.snapshot(),
            )
            .await;
        match &responses.status {
            Ok(()) => {
                debug!("Study find succeeded with {} matches", responses.matches.len());
                reporter.message("Find succeeded");
            }
            Err(e) => {
                error!("Study find failed: {}", e);
                reporter.message(&format!("Find failed: {}", e));
            }
        }
        reporter.progress(50);

        let mut study_uids = Vec::new();
        for record in responses.matches {
            match link_identifier(&record) {
                Ok(uid) => study_uids.push(uid),
                Err(e) => warn!("Study match not queried for series: {}", e),
            }
            ingest(ingestor, record).await;
        }

        dataset.set_level(QueryLevel::Series);
        let total = study_uids.len();
        for (i, uid) in study_uids.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Query cancelled after {} of {} studies", i, total);
                reporter.message("Query cancelled");
                break;
            }

            debug!("Starting series C-FIND for study {}", uid);
            reporter.message(&format!("Starting series C-FIND for study {}", uid));
            if let Some(percent) = series_progress(i, total) {
                reporter.progress(percent);
            }

            dataset.set_link_value(uid);
            let responses = session
                .send_query(PresentationContextId::NOT_FOUND, &dataset.snapshot())
                .await;
            match responses.status {
                Ok(()) => {
                    for record in responses.matches {
                        ingest(ingestor, record).await;
                    }
                    debug!("Find succeeded for study {}", uid);
                    reporter.message(&format!("Find succeeded for study {}", uid));
                }
                Err(e) => {
                    error!("Find failed for study {}: {}", uid, e);
                    reporter.message(&format!("Find failed for study {}", uid));
                }
            }

            if let Some(percent) = series_progress(i, total) {
                reporter.progress(percent);
            }
        }

        session.release();
        info!("Query finished, {} studies found", total);
        self.study_instance_uids = study_uids;
        reporter.progress(100);
    }
}

/// Probe accepted contexts in transfer-syntax preference order
fn find_study_context<A: AssociationClient>(client: &A) -> Option<PresentationContextId> {
    TransferSyntax::preference_order()
        .into_iter()
        .find_map(|ts| client.find_context_id(QueryModel::StudyRootFind, ts))
}

async fn ingest(ingestor: &dyn ResultIngestor, record: InMemDicomObject) {
    if let Err(e) = ingestor.insert(record).await {
        warn!("Failed to store match: {}", e);
    }
}

/// An initialized association that is closed exactly once: released
/// explicitly, or aborted when dropped on any other path.
struct OpenAssociation<'a, A: AssociationClient> {
    client: &'a mut A,
    open: bool,
}

impl<'a, A: AssociationClient> OpenAssociation<'a, A> {
    fn new(client: &'a mut A) -> Self {
        Self { client, open: true }
    }

    fn release(mut self) {
        self.open = false;
        self.client.close(ReleaseKind::Release);
    }
}

impl<A: AssociationClient> Deref for OpenAssociation<'_, A> {
    type Target = A;

    fn deref(&self) -> &A {
        self.client
    }
}

impl<A: AssociationClient> DerefMut for OpenAssociation<'_, A> {
    fn deref_mut(&mut self) -> &mut A {
        self.client
    }
}

impl<A: AssociationClient> Drop for OpenAssociation<'_, A> {
    fn drop(&mut self) {
        if self.open {
            warn!("Query run interrupted, aborting association");
            self.client.close(ReleaseKind::Abort);
        }
    }
}
