//! Service Class User (SCU) implementation for outbound DIMSE operations
//!
//! The association is driven through the DCMTK command line tools: every
//! C-FIND runs one `findscu` exchange, negotiation is probed with `echoscu`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use dicom_core::header::Header;
use dicom_object::InMemDicomObject;
use tracing::{debug, error, info, warn};

use crate::association::AssociationClient;
use crate::config::{validate_ae_title, RemoteNode, ScuConfig};
use crate::types::{FindResponses, PresentationContextId, QueryModel, ReleaseKind, TransferSyntax};
use crate::{DimseError, Result};

/// Lifecycle of a [`DcmtkAssociation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationState {
    /// Nothing initialized yet
    Idle,
    /// Configuration and tools checked
    NetworkReady,
    /// Peer answered the negotiation probe
    Established,
    /// Released or aborted
    Closed,
}

#[derive(Debug, Clone)]
struct ProposedContext {
    id: PresentationContextId,
    model: QueryModel,
    transfer_syntax: TransferSyntax,
}

/// Association client backed by DCMTK `findscu`/`echoscu`
pub struct DcmtkAssociation {
    config: ScuConfig,
    local_aet: String,
    node: RemoteNode,
    contexts: Vec<ProposedContext>,
    state: AssociationState,
}

impl DcmtkAssociation {
    /// Create a new SCU with the given configuration
    pub fn new(config: ScuConfig) -> Self {
        Self {
            config,
            local_aet: String::new(),
            node: RemoteNode::default(),
            contexts: Vec::new(),
            state: AssociationState::Idle,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> AssociationState {
        self.state
    }

    fn connect_timeout(&self) -> Duration {
        self.node
            .connect_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.connect_timeout())
    }

    fn max_pdu(&self) -> u32 {
        self.node.max_pdu.unwrap_or(self.config.max_pdu)
    }

    fn context_for(&self, id: PresentationContextId) -> Option<&ProposedContext> {
        if id.is_found() {
            self.contexts.iter().find(|c| c.id == id)
        } else {
            self.contexts.first()
        }
    }

    /// Send a C-ECHO to the configured peer
    pub async fn echo(&self) -> Result<()> {
        info!(
            "Sending C-ECHO to {}@{}:{}",
            self.node.ae_title, self.node.host, self.node.port
        );

        #[cfg(feature = "dcmtk_cli")]
        {
            use tokio::process::Command;

            let timeout = self.connect_timeout();
            let mut cmd = Command::new(&self.config.echoscu_path);
            cmd.arg("-aet")
                .arg(&self.local_aet)
                .arg("-aec")
                .arg(&self.node.ae_title)
                .arg("-to")
                .arg(timeout.as_secs().max(1).to_string())
                .arg(&self.node.host)
                .arg(self.node.port.to_string())
                .kill_on_drop(true);
            debug!(
                "Running: echoscu -aet {} -aec {} {} {}",
                self.local_aet, self.node.ae_title, self.node.host, self.node.port
            );

            let output = tokio::time::timeout(timeout + Duration::from_secs(1), cmd.output())
                .await
                .map_err(|_| DimseError::Timeout("C-ECHO".into()))?
                .map_err(|e| {
                    DimseError::operation_failed(format!("Failed to spawn echoscu: {}", e))
                })?;

            if output.status.success() {
                info!("C-ECHO completed successfully");
                Ok(())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                error!(
                    "C-ECHO failed: status={:?}, stderr={}",
                    output.status.code(),
                    stderr
                );
                Err(DimseError::AssociationRejected(format!(
                    "echoscu failed: {:?} {}",
                    output.status.code(),
                    stderr.trim()
                )))
            }
        }

        #[cfg(not(feature = "dcmtk_cli"))]
        {
            Err(DimseError::NotSupported(
                "C-ECHO requires feature 'dcmtk_cli'".into(),
            ))
        }
    }

    /// Check that the DCMTK tools can be spawned
    async fn probe_tools(&self) -> Result<()> {
        #[cfg(feature = "dcmtk_cli")]
        {
            tokio::process::Command::new(&self.config.findscu_path)
                .arg("--version")
                .output()
                .await
                .map(|_| ())
                .map_err(|e| {
                    DimseError::network_init(format!(
                        "cannot run {}: {}",
                        self.config.findscu_path.display(),
                        e
                    ))
                })
        }

        #[cfg(not(feature = "dcmtk_cli"))]
        {
            Err(DimseError::NotSupported(
                "C-FIND requires feature 'dcmtk_cli'".into(),
            ))
        }
    }

    #[cfg(feature = "dcmtk_cli")]
    async fn run_find(
        &self,
        proposed: &ProposedContext,
        dataset: &InMemDicomObject,
    ) -> FindResponses {
        use tokio::process::Command;

        let keys = match query_keys(dataset) {
            Ok(keys) => keys,
            Err(e) => return FindResponses::failure(Vec::new(), e),
        };

        let out_dir = match tempfile::Builder::new()
            .prefix("findscu-")
            .tempdir_in(&self.config.work_dir)
        {
            Ok(dir) => dir,
            Err(e) => return FindResponses::failure(Vec::new(), DimseError::Network(e)),
        };

        let mut args: Vec<String> = vec![
            "-aet".into(),
            self.local_aet.clone(),
            "-aec".into(),
            self.node.ae_title.clone(),
            model_flag(proposed.model).into(),
            transfer_syntax_flag(proposed.transfer_syntax).into(),
            "-to".into(),
            self.connect_timeout().as_secs().max(1).to_string(),
            "-td".into(),
            self.config.dimse_timeout().as_secs().max(1).to_string(),
            "-pdu".into(),
            self.max_pdu().to_string(),
        ];
        for key in keys {
            args.push("-k".into());
            args.push(key);
        }
        args.push("-X".into());
        args.push("-od".into());
        args.push(out_dir.path().to_string_lossy().to_string());
        args.push(self.node.host.clone());
        args.push(self.node.port.to_string());

        debug!(
            "Running findscu (context {}) args: {:?}",
            proposed.id, args
        );

        let budget = self.connect_timeout() + self.config.dimse_timeout();
        let status = match tokio::time::timeout(
            budget,
            Command::new(&self.config.findscu_path)
                .args(&args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        {
            Ok(Ok(out)) if out.status.success() => Ok(()),
            Ok(Ok(out)) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                warn!(
                    "findscu failed: status={:?}, stderr={}",
                    out.status.code(),
                    stderr
                );
                Err(DimseError::operation_failed(format!(
                    "findscu failed: {:?} {}",
                    out.status.code(),
                    stderr.trim()
                )))
            }
            Ok(Err(e)) => Err(DimseError::operation_failed(format!(
                "Failed to spawn findscu: {}",
                e
            ))),
            Err(_) => Err(DimseError::Timeout("C-FIND".into())),
        };

        let matches = read_responses(out_dir.path()).await;
        match status {
            Ok(()) => {
                info!("C-FIND completed with {} matches", matches.len());
                FindResponses::success(matches)
            }
            Err(e) => FindResponses::failure(matches, e),
        }
    }
}

#[async_trait]
impl AssociationClient for DcmtkAssociation {
    fn set_local_title(&mut self, title: &str) {
        self.local_aet = title.to_string();
    }

    fn set_peer_title(&mut self, title: &str) {
        self.node.ae_title = title.to_string();
    }

    fn set_peer_host(&mut self, host: &str) {
        self.node.host = host.to_string();
    }

    fn set_peer_port(&mut self, port: u16) {
        self.node.port = port;
    }

    fn add_query_context(&mut self, model: QueryModel, transfer_syntaxes: &[TransferSyntax]) {
        // Registering a model again replaces its previous proposal
        self.contexts.retain(|c| c.model != model);
        for ts in transfer_syntaxes {
            if self.contexts.len() >= 128 {
                warn!("Presentation context limit reached, ignoring {:?}", ts);
                break;
            }
            self.contexts.push(ProposedContext {
                id: PresentationContextId::NOT_FOUND,
                model,
                transfer_syntax: *ts,
            });
        }
        // Ids follow proposal order
        for (i, c) in self.contexts.iter_mut().enumerate() {
            c.id = PresentationContextId((i * 2 + 1) as u8);
        }
    }

    async fn initialize_network(&mut self) -> Result<()> {
        self.state = AssociationState::Idle;

        validate_ae_title(&self.local_aet).map_err(|e| DimseError::network_init(e.to_string()))?;
        self.node
            .validate()
            .map_err(|e| DimseError::network_init(e.to_string()))?;
        self.config
            .validate()
            .map_err(|e| DimseError::network_init(e.to_string()))?;
        if self.contexts.is_empty() {
            return Err(DimseError::network_init(
                "no presentation contexts registered",
            ));
        }

        self.probe_tools().await?;

        self.state = AssociationState::NetworkReady;
        debug!(
            "Network ready for {} -> {}@{}:{}",
            self.local_aet, self.node.ae_title, self.node.host, self.node.port
        );
        Ok(())
    }

    async fn negotiate_association(&mut self) -> Result<()> {
        if self.state != AssociationState::NetworkReady {
            return Err(DimseError::operation_failed(
                "negotiation requested before network initialization",
            ));
        }
        self.echo().await?;
        self.state = AssociationState::Established;
        Ok(())
    }

    fn find_context_id(
        &self,
        model: QueryModel,
        transfer_syntax: TransferSyntax,
    ) -> Option<PresentationContextId> {
        if self.state != AssociationState::Established {
            return None;
        }
        self.contexts
            .iter()
            .find(|c| c.model == model && c.transfer_syntax == transfer_syntax)
            .map(|c| c.id)
    }

    async fn send_query(
        &mut self,
        context: PresentationContextId,
        dataset: &InMemDicomObject,
    ) -> FindResponses {
        if self.state != AssociationState::Established {
            return FindResponses::failure(
                Vec::new(),
                DimseError::NoUsableContext("association is not established".into()),
            );
        }
        let Some(proposed) = self.context_for(context).cloned() else {
            return FindResponses::failure(
                Vec::new(),
                DimseError::NoUsableContext(format!("unknown presentation context {}", context)),
            );
        };

        #[cfg(feature = "dcmtk_cli")]
        {
            self.run_find(&proposed, dataset).await
        }

        #[cfg(not(feature = "dcmtk_cli"))]
        {
            let _ = (proposed, dataset);
            FindResponses::failure(
                Vec::new(),
                DimseError::NotSupported("C-FIND requires feature 'dcmtk_cli'".into()),
            )
        }
    }

    fn close(&mut self, kind: ReleaseKind) {
        match self.state {
            AssociationState::Closed => warn!("Association already closed"),
            AssociationState::Idle => warn!("Closing an association that was never initialized"),
            _ => match kind {
                ReleaseKind::Release => info!("Association with {} released", self.node.ae_title),
                ReleaseKind::Abort => warn!("Association with {} aborted", self.node.ae_title),
            },
        }
        self.state = AssociationState::Closed;
    }
}

/// Render an identifier as `findscu -k` override keys
pub fn query_keys(dataset: &InMemDicomObject) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    for element in dataset {
        let tag = element.tag();
        let value = element
            .to_str()
            .map_err(|e| DimseError::DicomObject(format!("{}: {}", tag, e)))?;
        keys.push(format!(
            "({:04X},{:04X})={}",
            tag.group(),
            tag.element(),
            value.trim_end_matches(['\0', ' '])
        ));
    }
    Ok(keys)
}

fn model_flag(model: QueryModel) -> &'static str {
    match model {
        QueryModel::PatientRootFind => "-P",
        QueryModel::StudyRootFind => "-S",
    }
}

fn transfer_syntax_flag(ts: TransferSyntax) -> &'static str {
    match ts {
        TransferSyntax::ExplicitVrLittleEndian => "-xe",
        TransferSyntax::ExplicitVrBigEndian => "-xb",
        TransferSyntax::ImplicitVrLittleEndian => "-xi",
    }
}

/// Read the `rsp*.dcm` files written by `findscu -X`, in response order
async fn read_responses(dir: &Path) -> Vec<InMemDicomObject> {
    let mut paths = Vec::new();
    match tokio::fs::read_dir(dir).await {
        Ok(mut rd) => {
            while let Ok(Some(entry)) = rd.next_entry().await {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()).unwrap_or("") == "dcm" {
                    paths.push(path);
                }
            }
        }
        Err(e) => warn!("Failed to read response directory {:?}: {}", dir, e),
    }
    paths.sort();

    let mut matches = Vec::with_capacity(paths.len());
    for path in paths {
        match dicom_object::open_file(&path) {
            Ok(obj) => matches.push(obj.into_inner()),
            Err(e) => warn!("Skipping unreadable response {:?}: {}", path, e),
        }
    }
    matches
}

/// Builder for creating SCU instances with custom configurations
pub struct ScuBuilder {
    config: ScuConfig,
    local_aet: Option<String>,
}

impl ScuBuilder {
    /// Start building a new SCU
    pub fn new() -> Self {
        Self {
            config: ScuConfig::default(),
            local_aet: None,
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: ScuConfig) -> Self {
        Self {
            config,
            local_aet: None,
        }
    }

    /// Set the local AE title
    pub fn local_aet(mut self, aet: impl Into<String>) -> Self {
        self.local_aet = Some(aet.into());
        self
    }

    /// Set the connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the maximum PDU size
    pub fn max_pdu(mut self, size: u32) -> Self {
        self.config.max_pdu = size;
        self
    }

    /// Build the SCU
    pub fn build(self) -> Result<DcmtkAssociation> {
        self.config.validate()?;
        let mut scu = DcmtkAssociation::new(self.config);
        if let Some(aet) = self.local_aet {
            validate_ae_title(&aet)?;
            scu.set_local_title(&aet);
        }
        Ok(scu)
    }
}

impl Default for ScuBuilder {
    fn default() -> Self {
        Self::new()
    }
}
