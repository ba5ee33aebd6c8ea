//! Control-plane error hierarchy
//!
//! Errors are grouped by the layer that produces them (snapshot assembly,
//! compatibility processing, node bookkeeping, authentication, transport,
//! storage) and folded into the crate level [`Error`].

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Settings that loaded but do not validate
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Configuration fan-out failures
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Failures of the CP→DP configuration pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Compat(#[from] CompatError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Snapshot assembly and canonicalization failures.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// A page request for one entity kind failed; partial results are discarded
    #[error("snapshot_fetch_failed: fetching {kind} failed: {source}")]
    FetchFailed {
        kind: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// A page request exceeded the per-request deadline
    #[error("snapshot_fetch_failed: fetching {kind} timed out after {duration:?}")]
    FetchTimeout { kind: &'static str, duration: Duration },

    /// Store returned an entity the canonical form cannot represent
    #[error("contract violation in {section}: {reason}")]
    ContractViolation { section: &'static str, reason: String },

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// Version-compatibility processing failures.
///
/// Cloneable so the version cache can hand the same failure to every caller
/// until the payload changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompatError {
    #[error("bad_dp_version: {0}")]
    BadDataPlaneVersion(String),

    #[error("corrupt_payload: {0}")]
    CorruptPayload(String),

    #[error("invalid_document: {0}")]
    InvalidDocument(String),

    #[error("extra_processing_invalid: {0}")]
    ExtraProcessingInvalid(String),

    /// The cache was asked for a payload before the first reconfigure
    #[error("no payload available yet")]
    PayloadUnavailable,
}

/// Change catalog registration failures. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate_id: change {0} already registered")]
    DuplicateId(String),

    #[error("invalid_change {id}: {reason}")]
    InvalidChange { id: String, reason: String },

    #[error("change catalog could not be parsed: {0}")]
    Catalog(#[from] serde_json::Error),
}

/// Node registry and per-node protocol failures.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("duplicate_node: {0} is already connected")]
    DuplicateNode(String),

    #[error("not_found: node {0}")]
    NotFound(String),

    #[error("bad_hash: {0:?} is not a 32 character hex string")]
    BadHash(String),

    #[error("node_write_failed: {node_id}: {reason}")]
    WriteFailed { node_id: String, reason: String },

    #[error("prereq_failed: {0}")]
    PrerequisiteFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("invalid_node_type: {0}")]
    InvalidNodeType(String),

    #[error("malformed negotiation request: {0}")]
    Malformed(String),

    #[error("capability {name} registration failed: {reason}")]
    Registrar { name: String, reason: String },
}

impl NegotiationError {
    pub fn http_status(&self) -> u16 {
        match self {
            NegotiationError::InvalidNodeType(_) | NegotiationError::Malformed(_) => 400,
            NegotiationError::Registrar { .. } => 500,
        }
    }
}

/// Authentication failure handed back to the DP as an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("auth_failed ({http_status}): {message}")]
pub struct AuthError {
    pub http_status: u16,
    pub message: String,
}

impl AuthError {
    pub fn new(
        http_status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self {
            http_status,
            message: message.into(),
        }
    }

    pub(crate) fn no_client_certificate() -> Self {
        Self::new(401, "no client certificate")
    }

    pub(crate) fn non_tls() -> Self {
        Self::new(400, "invalid non-TLS request")
    }

    pub(crate) fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message)
    }
}

/// Entry URL parameter validation failures. All map to HTTP 400.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("unsupported dataplane version: {0}")]
    UnsupportedDataplaneVersion(String),
}

/// Websocket / RPC session failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection closed")]
    Closed,

    #[error("websocket transport error: {0}")]
    Transport(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("wrong_direction: {0} is only invoked by the control plane")]
    WrongDirection(String),

    #[error("method {0} is not implemented")]
    NotImplemented(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Malformed endpoint addresses
    #[error("Invalid URI format: {0}")]
    InvalidURI(String),

    /// Relay stream could not be established
    #[error("relay_setup_failed: {0}")]
    RelaySetupFailed(String),

    /// gRPC transport layer errors
    #[error(transparent)]
    TonicError(#[from] Box<tonic::transport::Error>),

    /// gRPC status code errors
    #[error(transparent)]
    TonicStatusError(#[from] Box<tonic::Status>),

    /// TLS material or handshake configuration errors
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Listener bind failed on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Backing store cannot serve requests
    #[error("store_unavailable: {0}")]
    Unavailable(String),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    Sled(#[from] sled::Error),

    /// Persisted rows that no longer decode
    #[error("Corrupt record in {tree}: {source}")]
    CorruptRecord {
        tree: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Network layer
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    // Storage layer
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::System(SystemError::Storage(StorageError::Sled(e)))
    }
}

impl From<SnapshotError> for Error {
    fn from(e: SnapshotError) -> Self {
        Error::Sync(SyncError::Snapshot(e))
    }
}

impl From<CompatError> for Error {
    fn from(e: CompatError) -> Self {
        Error::Sync(SyncError::Compat(e))
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Sync(SyncError::Registry(e))
    }
}

impl From<NodeError> for Error {
    fn from(e: NodeError) -> Self {
        Error::Sync(SyncError::Node(e))
    }
}

impl From<NegotiationError> for Error {
    fn from(e: NegotiationError) -> Self {
        Error::Sync(SyncError::Negotiation(e))
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Sync(SyncError::Auth(e))
    }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self {
        Error::Sync(SyncError::Handshake(e))
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Error::Sync(SyncError::Session(e))
    }
}
