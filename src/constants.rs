// -
// Snapshot layout

/// Value of the `_format_version` marker section
pub(crate) const FORMAT_VERSION: &str = "1.1";
pub(crate) const FORMAT_VERSION_KEY: &str = "_format_version";
pub(crate) const TRANSFORM_KEY: &str = "_transform";
pub(crate) const PARAMETERS_SECTION: &str = "parameters";
pub(crate) const CLUSTER_ID_PARAMETER: &str = "cluster_id";

/// Store page size used while assembling a snapshot
pub(crate) const SNAPSHOT_PAGE_SIZE: usize = 1000;

/// Sections folded into the whole-document hash
pub(crate) const HASHED_SECTIONS: [&str; 5] = ["routes", "services", "plugins", "upstreams", "targets"];

/// Hash reported for a missing or empty section
pub const EMPTY_HASH: &str = "00000000000000000000000000000000";

pub(crate) const HASH_LENGTH: usize = 32;

// -
// Wire envelope

pub(crate) const ENVELOPE_TYPE_RECONFIGURE: &str = "reconfigure";

// -
// Change report caps

pub(crate) const MAX_REPORT_CHANGES: usize = 128;
pub(crate) const MAX_REPORT_RESOURCES: usize = 128;

// -
// Negotiation

/// Only node type accepted by the negotiation endpoint
pub(crate) const EXPECTED_NODE_TYPE: &str = "KONG";
pub(crate) const CAPABILITY_CONFIG: &str = "config";
pub(crate) const CAPABILITY_CLUSTER_PROTOCOL: &str = "cluster_protocol";

// -
// Persistence

/// Key of the single-row store event marker
pub(crate) const LAST_UPDATE_KEY: &str = "last_update";
pub(crate) const NODE_TREE: &str = "nodes";
pub(crate) const STATUS_TREE: &str = "status";
pub(crate) const STORE_EVENT_TREE: &str = "store_event";
pub(crate) const ENTITY_TREE_PREFIX: &str = "entities";

// -
// Status

pub(crate) const STATUS_REF_NODE: &str = "node";
pub(crate) const MISSING_PLUGIN_CODE: &str = "DP001";
pub(crate) const MISSING_PLUGIN_MESSAGE: &str = "kong data-plane node missing plugin";
