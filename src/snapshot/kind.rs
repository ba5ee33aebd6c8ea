use std::fmt;

/// Entity kinds paged out of the store, in snapshot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Service,
    Route,
    Plugin,
    Upstream,
    Target,
    Consumer,
    Certificate,
    CaCertificate,
    Sni,
    Vault,
    Keyset,
    PluginSchema,
}

impl EntityKind {
    pub const ALL: [EntityKind; 12] = [
        EntityKind::Service,
        EntityKind::Route,
        EntityKind::Plugin,
        EntityKind::Upstream,
        EntityKind::Target,
        EntityKind::Consumer,
        EntityKind::Certificate,
        EntityKind::CaCertificate,
        EntityKind::Sni,
        EntityKind::Vault,
        EntityKind::Keyset,
        EntityKind::PluginSchema,
    ];

    /// Top-level key of this kind in the snapshot document
    pub const fn section(self) -> &'static str {
        match self {
            EntityKind::Service => "services",
            EntityKind::Route => "routes",
            EntityKind::Plugin => "plugins",
            EntityKind::Upstream => "upstreams",
            EntityKind::Target => "targets",
            EntityKind::Consumer => "consumers",
            EntityKind::Certificate => "certificates",
            EntityKind::CaCertificate => "ca_certificates",
            EntityKind::Sni => "snis",
            EntityKind::Vault => "vaults",
            EntityKind::Keyset => "keysets",
            EntityKind::PluginSchema => "plugin_schemas",
        }
    }

    /// Singular name used in change reports
    pub const fn resource_type(self) -> &'static str {
        match self {
            EntityKind::Service => "service",
            EntityKind::Route => "route",
            EntityKind::Plugin => "plugin",
            EntityKind::Upstream => "upstream",
            EntityKind::Target => "target",
            EntityKind::Consumer => "consumer",
            EntityKind::Certificate => "certificate",
            EntityKind::CaCertificate => "ca_certificate",
            EntityKind::Sni => "sni",
            EntityKind::Vault => "vault",
            EntityKind::Keyset => "keyset",
            EntityKind::PluginSchema => "plugin_schema",
        }
    }

    pub fn from_section(section: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.section() == section)
    }

    /// Services and routes keep `updated_at`; DPs use it for cache
    /// invalidation.
    pub const fn keeps_updated_at(self) -> bool {
        matches!(self, EntityKind::Service | EntityKind::Route)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.section())
    }
}
