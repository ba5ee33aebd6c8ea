use serde::Deserialize;

use crate::DataPlaneVersion;
use crate::HandshakeError;

/// Query parameters a data plane sends on `/v1/outlet` and `/v1/wrpc`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HandshakeQuery {
    pub node_id: Option<String>,
    pub node_hostname: Option<String>,
    pub node_version: Option<String>,
}

/// Validated identity of a connecting data plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub node_id: String,
    pub hostname: String,
    pub version: DataPlaneVersion,
    /// Version string as sent; the version cache is keyed by it
    pub raw_version: String,
}

fn required<'a>(
    value: &'a Option<String>,
    field: &'static str,
) -> Result<&'a str, HandshakeError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(HandshakeError::MissingParameter(field)),
    }
}

impl HandshakeQuery {
    /// Checks every parameter and rejects versions below `floor`
    pub fn validate(
        &self,
        floor: &DataPlaneVersion,
    ) -> Result<Handshake, HandshakeError> {
        let node_id = required(&self.node_id, "node_id")?;
        if uuid::Uuid::parse_str(node_id).is_err() {
            return Err(HandshakeError::InvalidParameter {
                field: "node_id",
                reason: format!("{node_id:?} is not a uuid"),
            });
        }

        let hostname = required(&self.node_hostname, "node_hostname")?;

        let raw_version = required(&self.node_version, "node_version")?;
        let version = DataPlaneVersion::parse(raw_version).map_err(|e| HandshakeError::InvalidParameter {
            field: "node_version",
            reason: e.to_string(),
        })?;
        if version < *floor {
            return Err(HandshakeError::UnsupportedDataplaneVersion(raw_version.to_string()));
        }

        Ok(Handshake {
            node_id: node_id.to_string(),
            hostname: hostname.to_string(),
            version,
            raw_version: raw_version.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(
        id: Option<&str>,
        hostname: Option<&str>,
        version: Option<&str>,
    ) -> HandshakeQuery {
        HandshakeQuery {
            node_id: id.map(str::to_string),
            node_hostname: hostname.map(str::to_string),
            node_version: version.map(str::to_string),
        }
    }

    const ID: &str = "6e1f7c0a-2b7d-4a5e-8f0e-1d2c3b4a5f60";

    fn floor() -> DataPlaneVersion {
        DataPlaneVersion::parse("2.5.0").unwrap()
    }

    #[test]
    fn accepts_well_formed_parameters() {
        let hs = query(Some(ID), Some("dp-1"), Some("3.0.0.1-enterprise-edition"))
            .validate(&floor())
            .unwrap();
        assert_eq!(hs.node_id, ID);
        assert_eq!(hs.hostname, "dp-1");
        assert_eq!(hs.raw_version, "3.0.0.1-enterprise-edition");
    }

    #[test]
    fn missing_parameters_are_named() {
        let cases = [
            (query(None, Some("h"), Some("3.0.0")), "node_id"),
            (query(Some(ID), Some(" "), Some("3.0.0")), "node_hostname"),
            (query(Some(ID), Some("h"), None), "node_version"),
        ];
        for (q, field) in cases {
            assert_eq!(q.validate(&floor()), Err(HandshakeError::MissingParameter(field)));
        }
    }

    #[test]
    fn malformed_parameters_are_rejected() {
        assert!(matches!(
            query(Some("dp-1"), Some("h"), Some("3.0.0")).validate(&floor()),
            Err(HandshakeError::InvalidParameter { field: "node_id", .. })
        ));
        assert!(matches!(
            query(Some(ID), Some("h"), Some("3.1000.0")).validate(&floor()),
            Err(HandshakeError::InvalidParameter { field: "node_version", .. })
        ));
    }

    #[test]
    fn versions_below_the_floor_are_unsupported() {
        assert_eq!(
            query(Some(ID), Some("h"), Some("2.4.9")).validate(&floor()),
            Err(HandshakeError::UnsupportedDataplaneVersion("2.4.9".into()))
        );
        assert!(query(Some(ID), Some("h"), Some("2.5.0")).validate(&floor()).is_ok());
    }
}
