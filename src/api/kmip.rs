//! Types describing key providers, their servers, and generated keys.
//!
//! These are the values exchanged with callers of the crypto manager. The
//! registry keeps its own internal representation and converts into these
//! types whenever it hands out a view of its state.

use std::{error, fmt};
use std::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};


//------------ ClusterId -----------------------------------------------------

/// The identifier of a key provider, i.e. a cluster of KMIP servers.
#[derive(
    Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize
)]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    pub fn new(id: impl Into<String>) -> Self {
        ClusterId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ClusterId {
    fn from(id: &str) -> Self {
        ClusterId(id.to_string())
    }
}

impl From<String> for ClusterId {
    fn from(id: String) -> Self {
        ClusterId(id)
    }
}

impl FromStr for ClusterId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ClusterId(s.to_string()))
    }
}

impl AsRef<str> for ClusterId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}


//------------ ManagementType ------------------------------------------------

const NATIVE_PROVIDER_TAG: &str = "nativeProvider";

/// How the keys of a provider are managed.
///
/// Management types are free-form tags which are kept verbatim. Only the
/// exact well-known spellings map onto the named variants, any other tag
/// ends up in [`ManagementType::Other`] as given.
///
/// The only tag with a meaning to the crypto manager is the native
/// provider tag, matched regardless of case: keys cannot be generated
/// against a native provider.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum ManagementType {
    #[default]
    Unknown,
    VCenter,
    TrustAuthority,
    NativeProvider,
    Other(String),
}

impl ManagementType {
    pub fn as_str(&self) -> &str {
        match self {
            ManagementType::Unknown => "unknown",
            ManagementType::VCenter => "vCenter",
            ManagementType::TrustAuthority => "trustAuthority",
            ManagementType::NativeProvider => NATIVE_PROVIDER_TAG,
            ManagementType::Other(tag) => tag.as_str(),
        }
    }

    pub fn is_native(&self) -> bool {
        match self {
            ManagementType::NativeProvider => true,
            ManagementType::Other(tag) => {
                tag.eq_ignore_ascii_case(NATIVE_PROVIDER_TAG)
            }
            _ => false,
        }
    }
}

impl From<&str> for ManagementType {
    fn from(tag: &str) -> Self {
        match tag {
            "unknown" => ManagementType::Unknown,
            "vCenter" => ManagementType::VCenter,
            "trustAuthority" => ManagementType::TrustAuthority,
            NATIVE_PROVIDER_TAG => ManagementType::NativeProvider,
            _ => ManagementType::Other(tag.to_string()),
        }
    }
}

impl FromStr for ManagementType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ManagementType::from(s))
    }
}

impl fmt::Display for ManagementType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ManagementType {
    fn serialize<S: Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        self.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ManagementType {
    fn deserialize<D>(d: D) -> Result<ManagementType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(d)?;
        Ok(ManagementType::from(string.as_str()))
    }
}


//------------ EntityRef -----------------------------------------------------

/// A reference to a managed entity, e.g. a virtual machine or a host.
///
/// The crypto manager never looks inside entity references. It only
/// compares them to find per-entity default providers. The textual form is
/// `kind:value`, e.g. `VirtualMachine:vm-42`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntityRef {
    kind: String,
    value: String,
}

impl EntityRef {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        EntityRef {
            kind: kind.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl FromStr for EntityRef {
    type Err = InvalidEntityRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, value)) if !kind.is_empty() && !value.is_empty() => {
                Ok(EntityRef::new(kind, value))
            }
            _ => Err(InvalidEntityRef(s.to_string())),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

impl Serialize for EntityRef {
    fn serialize<S: Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EntityRef {
    fn deserialize<D>(d: D) -> Result<EntityRef, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(d)?;
        EntityRef::from_str(&string).map_err(serde::de::Error::custom)
    }
}


//------------ InvalidEntityRef ----------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidEntityRef(String);

impl fmt::Display for InvalidEntityRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "invalid entity reference '{}', expected 'kind:value'", self.0
        )
    }
}

impl error::Error for InvalidEntityRef { }


//------------ KmipServerInfo ------------------------------------------------

/// A single KMIP server of a provider.
///
/// Only the name is used by the crypto manager, it must be unique within
/// the owning cluster. Everything else is connection information that is
/// kept and handed back as is.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct KmipServerInfo {
    pub name: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbio: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl KmipServerInfo {
    /// Creates server info with just a name and an address.
    pub fn new(
        name: impl Into<String>, address: impl Into<String>, port: u16
    ) -> Self {
        KmipServerInfo {
            name: name.into(),
            address: address.into(),
            port,
            ..Default::default()
        }
    }

    /// Creates server info that only carries a name.
    pub fn named(name: impl Into<String>) -> Self {
        KmipServerInfo {
            name: name.into(),
            ..Default::default()
        }
    }
}


//------------ KmipServerSpec ------------------------------------------------

/// A request to register or update a server of a provider.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct KmipServerSpec {
    pub cluster_id: ClusterId,
    pub info: KmipServerInfo,

    /// The password for the server.
    ///
    /// It is accepted for compatibility with the real service but never
    /// stored, and thus never echoed back.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl KmipServerSpec {
    pub fn new(cluster_id: ClusterId, info: KmipServerInfo) -> Self {
        KmipServerSpec {
            cluster_id,
            info,
            password: None,
        }
    }
}


//------------ KmipClusterInfo -----------------------------------------------

/// The externally visible state of a registered provider.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct KmipClusterInfo {
    pub cluster_id: ClusterId,
    pub management_type: ManagementType,
    pub use_as_default: bool,
    pub use_as_entity_default: Vec<EntityRef>,
    pub servers: Vec<KmipServerInfo>,
}

impl KmipClusterInfo {
    pub fn has_server(&self, name: &str) -> bool {
        self.servers.iter().any(|server| server.name == name)
    }
}


//------------ ClusterSelector -----------------------------------------------

/// Selects a provider, and optionally some of its servers, for a status
/// query.
///
/// An empty server list selects all servers the provider has at the time
/// the query is made.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClusterSelector {
    pub cluster_id: ClusterId,

    #[serde(default)]
    pub servers: Vec<String>,
}

impl ClusterSelector {
    pub fn cluster(cluster_id: ClusterId) -> Self {
        ClusterSelector {
            cluster_id,
            servers: Vec::new(),
        }
    }

    pub fn with_server(mut self, name: impl Into<String>) -> Self {
        self.servers.push(name.into());
        self
    }
}

impl From<&KmipClusterInfo> for ClusterSelector {
    fn from(info: &KmipClusterInfo) -> Self {
        ClusterSelector {
            cluster_id: info.cluster_id.clone(),
            servers: info.servers.iter().map(|s| s.name.clone()).collect(),
        }
    }
}


//------------ EntityStatus --------------------------------------------------

/// The health of a provider or server.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Gray,
    Green,
    Yellow,
    Red,
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            EntityStatus::Gray => "gray",
            EntityStatus::Green => "green",
            EntityStatus::Yellow => "yellow",
            EntityStatus::Red => "red",
        })
    }
}


//------------ ClusterStatus -------------------------------------------------

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClusterStatus {
    pub cluster_id: ClusterId,
    pub management_type: ManagementType,
    pub overall_status: EntityStatus,
    pub servers: Vec<ServerStatus>,
}


//------------ ServerStatus --------------------------------------------------

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub status: EntityStatus,
}


//------------ CryptoKeyId ---------------------------------------------------

/// A generated key and the provider that issued it.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct CryptoKeyId {
    pub key_id: String,
    pub provider_id: ClusterId,
}

impl fmt::Display for CryptoKeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.key_id, self.provider_id)
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn management_type_parses_known_tags() {
        assert_eq!(
            ManagementType::from("nativeProvider"),
            ManagementType::NativeProvider
        );
        assert_eq!(ManagementType::from("vCenter"), ManagementType::VCenter);
        assert_eq!(
            ManagementType::from("KmsServer"),
            ManagementType::Other("KmsServer".into())
        );
        assert!(ManagementType::from("NativeProvider").is_native());
        assert!(ManagementType::from("NATIVEPROVIDER").is_native());
        assert!(!ManagementType::from("Native").is_native());
        assert!(!ManagementType::from("vCenter").is_native());
    }

    #[test]
    fn management_type_keeps_tag_as_given() {
        for tag in [
            "VCENTER", "Unknown", "NativeProvider", "nativeProvider",
            "vCenter", "KmsServer",
        ] {
            let management_type = ManagementType::from(tag);
            assert_eq!(management_type.as_str(), tag);
            assert_eq!(management_type.to_string(), tag);

            let json = serde_json::to_string(&management_type).unwrap();
            assert_eq!(json, format!("\"{}\"", tag));
            let back: ManagementType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, management_type);
        }
    }

    #[test]
    fn entity_ref_from_str() {
        let entity = EntityRef::from_str("VirtualMachine:vm-42").unwrap();
        assert_eq!(entity.kind(), "VirtualMachine");
        assert_eq!(entity.value(), "vm-42");
        assert_eq!(entity.to_string(), "VirtualMachine:vm-42");

        assert!(EntityRef::from_str("vm-42").is_err());
        assert!(EntityRef::from_str(":vm-42").is_err());
        assert!(EntityRef::from_str("VirtualMachine:").is_err());
    }

    #[test]
    fn server_spec_never_serializes_password() {
        let mut spec = KmipServerSpec::new(
            ClusterId::from("pA"), KmipServerInfo::named("s1")
        );
        spec.password = Some("secret".into());
        let json = serde_json::to_string(&spec).unwrap();
        assert!(!json.contains("secret"));
    }
}
