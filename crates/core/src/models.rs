//! Domain model types used throughout idmigrate.
//!
//! [`LegacyIdentity`] mirrors one document of the legacy identity collection;
//! [`Identity`] is the canonical record written to the destination store.

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Provider identity
// ---------------------------------------------------------------------------

/// A provider-qualified identity reference, stored as `provider:subject`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderIdentity(String);

impl ProviderIdentity {
    /// Build the reference for `subject` as known to `provider`.
    pub fn new(provider: &str, subject: &str) -> Self {
        Self(format!("{provider}:{subject}"))
    }

    /// Wrap an already serialised reference (e.g. read back from a store).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Public keys
// ---------------------------------------------------------------------------

/// Width in bytes of a public key.
pub const KEY_LEN: usize = 32;

/// A fixed-width public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; KEY_LEN]);

impl PublicKey {
    /// Copy `bytes` into a key buffer.
    ///
    /// Input longer than [`KEY_LEN`] is truncated; shorter input leaves the
    /// remaining bytes zero.
    pub fn copy_from(bytes: &[u8]) -> Self {
        let mut key = [0u8; KEY_LEN];
        let n = bytes.len().min(KEY_LEN);
        key[..n].copy_from_slice(&bytes[..n]);
        Self(key)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        if bytes.len() != KEY_LEN {
            return Err(serde::de::Error::invalid_length(
                bytes.len(),
                &"a 32 byte public key",
            ));
        }
        Ok(Self::copy_from(&bytes))
    }
}

// ---------------------------------------------------------------------------
// Legacy document
// ---------------------------------------------------------------------------

/// A raw key block as stored in a legacy document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyPublicKey {
    #[serde(default, with = "base64_bytes")]
    pub key: Vec<u8>,
}

/// One document of the legacy `identities` collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyIdentity {
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub external_id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub fullname: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub groups: Vec<String>,

    /// `None` means the user never logged in.
    #[serde(default)]
    pub lastlogin: Option<DateTime<Utc>>,

    #[serde(default)]
    pub lastdischarge: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub publickeys: Vec<LegacyPublicKey>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub owner: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub sshkeys: Vec<String>,
}

// ---------------------------------------------------------------------------
// Canonical identity
// ---------------------------------------------------------------------------

/// A canonical identity as written to the destination store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub provider_id: ProviderIdentity,
    pub name: String,
    pub email: String,
    pub groups: Vec<String>,
    pub public_keys: Vec<PublicKey>,
    /// Unix epoch when the user never logged in.
    pub last_login: DateTime<Utc>,
    pub last_discharge: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provider_info: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_info: BTreeMap<String, Vec<String>>,
}

impl Identity {
    /// An identity with only the key fields set; everything else empty and
    /// both timestamps at the Unix epoch.
    pub fn new(username: impl Into<String>, provider_id: ProviderIdentity) -> Self {
        Self {
            username: username.into(),
            provider_id,
            name: String::new(),
            email: String::new(),
            groups: Vec::new(),
            public_keys: Vec::new(),
            last_login: DateTime::<Utc>::UNIX_EPOCH,
            last_discharge: DateTime::<Utc>::UNIX_EPOCH,
            provider_info: BTreeMap::new(),
            extra_info: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
