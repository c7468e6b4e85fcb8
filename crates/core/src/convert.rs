//! Conversion of legacy identity documents into canonical identities.

use std::collections::BTreeMap;

use crate::classify::{classify, IDM_PROVIDER};
use crate::errors::ConvertError;
use crate::models::{Identity, LegacyIdentity, ProviderIdentity, PublicKey};

/// `provider_info` key carrying the delegated-owner linkage.
pub const OWNER_KEY: &str = "owner";

/// `extra_info` key carrying legacy SSH keys.
pub const SSH_KEYS_KEY: &str = "sshkeys";

/// Owners that may appear in legacy documents, with the provider each one
/// authenticates through. Any other non-empty owner is rejected.
pub const KNOWN_OWNERS: &[(&str, &str)] = &[("admin@idm", IDM_PROVIDER)];

/// Convert one legacy document into a canonical [`Identity`].
pub fn convert(doc: &LegacyIdentity) -> Result<Identity, ConvertError> {
    if doc.username.is_empty() {
        return Err(ConvertError::MissingUsername);
    }
    let provider_id = classify(&doc.username, &doc.external_id).ok_or_else(|| {
        ConvertError::UnrecognizedExternalId {
            external_id: doc.external_id.clone(),
        }
    })?;

    let mut identity = Identity::new(doc.username.clone(), provider_id);
    identity.name = doc.fullname.clone();
    identity.email = doc.email.clone();
    identity.groups = doc.groups.clone();
    if let Some(t) = doc.lastlogin {
        identity.last_login = t;
    }
    if let Some(t) = doc.lastdischarge {
        identity.last_discharge = t;
    }
    identity.public_keys = doc
        .publickeys
        .iter()
        .map(|k| PublicKey::copy_from(&k.key))
        .collect();

    if !doc.owner.is_empty() {
        identity.provider_info = owner_info(&doc.username, &doc.owner)?;
    }
    if !doc.sshkeys.is_empty() {
        identity.extra_info = BTreeMap::from([(SSH_KEYS_KEY.to_string(), doc.sshkeys.clone())]);
    }
    Ok(identity)
}

/// Build the `provider_info` entry recording `owner`.
fn owner_info(
    username: &str,
    owner: &str,
) -> Result<BTreeMap<String, Vec<String>>, ConvertError> {
    let (_, provider) = KNOWN_OWNERS
        .iter()
        .find(|(known, _)| *known == owner)
        .ok_or_else(|| ConvertError::UnrecognizedOwner {
            username: username.to_string(),
            owner: owner.to_string(),
        })?;
    let linkage = vec![
        ProviderIdentity::new(provider, owner).to_string(),
        owner.to_string(),
    ];
    Ok(BTreeMap::from([(OWNER_KEY.to_string(), linkage)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LegacyPublicKey, KEY_LEN};
    use chrono::{DateTime, TimeZone, Utc};

    fn doc(username: &str, external_id: &str) -> LegacyIdentity {
        LegacyIdentity {
            username: username.into(),
            external_id: external_id.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_minimal_idm_account() {
        let identity = convert(&doc("alice", "")).unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.provider_id, ProviderIdentity::new("idm", "alice"));
        assert_eq!(identity.last_login, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(identity.last_discharge, DateTime::<Utc>::UNIX_EPOCH);
        assert!(identity.provider_info.is_empty());
        assert!(identity.extra_info.is_empty());
    }

    #[test]
    fn test_azure_account() {
        let identity = convert(&doc("bob", "openid-connect:bob@example.com")).unwrap();
        assert_eq!(
            identity.provider_id,
            ProviderIdentity::new("azure", "bob@example.com")
        );
    }

    #[test]
    fn test_full_document_copies_fields() {
        let login = Utc.with_ymd_and_hms(2018, 5, 1, 12, 0, 0).unwrap();
        let discharge = Utc.with_ymd_and_hms(2018, 5, 2, 8, 30, 0).unwrap();
        let legacy = LegacyIdentity {
            username: "carol".into(),
            external_id: "https://login.ubuntu.com/+id/Xyz".into(),
            fullname: "Carol Example".into(),
            email: "carol@example.com".into(),
            groups: vec!["admins".into(), "ops".into()],
            lastlogin: Some(login),
            lastdischarge: Some(discharge),
            publickeys: vec![
                LegacyPublicKey { key: vec![7; KEY_LEN] },
                LegacyPublicKey { key: vec![9; 4] },
            ],
            owner: String::new(),
            sshkeys: vec!["ssh-ed25519 AAAA carol@laptop".into()],
        };

        let identity = convert(&legacy).unwrap();
        assert_eq!(identity.name, "Carol Example");
        assert_eq!(identity.email, "carol@example.com");
        assert_eq!(identity.groups, vec!["admins", "ops"]);
        assert_eq!(identity.last_login, login);
        assert_eq!(identity.last_discharge, discharge);
        assert_eq!(identity.public_keys.len(), 2);
        assert_eq!(identity.public_keys[0].0, [7; KEY_LEN]);
        assert_eq!(&identity.public_keys[1].0[..4], &[9; 4]);
        assert!(identity.public_keys[1].0[4..].iter().all(|b| *b == 0));
        assert_eq!(
            identity.extra_info[SSH_KEYS_KEY],
            vec!["ssh-ed25519 AAAA carol@laptop"]
        );
    }

    #[test]
    fn test_admin_owner_linkage() {
        let mut legacy = doc("agent-1", "");
        legacy.owner = "admin@idm".into();

        let identity = convert(&legacy).unwrap();
        assert_eq!(
            identity.provider_info[OWNER_KEY],
            vec!["idm:admin@idm".to_string(), "admin@idm".to_string()]
        );
        assert_eq!(identity.provider_info.len(), 1);
    }

    #[test]
    fn test_unknown_owner_rejected() {
        let mut legacy = doc("agent-2", "");
        legacy.owner = "someone@idm".into();

        let err = convert(&legacy).unwrap_err();
        assert_eq!(
            err,
            ConvertError::UnrecognizedOwner {
                username: "agent-2".into(),
                owner: "someone@idm".into(),
            }
        );
    }

    #[test]
    fn test_unknown_external_id_rejected() {
        let err = convert(&doc("dave", "ldap:cn=dave")).unwrap_err();
        assert_eq!(
            err,
            ConvertError::UnrecognizedExternalId {
                external_id: "ldap:cn=dave".into()
            }
        );
    }

    #[test]
    fn test_missing_username_rejected() {
        assert_eq!(convert(&doc("", "")), Err(ConvertError::MissingUsername));
        assert_eq!(
            convert(&doc("", "usso-openid:someone")),
            Err(ConvertError::MissingUsername)
        );
    }

    #[test]
    fn test_external_id_checked_before_owner() {
        let mut legacy = doc("erin", "ldap:cn=erin");
        legacy.owner = "nobody".into();
        assert!(matches!(
            convert(&legacy),
            Err(ConvertError::UnrecognizedExternalId { .. })
        ));
    }

    #[test]
    fn test_conversion_is_repeatable() {
        let mut legacy = doc("frank", "usso-openid:frank");
        legacy.owner = "admin@idm".into();
        legacy.sshkeys = vec!["k1".into(), "k2".into()];
        legacy.publickeys = vec![LegacyPublicKey { key: vec![1, 2, 3] }];

        let a = convert(&legacy).unwrap();
        let b = convert(&legacy).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }
}
