//! Classification of legacy external IDs.
//!
//! Legacy documents record where an account originally authenticated in a
//! single free-form `external_id` field. [`classify`] turns that field (plus
//! the username) into a [`ProviderIdentity`] by walking [`RULES`] in order;
//! the first matching rule wins. Supporting another historical encoding means
//! adding a row to the table.

use crate::models::ProviderIdentity;

/// Provider for accounts created directly in the identity manager.
pub const IDM_PROVIDER: &str = "idm";

/// How a rule decides whether it applies to an external ID.
#[derive(Debug, Clone, Copy)]
pub enum Match {
    /// The external ID is empty.
    Empty,
    /// The external ID starts with the given literal prefix.
    Prefix(&'static str),
}

/// Which string becomes the provider-specific subject.
#[derive(Debug, Clone, Copy)]
pub enum Subject {
    /// The legacy username.
    Username,
    /// The external ID, unchanged.
    ExternalId,
    /// The external ID with the matched prefix removed.
    StripPrefix,
}

/// One row of the classification table.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub matches: Match,
    pub provider: &'static str,
    pub subject: Subject,
}

/// Classification rules, evaluated first-match-wins.
pub const RULES: &[Rule] = &[
    Rule {
        matches: Match::Empty,
        provider: IDM_PROVIDER,
        subject: Subject::Username,
    },
    Rule {
        matches: Match::Prefix("https://login.ubuntu.com/+id"),
        provider: "usso",
        subject: Subject::ExternalId,
    },
    // openid-connect was only ever used with Azure AD; the prefix itself does
    // not name the provider.
    Rule {
        matches: Match::Prefix("openid-connect:"),
        provider: "azure",
        subject: Subject::StripPrefix,
    },
    Rule {
        matches: Match::Prefix("usso-openid:"),
        provider: "usso_macaroon",
        subject: Subject::StripPrefix,
    },
];

impl Rule {
    /// Apply this rule, returning the subject when it matches.
    fn apply<'a>(&self, username: &'a str, external_id: &'a str) -> Option<&'a str> {
        let rest = match self.matches {
            Match::Empty if external_id.is_empty() => external_id,
            Match::Empty => return None,
            Match::Prefix(prefix) => external_id.strip_prefix(prefix)?,
        };
        Some(match self.subject {
            Subject::Username => username,
            Subject::ExternalId => external_id,
            Subject::StripPrefix => rest,
        })
    }
}

/// Derive the provider identity for a legacy account.
///
/// Returns `None` when no rule recognises `external_id`.
pub fn classify(username: &str, external_id: &str) -> Option<ProviderIdentity> {
    RULES.iter().find_map(|rule| {
        rule.apply(username, external_id)
            .map(|subject| ProviderIdentity::new(rule.provider, subject))
    })
}
