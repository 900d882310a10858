//! Scope engine (C4): parse/validate scopes, per-scope claim sets, and
//! client effective-scope resolution.

use std::collections::BTreeSet;

use crate::models::client::Client;

/// Recognized scopes and the claims each grants. `offline_access` is an
/// effect (controls refresh-token lifespan), not a claim; `web-origins`
/// likewise carries no claims of its own.
pub fn claims_for_scope(scope: &str) -> &'static [&'static str] {
    match scope {
        "openid" => &["sub"],
        "profile" => &["preferred_username", "given_name", "family_name", "name"],
        "email" => &["email", "email_verified"],
        "roles" => &["realm_access", "resource_access"],
        _ => &[],
    }
}

/// Parse a space-separated scope string, preserving order, dropping unknown
/// scopes, and deduplicating.
pub fn parse_and_validate(raw: &str) -> Vec<String> {
    const KNOWN: &[&str] = &[
        "openid",
        "profile",
        "email",
        "roles",
        "offline_access",
        "web-origins",
    ];

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for token in raw.split_whitespace() {
        if KNOWN.contains(&token) && seen.insert(token.to_string()) {
            out.push(token.to_string());
        }
    }
    out
}

/// The full claim set granted by a collection of scopes.
pub fn claims_for_scopes(scopes: &[String]) -> BTreeSet<&'static str> {
    scopes
        .iter()
        .flat_map(|s| claims_for_scope(s).iter().copied())
        .collect()
}

pub fn has_openid(scopes: &[String]) -> bool {
    scopes.iter().any(|s| s == "openid")
}

pub fn to_string(scopes: &[String]) -> String {
    scopes.join(" ")
}

/// Union of the client's configured default scopes and the intersection of
/// `requested` with the client's configured optional scopes.
pub fn client_effective_scopes(client: &Client, requested: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();

    for s in &client.default_scopes {
        if seen.insert(s.clone()) {
            out.push(s.clone());
        }
    }
    for s in requested {
        if client.optional_scopes.contains(s) && seen.insert(s.clone()) {
            out.push(s.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::client::ClientType;
    use uuid::Uuid;

    #[test]
    fn parse_preserves_order_drops_unknown_dedupes() {
        let scopes = parse_and_validate(" openid profile foo openid ");
        assert_eq!(scopes, vec!["openid".to_string(), "profile".to_string()]);
    }

    #[test]
    fn claims_for_scopes_union() {
        let scopes = vec!["openid".to_string(), "email".to_string()];
        let claims = claims_for_scopes(&scopes);
        assert!(claims.contains("sub"));
        assert!(claims.contains("email"));
        assert!(claims.contains("email_verified"));
        assert!(!claims.contains("preferred_username"));
    }

    #[test]
    fn client_effective_scopes_union_and_intersection() {
        let client = Client {
            id: Uuid::nil(),
            realm_id: Uuid::nil(),
            client_id: "c".to_string(),
            client_type: ClientType::Public,
            client_secret_hash: None,
            enabled: true,
            grant_types: vec![],
            redirect_uris: vec![],
            web_origins: vec![],
            service_account_user_id: None,
            backchannel_logout_uri: None,
            backchannel_logout_session_required: false,
            default_scopes: vec!["openid".to_string()],
            optional_scopes: vec!["email".to_string(), "roles".to_string()],
        };

        let effective = client_effective_scopes(
            &client,
            &["email".to_string(), "unrequested_extra".to_string()],
        );
        assert_eq!(effective, vec!["openid".to_string(), "email".to_string()]);
    }
}
