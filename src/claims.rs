//! Claims resolver (C5): filter user attributes by an allowed-claim set.
//! Missing/null attributes are omitted, never emitted as null (§4.3).

use std::collections::BTreeSet;

use serde_json::{Map, Value, json};

use crate::models::user::User;

/// Resolve the subset of standard claims on `user` whose names appear in
/// `allowed`.
pub fn resolve(user: &User, allowed: &BTreeSet<&'static str>) -> Map<String, Value> {
    let mut out = Map::new();

    if allowed.contains("sub") {
        out.insert("sub".into(), json!(user.id.to_string()));
    }
    if allowed.contains("preferred_username") {
        out.insert("preferred_username".into(), json!(user.username));
    }
    if allowed.contains("email") {
        if let Some(email) = &user.email {
            out.insert("email".into(), json!(email));
        }
    }
    if allowed.contains("email_verified") {
        out.insert("email_verified".into(), json!(user.email_verified));
    }
    if allowed.contains("given_name") {
        if let Some(first) = &user.first_name {
            out.insert("given_name".into(), json!(first));
        }
    }
    if allowed.contains("family_name") {
        if let Some(last) = &user.last_name {
            out.insert("family_name".into(), json!(last));
        }
    }
    if allowed.contains("name") {
        if let Some(name) = user.full_name() {
            out.insert("name".into(), json!(name));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn user() -> User {
        User {
            id: Uuid::nil(),
            realm_id: Uuid::nil(),
            username: "alice".to_string(),
            email: None,
            email_verified: false,
            first_name: Some("Ada".to_string()),
            last_name: None,
            enabled: true,
            password_hash: None,
            password_changed_at: None,
            locked_until: None,
            federation_link: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn missing_attribute_is_omitted_not_null() {
        let allowed: BTreeSet<&'static str> = ["email", "given_name"].into_iter().collect();
        let claims = resolve(&user(), &allowed);
        assert!(!claims.contains_key("email"));
        assert_eq!(claims.get("given_name").unwrap(), "Ada");
    }

    #[test]
    fn disallowed_claim_never_appears() {
        let allowed: BTreeSet<&'static str> = ["sub"].into_iter().collect();
        let claims = resolve(&user(), &allowed);
        assert_eq!(claims.len(), 1);
        assert!(claims.contains_key("sub"));
    }
}
