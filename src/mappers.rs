//! Protocol-mapper executor (C6): applies configured mappers to a JWT
//! payload. Dispatch is a tagged variant over known mapper types plus an
//! `Unknown` case (spec.md §9 "Dynamic mapper dispatch").
//!
//! Mappers run *after* standard claim filtering so they may override or
//! extend it (§4.4).

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::models::protocol_mapper::ProtocolMapper;

/// Context available to every mapper: user attributes plus the resolved
/// role claims.
pub struct MapperContext<'a> {
    pub user_id: &'a str,
    pub username: &'a str,
    pub email: Option<&'a str>,
    pub email_verified: bool,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub realm_roles: &'a [String],
    /// client_id (as string) -> roles scoped to that client.
    pub resource_access: &'a BTreeMap<String, Vec<String>>,
}

enum MapperKind {
    UserModelAttribute,
    HardcodedClaim,
    RoleList,
    Audience,
    FullName,
    Unknown,
}

fn classify(mapper_type: &str) -> MapperKind {
    match mapper_type {
        "oidc-usermodel-attribute-mapper" => MapperKind::UserModelAttribute,
        "oidc-hardcoded-claim-mapper" => MapperKind::HardcodedClaim,
        "oidc-role-list-mapper" => MapperKind::RoleList,
        "oidc-audience-mapper" => MapperKind::Audience,
        "oidc-full-name-mapper" => MapperKind::FullName,
        _ => MapperKind::Unknown,
    }
}

/// Apply every mapper in order, mutating `payload` in place.
pub fn execute(mappers: &[ProtocolMapper], ctx: &MapperContext, payload: &mut Map<String, Value>) {
    for mapper in mappers {
        apply_one(mapper, ctx, payload);
    }
}

fn apply_one(mapper: &ProtocolMapper, ctx: &MapperContext, payload: &mut Map<String, Value>) {
    match classify(&mapper.mapper_type) {
        MapperKind::UserModelAttribute => {
            let Some(attr) = mapper.config.get("user.attribute").and_then(Value::as_str) else {
                return;
            };
            let Some(claim_name) = mapper.config.get("claim.name").and_then(Value::as_str) else {
                return;
            };
            if let Some(value) = user_attribute(ctx, attr) {
                if !value.is_null() {
                    payload.insert(claim_name.to_string(), value);
                }
            }
        }
        MapperKind::HardcodedClaim => {
            let (Some(claim_name), Some(claim_value)) = (
                mapper.config.get("claim.name").and_then(Value::as_str),
                mapper.config.get("claim.value").and_then(Value::as_str),
            ) else {
                return;
            };
            payload.insert(claim_name.to_string(), json!(claim_value));
        }
        MapperKind::RoleList => {
            let claim_name = mapper.config.get("claim.name").and_then(Value::as_str);
            if claim_name.is_none() || claim_name == Some("realm_access") {
                payload.insert(
                    "realm_access".to_string(),
                    json!({ "roles": ctx.realm_roles }),
                );
                payload.insert(
                    "resource_access".to_string(),
                    json!(ctx.resource_access),
                );
            }
        }
        MapperKind::Audience => {
            let Some(audience) = mapper
                .config
                .get("included.client.audience")
                .and_then(Value::as_str)
            else {
                return;
            };
            merge_audience(payload, audience);
        }
        MapperKind::FullName => {
            if let Some(name) = full_name(ctx) {
                payload.insert("name".to_string(), json!(name));
            }
        }
        MapperKind::Unknown => {}
    }
}

fn user_attribute(ctx: &MapperContext, attr: &str) -> Option<Value> {
    match attr {
        "username" => Some(json!(ctx.username)),
        "email" => ctx.email.map(|e| json!(e)),
        "emailVerified" | "email_verified" => Some(json!(ctx.email_verified)),
        "firstName" | "first_name" => ctx.first_name.map(|f| json!(f)),
        "lastName" | "last_name" => ctx.last_name.map(|l| json!(l)),
        _ => None,
    }
}

fn full_name(ctx: &MapperContext) -> Option<String> {
    match (ctx.first_name, ctx.last_name) {
        (Some(f), Some(l)) => Some(format!("{f} {l}")),
        (Some(f), None) => Some(f.to_string()),
        (None, Some(l)) => Some(l.to_string()),
        (None, None) => None,
    }
}

/// Merge an audience into `aud`: absent ⇒ string; string ⇒ promote to
/// array with appended audience; array ⇒ append.
fn merge_audience(payload: &mut Map<String, Value>, audience: &str) {
    match payload.remove("aud") {
        None => {
            payload.insert("aud".to_string(), json!(audience));
        }
        Some(Value::String(existing)) => {
            payload.insert("aud".to_string(), json!([existing, audience]));
        }
        Some(Value::Array(mut existing)) => {
            existing.push(json!(audience));
            payload.insert("aud".to_string(), Value::Array(existing));
        }
        Some(other) => {
            payload.insert("aud".to_string(), other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn mapper(mapper_type: &str, config: Value) -> ProtocolMapper {
        ProtocolMapper {
            id: Uuid::nil(),
            realm_id: Uuid::nil(),
            scope_name: "profile".to_string(),
            mapper_type: mapper_type.to_string(),
            config,
        }
    }

    fn ctx<'a>(resource_access: &'a BTreeMap<String, Vec<String>>) -> MapperContext<'a> {
        MapperContext {
            user_id: "u1",
            username: "alice",
            email: Some("alice@example.com"),
            email_verified: true,
            first_name: Some("Ada"),
            last_name: Some("Lovelace"),
            realm_roles: &[],
            resource_access,
        }
    }

    #[test]
    fn unknown_mapper_type_is_silently_ignored() {
        let mappers = vec![mapper("some-future-mapper-type", json!({}))];
        let resource_access = BTreeMap::new();
        let mut payload = Map::new();
        execute(&mappers, &ctx(&resource_access), &mut payload);
        assert!(payload.is_empty());
    }

    #[test]
    fn hardcoded_claim_allows_empty_string() {
        let mappers = vec![mapper(
            "oidc-hardcoded-claim-mapper",
            json!({"claim.name": "tenant", "claim.value": ""}),
        )];
        let resource_access = BTreeMap::new();
        let mut payload = Map::new();
        execute(&mappers, &ctx(&resource_access), &mut payload);
        assert_eq!(payload.get("tenant").unwrap(), "");
    }

    #[test]
    fn audience_mapper_promotes_string_to_array() {
        let mut payload = Map::new();
        payload.insert("aud".to_string(), json!("client-a"));
        merge_audience(&mut payload, "client-b");
        assert_eq!(payload.get("aud").unwrap(), &json!(["client-a", "client-b"]));
    }

    #[test]
    fn audience_mapper_sets_string_when_absent() {
        let mut payload = Map::new();
        merge_audience(&mut payload, "client-a");
        assert_eq!(payload.get("aud").unwrap(), &json!("client-a"));
    }

    #[test]
    fn full_name_mapper_falls_back() {
        let mappers = vec![mapper("oidc-full-name-mapper", json!({}))];
        let resource_access = BTreeMap::new();
        let mut payload = Map::new();
        execute(&mappers, &ctx(&resource_access), &mut payload);
        assert_eq!(payload.get("name").unwrap(), "Ada Lovelace");
    }
}
