//! wardenio: multi-tenant OIDC/OAuth2 token engine.
//!
//! The grant pipeline, session and key stores, MFA engine, and identity
//! broker live here as a library so the HTTP layer in `main.rs` and the
//! integration tests can both drive them directly.

pub mod backchannel;
pub mod blacklist;
pub mod broker;
pub mod claims;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod grants;
pub mod jwt;
pub mod keystore;
pub mod lockout;
pub mod mappers;
pub mod mfa;
pub mod middleware;
pub mod models;
pub mod oidc;
pub mod password_policy;
pub mod routes;
pub mod scheduler;
pub mod scope;
pub mod services;
pub mod session;
pub mod state;
