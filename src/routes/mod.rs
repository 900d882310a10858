pub mod admin;
pub mod broker;
pub mod health;
pub mod oidc;
