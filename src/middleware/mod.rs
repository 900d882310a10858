pub mod admin_api_key;
pub mod bearer_auth;
