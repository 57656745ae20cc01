// Middleware for outbound API calls
//
// Health-tracked key rotation for providers that accept several API keys

pub mod api_key_pool;

pub use api_key_pool::{ApiKeyPool, KeyHealth};
