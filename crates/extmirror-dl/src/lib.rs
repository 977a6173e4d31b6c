pub mod error;
pub mod http;
pub mod http_client;
pub mod pool;
