pub mod auth;
pub mod server;
pub mod tokens;
