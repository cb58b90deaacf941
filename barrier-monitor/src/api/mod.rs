//! Read-only HTTP status API.
//!
//! Versioned routes live under `/api/v0`. The OpenAPI document is served at
//! `/api-docs/openapi.json` with Swagger UI at `/swagger-ui`.

pub mod server;
pub mod v0;

pub use server::{SharedState, bind, build_router, serve};
