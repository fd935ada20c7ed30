//! chorus-gateway: HTTP front end for chorus
//!
//! Exposes single-model and broadcast chat over JSON, plus model listing
//! and session inspection, on top of the chorus-core orchestrator.

pub mod protocol;
pub mod server;

pub use server::GatewayServer;
