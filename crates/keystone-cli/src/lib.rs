//! # keystone-cli
//!
//! Command-line interface for the keystone certificate authority.
//!
//! ## Commands
//!
//! - **init**: create (or load) the root CA and print a summary
//! - **sign**: issue a client certificate for each CSR file
//! - **list**: show archived certificates
//! - **ca**: print the CA certificate
//! - **config**: inspect the effective configuration

pub mod cli;

pub use cli::run;
