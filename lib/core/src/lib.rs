//! Core foundations shared by the identity admin crates.
//!
//! Every crate in the workspace reports failures through the `Result` alias
//! defined here so errors from the identity provider keep their context as
//! they travel from the outbound HTTP call up to the request handler.

pub mod error;

pub use error::Result;
