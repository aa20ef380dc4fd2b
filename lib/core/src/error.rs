//! Error handling foundation for the identity admin API.
//!
//! Only the `Result` alias lives here. Each crate owns its domain error
//! enums and wraps them in a rootcause `Report` at the layer that talks to
//! the identity provider.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
///
/// `C` is the typed context at the top of the report, usually the domain
/// error enum of the operation that failed.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
