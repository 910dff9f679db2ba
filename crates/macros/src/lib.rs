//! # alloy-macros
//!
//! Service annotation attributes for the alloy dependency-injection
//! compiler:
//! - `#[injectable(...)]`: mark a struct as a transient service (scope
//!   and dependencies via arguments)
//! - `#[singleton(...)]`: mark a struct as a singleton service
//!
//! Both attributes are inert: the annotations are consumed syntactically
//! by the build-time scanner, and the macros exist so annotated sources
//! compile unchanged.

use proc_macro::TokenStream;

mod annotations;

/// Mark a struct as an injectable service.
///
/// ```ignore
/// #[injectable(deps(Database, Mailer))]
/// pub struct Onboarding { /* ... */ }
/// ```
#[proc_macro_attribute]
pub fn injectable(args: TokenStream, input: TokenStream) -> TokenStream {
    annotations::passthrough(args, input)
}

/// Mark a struct as a singleton service.
///
/// ```ignore
/// #[singleton(deps(Config))]
/// pub struct Database { /* ... */ }
/// ```
#[proc_macro_attribute]
pub fn singleton(args: TokenStream, input: TokenStream) -> TokenStream {
    annotations::passthrough(args, input)
}
