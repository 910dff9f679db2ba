use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Item};

/// Shared pass-through for both annotation attributes.
///
/// The annotations carry no runtime behavior: the build-time scanner
/// reads them straight out of the source text, so the macro only has to
/// keep the item compiling with the attribute attached. Argument shapes
/// are deliberately not validated here — a shape the scanner does not
/// recognize simply leaves the type undiscovered, and rejecting it at
/// macro level would turn that into a hard error.
pub fn passthrough(_args: TokenStream, input: TokenStream) -> TokenStream {
    let item = parse_macro_input!(input as Item);
    quote!(#item).into()
}
