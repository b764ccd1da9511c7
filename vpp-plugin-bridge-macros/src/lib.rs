#![warn(
    missing_docs,
    missing_copy_implementations,
    missing_debug_implementations
)]

//! Macros for exporting VPP plugin bridge entry points
//!
//! This crate provides the procedural macros re-exported by `vpp_plugin_bridge`.

use std::collections::HashSet;

use proc_macro::TokenStream;
use quote::{format_ident, quote};

const DEFAULT_PREFIX: &str = "vpp_plugin";

struct ExportPlugin {
    processor: Option<syn::Type>,
    prefix: Option<syn::LitStr>,
}

impl syn::parse::Parse for ExportPlugin {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        const EXPECTED_KEYS: &[&str] = &["processor", "prefix"];

        let mut info = ExportPlugin {
            processor: None,
            prefix: None,
        };
        let mut seen_keys = HashSet::new();
        loop {
            if input.is_empty() {
                break;
            }
            let key: syn::Ident = input.parse()?;
            let key_str = key.to_string();

            if seen_keys.contains(&key_str) {
                return Err(syn::Error::new(
                    key.span(),
                    format!("Duplicated key \"{key_str}\". Keys can only be specified once."),
                ));
            }

            input.parse::<syn::Token![:]>()?;

            match key_str.as_str() {
                "processor" => info.processor = Some(input.parse()?),
                "prefix" => info.prefix = Some(input.parse()?),
                _ => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("Unknown key \"{key_str}\". Valid keys are: {EXPECTED_KEYS:?}."),
                    ))
                }
            }

            seen_keys.insert(key_str);

            if input.is_empty() {
                break;
            }
            input.parse::<syn::Token![,]>()?;
        }
        Ok(info)
    }
}

fn is_c_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

/// Export the C entry points of a plugin
///
/// Generates three `extern "C"` functions named after `prefix`, each instantiating the
/// `vpp_plugin_bridge::boundary` adapter for the given processor type:
///
/// - `<prefix>_init(const char *config_path, int *out_rc)`
/// - `<prefix>_process_batch(ctx, void **buffers, size_t n)`
/// - `<prefix>_shutdown(ctx)`
///
/// It also generates a `<PREFIX>_API` constant of type `vpp_plugin_bridge::abi::PluginApi`
/// pointing at the three functions.
///
/// Must only be done once per prefix per shared object, or linker errors will result.
///
/// # Attributes
///
/// - `processor`: (required, type) A type implementing `vpp_plugin_bridge::BufferProcessor`.
/// - `prefix`: (optional, string literal) Symbol prefix, which must be a valid C identifier.
///   Defaults to `"vpp_plugin"`.
///
/// # Examples
///
/// ```ignore
/// vpp_plugin_bridge::export_plugin! {
///     processor: MyProcessor,
///     prefix: "my_plugin",
/// }
/// ```
#[proc_macro]
pub fn export_plugin(ts: TokenStream) -> TokenStream {
    let ExportPlugin { processor, prefix } = syn::parse_macro_input!(ts as ExportPlugin);

    let Some(processor) = processor else {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "Missing required attribute \"processor\"",
        )
        .to_compile_error()
        .into();
    };
    let (prefix, span) = match &prefix {
        Some(prefix) => (prefix.value(), prefix.span()),
        None => (DEFAULT_PREFIX.to_string(), proc_macro2::Span::call_site()),
    };
    if !is_c_identifier(&prefix) {
        return syn::Error::new(
            span,
            format!("Prefix \"{prefix}\" is not a valid C identifier"),
        )
        .to_compile_error()
        .into();
    }

    let init = format_ident!("{}_init", prefix, span = span);
    let process_batch = format_ident!("{}_process_batch", prefix, span = span);
    let shutdown = format_ident!("{}_shutdown", prefix, span = span);
    let api = format_ident!("{}_API", prefix.to_uppercase(), span = span);

    let init_doc =
        format!("Creates a `{prefix}` plugin context, see `vpp_plugin_bridge::boundary::init`");
    let process_batch_doc = format!(
        "Processes a batch with a `{prefix}` plugin context, see `vpp_plugin_bridge::boundary::process_batch`"
    );
    let shutdown_doc = format!(
        "Destroys a `{prefix}` plugin context, see `vpp_plugin_bridge::boundary::shutdown`"
    );
    let api_doc = format!("Entry points of the `{prefix}` plugin");

    let output = quote!(
        #[doc = #init_doc]
        ///
        /// # Safety
        ///
        /// `config_path` must be null or a nul-terminated string, and `out_rc` must be null or
        /// point to a writable `int`.
        #[no_mangle]
        #[allow(clippy::undocumented_unsafe_blocks)]
        pub unsafe extern "C" fn #init(
            config_path: *const ::std::os::raw::c_char,
            out_rc: *mut ::std::os::raw::c_int,
        ) -> *mut ::vpp_plugin_bridge::abi::PluginHandle {
            unsafe {
                ::vpp_plugin_bridge::boundary::init::<#processor, _>(
                    config_path,
                    out_rc,
                    <#processor as ::vpp_plugin_bridge::BufferProcessor>::from_config,
                )
            }
        }

        #[doc = #process_batch_doc]
        ///
        /// # Safety
        ///
        /// `ctx` must be null or a live handle from the matching init, used by one thread at a
        /// time, and `buffers` must be null or point to `n` buffer pointers valid for the call.
        #[no_mangle]
        #[allow(clippy::undocumented_unsafe_blocks)]
        pub unsafe extern "C" fn #process_batch(
            ctx: *mut ::vpp_plugin_bridge::abi::PluginHandle,
            buffers: *mut *mut ::std::ffi::c_void,
            n: usize,
        ) -> ::std::os::raw::c_int {
            unsafe { ::vpp_plugin_bridge::boundary::process_batch::<#processor>(ctx, buffers, n) }
        }

        #[doc = #shutdown_doc]
        ///
        /// # Safety
        ///
        /// `ctx` must be null or a live handle from the matching init that is not in use, and
        /// must not be used again afterwards.
        #[no_mangle]
        #[allow(clippy::undocumented_unsafe_blocks)]
        pub unsafe extern "C" fn #shutdown(ctx: *mut ::vpp_plugin_bridge::abi::PluginHandle) {
            unsafe { ::vpp_plugin_bridge::boundary::shutdown::<#processor>(ctx) }
        }

        #[doc = #api_doc]
        pub const #api: ::vpp_plugin_bridge::abi::PluginApi = ::vpp_plugin_bridge::abi::PluginApi {
            init: #init,
            process_batch: #process_batch,
            shutdown: #shutdown,
        };
    );

    output.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_identifiers() {
        assert!(is_c_identifier("vpp_plugin"));
        assert!(is_c_identifier("_private2"));
        assert!(!is_c_identifier(""));
        assert!(!is_c_identifier("2fast"));
        assert!(!is_c_identifier("edge-counter"));
    }

    #[test]
    fn parse_keys() {
        let parsed: ExportPlugin =
            syn::parse_str(r#"processor: crate::plugin::Counter, prefix: "edge""#).unwrap();
        assert!(parsed.processor.is_some());
        assert_eq!(parsed.prefix.map(|p| p.value()).as_deref(), Some("edge"));

        let parsed: ExportPlugin = syn::parse_str("processor: Counter,").unwrap();
        assert!(parsed.prefix.is_none());

        assert!(syn::parse_str::<ExportPlugin>("processor: A, processor: B").is_err());
        assert!(syn::parse_str::<ExportPlugin>("version: \"1.0\"").is_err());
    }
}
