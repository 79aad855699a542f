use glob::glob;
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use syn::{LitStr, parse_macro_input};

pub fn template_assets_impl(input: TokenStream) -> TokenStream {
    let pattern = parse_macro_input!(input as LitStr);
    let pattern_str = pattern.value();

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => dir,
        Err(_) => {
            return syn::Error::new(pattern.span(), "CARGO_MANIFEST_DIR is not set")
                .to_compile_error()
                .into();
        }
    };
    let full_pattern = PathBuf::from(manifest_dir).join(&pattern_str);
    let full_pattern_str = full_pattern.to_string_lossy();

    let mut files: Vec<String> = match glob(&full_pattern_str) {
        Ok(paths) => paths
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .map(|path| path.to_string_lossy().to_string())
            .collect(),
        Err(e) => {
            return syn::Error::new(pattern.span(), format!("Invalid glob pattern: {}", e))
                .to_compile_error()
                .into();
        }
    };
    // Stable registration order across platforms.
    files.sort();

    // `include_str!` also makes cargo rebuild when a group file changes.
    let assets: Vec<_> = files
        .iter()
        .map(|f| {
            quote! {
                (#f, include_str!(#f))
            }
        })
        .collect();

    // One registration function per pattern, so several invocations can share a module.
    let mut hasher = DefaultHasher::new();
    pattern_str.hash(&mut hasher);
    let fn_name = format_ident!("__ustl_auto_register_templates_{}", hasher.finish());

    let output = quote! {
        #[ustl::ctor::ctor]
        fn #fn_name() {
            let assets: ::std::vec::Vec<(&str, &str)> = vec![
                #(#assets),*
            ];
            // Failures are logged by the loader.
            let _ = ustl::group_loader::load_assets(assets);
        }
    };

    output.into()
}
