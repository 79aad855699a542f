mod assets;
mod model;

use proc_macro::TokenStream;

/// Embeds every XML group file matching a glob (relative to the crate root)
/// and registers the groups in `ustl::group::G` before `main` runs.
///
/// ```ignore
/// ustl::template_assets!("resources/templates/**/*.xml");
/// ```
#[proc_macro]
pub fn template_assets(input: TokenStream) -> TokenStream {
    assets::template_assets_impl(input)
}

/// Implements `ustl::Model` and `ustl::ToValue` for a struct with named
/// fields.
///
/// Every field becomes a property unless marked `#[model(ignore)]`;
/// `#[model(rename = "x")]` changes its name. Computed properties are
/// declared on the struct: `#[model(get(full_name), is(admin))]` exposes
/// `self.full_name()` as `full_name` and `self.is_admin()` as `admin`.
/// Getters win over predicates, which win over fields.
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    model::derive_model_impl(input)
}
