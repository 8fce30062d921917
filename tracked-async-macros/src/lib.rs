//! Procedural macros for tracked-async
//!
//! - `#[tracked_async::test]` runs an async test on Tokio, injects a fresh
//!   `Registry`, and fails the test if operations are still pending when
//!   the body returns.
//! - `#[tracked_async::instrument]` turns an inherent `impl` block into a
//!   `Tracked{Type}` trait implemented for `Instrumented<Type>`.
//!
//! # Example
//!
//! ```rust,ignore
//! use tracked_async::prelude::*;
//!
//! #[tracked_async::test]
//! async fn my_test(registry: Registry) {
//!     let db = registry.wrap(Database::default());
//!     db.create_item("Glazed".into()).await;
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input, FnArg, Ident, ImplItem, ImplItemFn, ItemFn, ItemImpl, Lit, Pat, ReturnType,
    Token, Type,
};

/// Configuration options for the test macro.
#[derive(Default)]
struct TestConfig {
    /// Flavor for tokio runtime ("current_thread" or "multi_thread")
    flavor: Option<String>,
    /// Default quiescence timeout for the injected registry
    timeout_ms: Option<u64>,
    /// Skip the end-of-test pending check when false (default: true)
    leak_check: Option<bool>,
    /// Capture backtraces for every tracked operation
    backtrace: bool,
}

impl Parse for TestConfig {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut config = TestConfig::default();

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            let lit: Lit = input.parse()?;

            match (ident.to_string().as_str(), lit) {
                ("flavor", Lit::Str(s)) => config.flavor = Some(s.value()),
                ("timeout_ms", Lit::Int(i)) => config.timeout_ms = Some(i.base10_parse()?),
                ("leak_check", Lit::Bool(b)) => config.leak_check = Some(b.value()),
                ("backtrace", Lit::Bool(b)) => config.backtrace = b.value(),
                ("flavor" | "timeout_ms" | "leak_check" | "backtrace", lit) => {
                    return Err(syn::Error::new(
                        lit.span(),
                        format!("unexpected value for `{ident}`"),
                    ));
                }
                _ => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unknown attribute: {ident}"),
                    ));
                }
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(config)
    }
}

/// Determines if a function parameter is requesting a Registry.
fn is_registry_param(arg: &FnArg) -> bool {
    if let FnArg::Typed(pat_type) = arg {
        if let Type::Path(type_path) = &*pat_type.ty {
            if let Some(segment) = type_path.path.segments.last() {
                return segment.ident == "Registry";
            }
        }
    }
    false
}

/// Extracts the parameter name from a function argument.
fn get_param_name(arg: &FnArg) -> Option<&Pat> {
    if let FnArg::Typed(pat_type) = arg {
        Some(&pat_type.pat)
    } else {
        None
    }
}

/// Test attribute macro for async tests with operation tracking.
///
/// Add a `registry: Registry` parameter to receive a fresh registry. When
/// the body returns, the test fails if that registry still has pending
/// operations, listing each one.
///
/// # Configuration Options
///
/// - `flavor = "multi_thread"` - Tokio runtime flavor
/// - `timeout_ms = 200` - default timeout for `wait_for_quiescence`
/// - `leak_check = false` - skip the end-of-test check
/// - `backtrace = true` - capture a cleaned backtrace per operation
///
/// ```rust,ignore
/// #[tracked_async::test(timeout_ms = 50, flavor = "multi_thread")]
/// async fn test_waits(registry: Registry) {
///     registry.wait_for_quiescence().await.unwrap();
/// }
/// ```
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = parse_macro_input!(attr as TestConfig);
    let input = parse_macro_input!(item as ItemFn);

    expand_test(config, input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_test(config: TestConfig, input: ItemFn) -> syn::Result<TokenStream2> {
    let name = &input.sig.ident;
    let body = &input.block;
    let attrs = &input.attrs;
    let vis = &input.vis;

    if input.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            &input.sig,
            "test function must be async",
        ));
    }

    if let Some(extra) = input.sig.inputs.iter().find(|arg| !is_registry_param(arg)) {
        return Err(syn::Error::new_spanned(
            extra,
            "only a `Registry` parameter can be injected",
        ));
    }

    let ret_ty = match &input.sig.output {
        ReturnType::Default => quote! { () },
        ReturnType::Type(_, ty) => quote! { #ty },
    };
    let ret_sig = &input.sig.output;

    let registry_name = input.sig.inputs.iter().find_map(get_param_name);

    let flavor_attr = match config.flavor.as_deref().unwrap_or("current_thread") {
        "multi_thread" => quote! { #[::tokio::test(flavor = "multi_thread")] },
        "current_thread" => quote! { #[::tokio::test] },
        other => {
            return Err(syn::Error::new(
                proc_macro2::Span::call_site(),
                format!("unsupported flavor: {other}. Use \"current_thread\" or \"multi_thread\""),
            ));
        }
    };

    let Some(registry_name) = registry_name else {
        return Ok(quote! {
            #flavor_attr
            #(#attrs)*
            #vis async fn #name() #ret_sig #body
        });
    };

    let timeout = config.timeout_ms.map(|ms| {
        quote! { .default_timeout(::std::time::Duration::from_millis(#ms)) }
    });
    let backtrace = config.backtrace.then(|| quote! { .capture_backtrace() });

    let leak_check = if config.leak_check.unwrap_or(true) {
        let test_name = name.to_string();
        quote! {
            ::tracked_async::assert_quiescent!(
                __tracked_async_registry,
                "at the end of test `{}`",
                #test_name
            );
        }
    } else {
        quote! {
            let _ = __tracked_async_registry;
        }
    };

    Ok(quote! {
        #flavor_attr
        #(#attrs)*
        #vis async fn #name() #ret_sig {
            let #registry_name = ::tracked_async::Registry::with_config(
                ::tracked_async::TrackerConfig::from_env() #timeout #backtrace
            );
            let __tracked_async_registry = ::std::clone::Clone::clone(&#registry_name);
            let __tracked_async_result: #ret_ty = async move #body.await;
            #leak_check
            __tracked_async_result
        }
    })
}

/// Options for the instrument macro.
#[derive(Default)]
struct InstrumentConfig {
    /// Name of the generated trait (default: `Tracked{Type}`)
    name: Option<Ident>,
}

impl Parse for InstrumentConfig {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut config = InstrumentConfig::default();

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            match ident.to_string().as_str() {
                "name" => {
                    let lit: Lit = input.parse()?;
                    if let Lit::Str(s) = lit {
                        config.name = Some(s.parse()?);
                    }
                }
                _ => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unknown attribute: {ident}"),
                    ));
                }
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(config)
    }
}

/// Generates a tracked facade for the methods of an inherent `impl` block.
///
/// For `impl Database`, this emits the block unchanged plus a
/// `TrackedDatabase` trait implemented for `Instrumented<Database>`:
///
/// - every `async fn(&self, ..)` becomes a method returning
///   `TrackedOperation<Output>`, described as `Database.name(args..)`;
/// - every plain `fn(&self, ..)` passes straight through.
///
/// Methods without a `&self` receiver are left out. Arguments of async
/// methods must be owned (`'static`) and implement `Debug`, since they are
/// moved into the tracked future and rendered into its description.
///
/// ```rust,ignore
/// #[tracked_async::instrument]
/// impl Database {
///     pub async fn create_item(&self, item: String) { /* ... */ }
///     pub fn len(&self) -> usize { /* ... */ }
/// }
///
/// let db = registry.wrap(Database::default());
/// let op: TrackedOperation<()> = db.create_item("Glazed".into());
/// ```
#[proc_macro_attribute]
pub fn instrument(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = parse_macro_input!(attr as InstrumentConfig);
    let input = parse_macro_input!(item as ItemImpl);

    expand_instrument(config, input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_instrument(config: InstrumentConfig, input: ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &input.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "instrument expects an inherent impl block, not a trait impl",
        ));
    }
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "instrument does not support generic impl blocks",
        ));
    }

    let self_ty = &input.self_ty;
    let trait_name = match config.name {
        Some(name) => name,
        None => {
            let Type::Path(type_path) = &**self_ty else {
                return Err(syn::Error::new_spanned(
                    self_ty,
                    "cannot derive a trait name, pass `name = \"...\"`",
                ));
            };
            let Some(segment) = type_path.path.segments.last() else {
                return Err(syn::Error::new_spanned(self_ty, "empty type path"));
            };
            format_ident!("Tracked{}", segment.ident)
        }
    };

    let mut declarations = Vec::new();
    let mut definitions = Vec::new();
    for item in &input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        if !has_shared_receiver(method) {
            continue;
        }
        let (declaration, definition) = expand_method(method)?;
        declarations.push(declaration);
        definitions.push(definition);
    }

    let doc = format!("Tracked calls on an instrumented `{}`.", quote!(#self_ty));

    Ok(quote! {
        #input

        #[doc = #doc]
        pub trait #trait_name {
            #(#declarations)*
        }

        impl #trait_name for ::tracked_async::Instrumented<#self_ty> {
            #(#definitions)*
        }
    })
}

/// Returns true for methods taking `&self`.
fn has_shared_receiver(method: &ImplItemFn) -> bool {
    match method.sig.inputs.first() {
        Some(FnArg::Receiver(receiver)) => {
            receiver.reference.is_some() && receiver.mutability.is_none()
        }
        _ => false,
    }
}

fn expand_method(method: &ImplItemFn) -> syn::Result<(TokenStream2, TokenStream2)> {
    let sig = &method.sig;
    let name = &sig.ident;

    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "instrumented methods cannot be generic",
        ));
    }

    let mut arg_names = Vec::new();
    let mut arg_types = Vec::new();
    for (i, arg) in sig.inputs.iter().skip(1).enumerate() {
        let FnArg::Typed(pat_type) = arg else {
            return Err(syn::Error::new_spanned(arg, "unexpected receiver"));
        };
        arg_names.push(format_ident!("__arg{}", i));
        arg_types.push(&pat_type.ty);
    }

    let params = quote! { &self #(, #arg_names: #arg_types)* };
    let op_name = name.to_string();

    if sig.asyncness.is_some() {
        let output = match &sig.output {
            ReturnType::Default => quote! { () },
            ReturnType::Type(_, ty) => quote! { #ty },
        };
        let ret = quote! { ::tracked_async::TrackedOperation<#output> };
        let doc = format!("Tracked `{op_name}`.");

        let declaration = quote! {
            #[doc = #doc]
            fn #name(#params) -> #ret;
        };
        let definition = quote! {
            #[track_caller]
            fn #name(#params) -> #ret {
                let __target = self.target_arc();
                let __max_len = self.registry().config().max_arg_len;
                let __args = ::std::vec![
                    #(::tracked_async::render_arg(&#arg_names, __max_len)),*
                ];
                self.track(#op_name, __args, async move {
                    __target.#name(#(#arg_names),*).await
                })
            }
        };
        Ok((declaration, definition))
    } else {
        let ret = &sig.output;
        let doc = format!("Untracked pass-through to `{op_name}`.");

        let declaration = quote! {
            #[doc = #doc]
            fn #name(#params) #ret;
        };
        let definition = quote! {
            fn #name(#params) #ret {
                self.target().#name(#(#arg_names),*)
            }
        };
        Ok((declaration, definition))
    }
}
