use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse_macro_input, Data, DeriveInput, ImplItem, ImplItemFn, ItemImpl, ReturnType, Stmt,
    Type, Variant, Visibility,
};

/// Procedural macro that turns an enum into a catalog-migrator error type
///
/// This macro automatically:
/// 1. Adds `#[derive(Debug, thiserror::Error, uniffi::Error)]` and `#[uniffi(flat_error)]`
/// 2. Adds a `Generic { message: String }` variant if not already present
/// 3. Implements `From<anyhow::Error>` for the error type, keeping the context chain
/// 4. Provides helper methods for converting `anyhow::Result`s
///
/// Only one annotated enum may live in a given module, since the expansion brings
/// `anyhow::Context` into scope.
///
/// # Usage
///
/// ```rust,ignore
/// #[migrator_error]
/// pub enum MappingError {
///     #[error("mapping file is corrupt: {message}")]
///     CorruptState { message: String },
/// }
/// ```
#[proc_macro_attribute]
pub fn migrator_error(_args: TokenStream, input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let expanded = match &input.data {
        Data::Enum(data_enum) => {
            let enum_name = &input.ident;
            let visibility = &input.vis;

            // Existing derive/uniffi attributes would clash with the ones added below
            let attrs: Vec<_> = input
                .attrs
                .iter()
                .filter(|attr| {
                    !(attr.path().is_ident("derive") || attr.path().is_ident("uniffi"))
                })
                .collect();

            let generics = &input.generics;

            let has_generic = data_enum
                .variants
                .iter()
                .any(|variant| variant.ident == "Generic");

            let mut variants = data_enum.variants.clone();

            if !has_generic {
                let generic_variant: Variant = syn::parse_quote! {
                    /// A generic error that can wrap any anyhow error.
                    #[error("Generic error: {message}")]
                    Generic {
                        /// The error message from the wrapped error.
                        message: String
                    }
                };
                variants.push(generic_variant);
            }

            quote! {
                #[allow(unused_imports)]
                use anyhow::Context;

                #[derive(Debug, thiserror::Error, uniffi::Error)]
                #[uniffi(flat_error)]
                #(#attrs)*
                #visibility enum #enum_name #generics {
                    #variants
                }

                impl #generics From<anyhow::Error> for #enum_name #generics {
                    fn from(err: anyhow::Error) -> Self {
                        Self::Generic {
                            message: {
                                let mut message = err.to_string();

                                let chain: Vec<String> = err.chain().skip(1).map(|e| e.to_string()).collect();
                                if !chain.is_empty() {
                                    message.push_str(" (caused by: ");
                                    message.push_str(&chain.join(" -> "));
                                    message.push(')');
                                }

                                message
                            }
                        }
                    }
                }

                impl #generics #enum_name #generics {
                    /// Convert an anyhow::Result to a Result with this error type
                    #[allow(dead_code)]
                    pub fn from_anyhow_result<T>(result: anyhow::Result<T>) -> Result<T, Self> {
                        result.map_err(Self::from)
                    }

                    /// Convert an anyhow::Result to a Result with this error type, adding a prefix
                    #[allow(dead_code)]
                    pub fn from_anyhow_result_with_prefix<T>(
                        result: anyhow::Result<T>,
                        prefix: &str
                    ) -> Result<T, Self> {
                        result.map_err(|err| Self::Generic {
                            message: {
                                let mut message = err.to_string();

                                let chain: Vec<String> = err.chain().skip(1).map(|e| e.to_string()).collect();
                                if !chain.is_empty() {
                                    message.push_str(" (caused by: ");
                                    message.push_str(&chain.join(" -> "));
                                    message.push(')');
                                }

                                format!("{}: {}", prefix, message)
                            }
                        })
                    }
                }
            }
        }
        _ => {
            return syn::Error::new_spanned(
                &input,
                "migrator_error can only be applied to enums",
            )
            .to_compile_error()
            .into();
        }
    };

    TokenStream::from(expanded)
}

/// Procedural macro that wraps `uniffi::export` and automatically injects logging context
///
/// This macro automatically:
/// 1. Forwards the attribute to `#[uniffi::export]`
/// 2. Injects `let _migrator_log_ctx = crate::primitives::logger::LogContext::new("TypeName");`
///    at the start of every synchronous `pub fn`
/// 3. Runs the body of every `pub async fn` inside
///    `crate::primitives::logger::with_log_context`, so the context is entered on each poll
///    instead of being held on the thread across `.await` points
/// 4. Adds `async_runtime = "tokio"` if any public function is async
///
/// # Usage
///
/// ```rust,ignore
/// #[migrator_export]
/// impl MigrationEngine {
///     pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
///         // log lines in here are prefixed with [MigrationEngine]
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn migrator_export(args: TokenStream, input: TokenStream) -> TokenStream {
    let input_impl = parse_macro_input!(input as ItemImpl);

    let type_name = match &*input_impl.self_ty {
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map_or_else(|| "Unknown".to_string(), |segment| segment.ident.to_string()),
        _ => "Unknown".to_string(),
    };

    let has_async_functions = has_async_functions_in_impl(&input_impl.items);

    let new_items = input_impl
        .items
        .iter()
        .map(|item| match item {
            ImplItem::Fn(method) if matches!(method.vis, Visibility::Public(_)) => {
                let mut new_method = method.clone();
                inject_logging_context(&mut new_method, &type_name);
                ImplItem::Fn(new_method)
            }
            _ => item.clone(),
        })
        .collect();

    let new_impl = ItemImpl {
        items: new_items,
        ..input_impl
    };

    let mut args = proc_macro2::TokenStream::from(args);

    if has_async_functions {
        if args.is_empty() {
            args = quote! { async_runtime = "tokio" };
        } else {
            args = quote! { #args, async_runtime = "tokio" };
        }
    }

    quote! {
        #[uniffi::export(#args)]
        #new_impl
    }
    .into()
}

/// Check if any public functions in the impl items are async
fn has_async_functions_in_impl(impl_items: &[ImplItem]) -> bool {
    impl_items.iter().any(|item| {
        if let ImplItem::Fn(method) = item {
            matches!(method.vis, Visibility::Public(_))
                && method.sig.asyncness.is_some()
        } else {
            false
        }
    })
}

/// Inject logging context into a function body
fn inject_logging_context(method: &mut ImplItemFn, type_name: &str) {
    if method.sig.asyncness.is_some() {
        let output: Type = match &method.sig.output {
            ReturnType::Default => syn::parse_quote! { () },
            ReturnType::Type(_, ty) => (**ty).clone(),
        };
        let block = &method.block;
        method.block = syn::parse_quote! {
            {
                crate::primitives::logger::with_log_context::<#output, _>(
                    #type_name,
                    async move #block,
                )
                .await
            }
        };
        return;
    }

    let context_stmt: Stmt = syn::parse_quote! {
        let _migrator_log_ctx = crate::primitives::logger::LogContext::new(#type_name);
    };

    method.block.stmts.insert(0, context_stmt);
}
