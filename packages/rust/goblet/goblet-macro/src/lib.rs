//! Procedural macros for the goblet crate.
//!
//! **Note**: This is a proc-macro implementation crate for [goblet](https://crates.io/crates/goblet)
//! and is not meant to be used directly. Please use the main crate instead.
//!
//! The macros in this crate are re-exported by the main crate, and using them directly
//! may lead to version conflicts or other issues. Additionally, this crate's API is not
//! guaranteed to be stable between minor versions.
//!
//! # Usage
//!
//! Instead of using this crate directly, use the main crate:
//!
//! ```toml
//! [dependencies]
//! goblet = "0.3"
//! ```

use darling::{ast::NestedMeta, Error, FromMeta};
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use std::collections::HashMap;
use syn::spanned::Spanned;
use syn::ItemFn;

#[derive(Debug, FromMeta)]
struct RouteArgs {
    path: String,
    #[darling(default = "default_method")]
    method: String,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, FromMeta)]
struct TopicArgs {
    name: String,
    #[darling(default)]
    attributes: HashMap<String, String>,
}

#[derive(Debug, FromMeta)]
struct ScheduleArgs {
    schedule: String,
    #[darling(default)]
    name: Option<String>,
    #[darling(default)]
    timezone: Option<String>,
    #[darling(default)]
    description: Option<String>,
}

/// Registers an HTTP route handler.
///
/// # Arguments
///
/// * `path` - The URL path to match (required). Supports `{param}` and greedy `{param+}` segments
/// * `method` - The HTTP method to match (optional, defaults to "GET")
///
/// # Function Signature
///
/// The handler must be an `async fn` with exactly one parameter of type `RequestContext`,
/// returning `Result<R, E>` where `R: IntoResponse` and `E: Into<goblet::Error>`:
///
/// ```rust,ignore
/// #[route(path = "/users/{id}", method = "POST")]
/// async fn create_user(ctx: RequestContext) -> Result<Value, Error> {
///     Ok(json!({ "created": ctx.get_param("id") }))
/// }
/// ```
#[proc_macro_attribute]
pub fn route(args: TokenStream, input: TokenStream) -> TokenStream {
    let attr_args = match NestedMeta::parse_meta_list(args.into()) {
        Ok(v) => v,
        Err(e) => {
            return TokenStream::from(Error::from(e).write_errors());
        }
    };
    let input = syn::parse_macro_input!(input as ItemFn);

    let output: TokenStream = impl_route(attr_args, input).into();
    output
}

/// Registers a Pub/Sub topic handler.
///
/// The decoded message data is available as `ctx.data`. With `attributes`, the
/// handler only runs for messages carrying every listed attribute.
///
/// ```rust,ignore
/// #[topic(name = "orders", attributes(env = "prod"))]
/// async fn on_order(ctx: RequestContext) -> Result<(), Error> {
///     tracing::info!(data = ?ctx.data, "order received");
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn topic(args: TokenStream, input: TokenStream) -> TokenStream {
    let attr_args = match NestedMeta::parse_meta_list(args.into()) {
        Ok(v) => v,
        Err(e) => {
            return TokenStream::from(Error::from(e).write_errors());
        }
    };
    let input = syn::parse_macro_input!(input as ItemFn);

    impl_topic(attr_args, input).into()
}

/// Registers a Cloud Scheduler job handler.
///
/// `name` defaults to the function name and `timezone` to `UTC`.
///
/// ```rust,ignore
/// #[schedule(schedule = "0 3 * * *", description = "nightly cleanup")]
/// async fn cleanup(_ctx: RequestContext) -> Result<(), Error> {
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn schedule(args: TokenStream, input: TokenStream) -> TokenStream {
    let attr_args = match NestedMeta::parse_meta_list(args.into()) {
        Ok(v) => v,
        Err(e) => {
            return TokenStream::from(Error::from(e).write_errors());
        }
    };
    let input = syn::parse_macro_input!(input as ItemFn);

    impl_schedule(attr_args, input).into()
}

/// Registers the catch-all HTTP function, used for requests no route matches.
#[proc_macro_attribute]
pub fn http_handler(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[http_handler] takes no arguments",
        )
        .to_compile_error()
        .into();
    }
    let input = syn::parse_macro_input!(input as ItemFn);

    if let Err(e) = validate_signature(&input) {
        return e.to_compile_error().into();
    }
    let fn_name = &input.sig.ident;
    let register_fn = format_ident!("__goblet_register_http_{}", fn_name);
    let handler = boxed_handler(&input);

    quote! {
        #[::goblet::ctor::ctor]
        fn #register_fn() {
            ::goblet::register(::goblet::Registration::http(#handler));
        }

        #input
    }
    .into()
}

fn impl_route(args: Vec<NestedMeta>, input: ItemFn) -> proc_macro2::TokenStream {
    let route_args = match RouteArgs::from_list(&args) {
        Ok(v) => v,
        Err(e) => {
            return e.write_errors();
        }
    };
    if let Err(e) = validate_signature(&input) {
        return e.to_compile_error();
    }

    let fn_name = &input.sig.ident;
    let method = route_args.method.to_uppercase();
    let path = &route_args.path;
    let register_fn = format_ident!("__goblet_register_route_{}", fn_name);
    let handler = boxed_handler(&input);

    quote! {
        #[::goblet::ctor::ctor]
        fn #register_fn() {
            ::goblet::register(::goblet::Registration::route(#method, #path, #handler));
        }

        #input
    }
}

fn impl_topic(args: Vec<NestedMeta>, input: ItemFn) -> proc_macro2::TokenStream {
    let topic_args = match TopicArgs::from_list(&args) {
        Ok(v) => v,
        Err(e) => {
            return e.write_errors();
        }
    };
    if let Err(e) = validate_signature(&input) {
        return e.to_compile_error();
    }

    let fn_name = &input.sig.ident;
    let topic = &topic_args.name;
    let register_fn = format_ident!("__goblet_register_topic_{}", fn_name);
    let handler = boxed_handler(&input);

    let mut attributes: Vec<_> = topic_args.attributes.into_iter().collect();
    attributes.sort();
    let attributes = attributes
        .iter()
        .map(|(key, value)| quote! { (#key, #value) });

    quote! {
        #[::goblet::ctor::ctor]
        fn #register_fn() {
            ::goblet::register(::goblet::Registration::topic(
                #topic,
                &[#(#attributes),*],
                #handler,
            ));
        }

        #input
    }
}

fn impl_schedule(args: Vec<NestedMeta>, input: ItemFn) -> proc_macro2::TokenStream {
    let schedule_args = match ScheduleArgs::from_list(&args) {
        Ok(v) => v,
        Err(e) => {
            return e.write_errors();
        }
    };
    if let Err(e) = validate_signature(&input) {
        return e.to_compile_error();
    }

    let fn_name = &input.sig.ident;
    let schedule = &schedule_args.schedule;
    let name = optional_str(schedule_args.name.as_deref());
    let timezone = optional_str(schedule_args.timezone.as_deref());
    let description = optional_str(schedule_args.description.as_deref());
    let register_fn = format_ident!("__goblet_register_schedule_{}", fn_name);
    let handler = boxed_handler(&input);

    quote! {
        #[::goblet::ctor::ctor]
        fn #register_fn() {
            ::goblet::register(::goblet::Registration::schedule(
                #name,
                #schedule,
                #timezone,
                #description,
                #handler,
            ));
        }

        #input
    }
}

fn optional_str(value: Option<&str>) -> proc_macro2::TokenStream {
    match value {
        Some(value) => quote! { ::core::option::Option::Some(#value) },
        None => quote! { ::core::option::Option::None },
    }
}

fn boxed_handler(input: &ItemFn) -> proc_macro2::TokenStream {
    let fn_name = &input.sig.ident;
    quote! {
        |ctx| ::std::boxed::Box::pin(async move {
            ::goblet::__private::into_handler_result(#fn_name(ctx).await)
        }) as ::goblet::HandlerFuture
    }
}

fn validate_signature(input: &ItemFn) -> Result<(), syn::Error> {
    if input.sig.asyncness.is_none() {
        return Err(syn::Error::new(
            input.sig.fn_token.span(),
            "Handler must be an async fn",
        ));
    }

    if input.sig.inputs.len() != 1 {
        return Err(syn::Error::new(
            input.sig.span(),
            "Handler must have exactly one parameter of type RequestContext",
        ));
    }

    match input.sig.inputs.first() {
        Some(syn::FnArg::Typed(pat_type)) => match &*pat_type.ty {
            syn::Type::Path(type_path)
                if type_path
                    .path
                    .segments
                    .last()
                    .is_some_and(|segment| segment.ident == "RequestContext") =>
            {
                Ok(())
            }
            other => Err(syn::Error::new(
                other.span(),
                "Parameter must be of type RequestContext",
            )),
        },
        Some(param) => Err(syn::Error::new(
            param.span(),
            "Invalid parameter declaration",
        )),
        None => Err(syn::Error::new(
            input.sig.span(),
            "Handler must have exactly one parameter of type RequestContext",
        )),
    }
}
