use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::spanned::Spanned;
use syn::{parse_macro_input, FnArg, ItemFn};

/// Maximum number of word-sized arguments the syscall ABI carries.
const MAX_SYSCALL_ARGS: usize = 3;

/// System call handler procedural macro
///
/// Transforms a typed handler into a table-compatible system call entry:
/// 1. Original function preservation
/// 2. Wrapper generation for ABI compatibility
///
/// The handler's first parameter is the dispatch context and is passed through
/// untouched. Every following parameter is decoded from one raw argument word
/// through `TryFrom<usize>`, so only integer types are accepted. A word that
/// does not fit the declared type answers `EINVAL` without reaching the
/// handler.
///
/// ```ignore
/// #[syscall_handler]
/// pub fn sys_kill(ctx: &SyscallContext<'_>, pid: usize, signal: u32) -> SyscallResult {
///     ...
/// }
/// // generates
/// pub fn sys_kill_wrapper(ctx: &SyscallContext<'_>, a1: usize, a2: usize, a3: usize) -> isize
/// ```
///
/// The return value is converted with `crate::syscall::IntoSyscallReturn`, so
/// handlers may return a bare integer, `()` or `Result<_, Errno>`.
#[proc_macro_attribute]
pub fn syscall_handler(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[syscall_handler] takes no arguments; bind the number in the syscall list",
        )
        .to_compile_error()
        .into();
    }

    let input_fn = parse_macro_input!(item as ItemFn);
    let fn_name = &input_fn.sig.ident;
    let vis = &input_fn.vis;

    let mut inputs = input_fn.sig.inputs.iter();

    // The dispatch context always comes first
    let ctx_ty = match inputs.next() {
        Some(FnArg::Typed(pat)) => &pat.ty,
        Some(FnArg::Receiver(receiver)) => {
            return syn::Error::new(
                receiver.span(),
                "receiver arguments not supported in syscall handlers",
            )
            .to_compile_error()
            .into();
        }
        None => {
            return syn::Error::new(
                input_fn.sig.span(),
                "syscall handlers take the dispatch context as first argument",
            )
            .to_compile_error()
            .into();
        }
    };

    // Extract parameter information (index, type)
    let mut params = Vec::new();
    for (i, arg) in inputs.enumerate() {
        match arg {
            FnArg::Typed(pat) => {
                if i >= MAX_SYSCALL_ARGS {
                    return syn::Error::new(
                        pat.span(),
                        "syscall handlers take at most three word-sized arguments",
                    )
                    .to_compile_error()
                    .into();
                }
                params.push((i, &pat.ty));
            }
            FnArg::Receiver(receiver) => {
                return syn::Error::new(
                    receiver.span(),
                    "receiver arguments not supported in syscall handlers",
                )
                .to_compile_error()
                .into();
            }
        }
    }

    let raw_args: Vec<_> = (1..=MAX_SYSCALL_ARGS)
        .map(|i| format_ident!("__arg{}", i))
        .collect();

    // Generate argument conversion code for wrapper
    let arg_conversions = params.iter().map(|(i, arg_type)| {
        let raw = &raw_args[*i];
        let binding = format_ident!("__param{}", i);
        quote! {
            let #binding: #arg_type =
                match <#arg_type as ::core::convert::TryFrom<usize>>::try_from(#raw) {
                    Ok(value) => value,
                    Err(_) => return crate::syscall::Errno::EINVAL.to_neg(),
                };
        }
    });

    // Collect argument names for function call
    let arg_names = params
        .iter()
        .map(|(i, _)| format_ident!("__param{}", i));

    let wrapper_name = format_ident!("{}_wrapper", fn_name);
    let raw_a1 = &raw_args[0];
    let raw_a2 = &raw_args[1];
    let raw_a3 = &raw_args[2];

    let expanded = quote! {
        #input_fn

        #[doc(hidden)]
        #[inline(never)]
        #[allow(unreachable_patterns, clippy::unnecessary_fallible_conversions)]
        #vis fn #wrapper_name(
            __ctx: #ctx_ty,
            #raw_a1: usize,
            #raw_a2: usize,
            #raw_a3: usize,
        ) -> isize {
            let _ = (#raw_a1, #raw_a2, #raw_a3);
            #(#arg_conversions)*
            crate::syscall::IntoSyscallReturn::into_syscall_return(
                #fn_name(__ctx, #(#arg_names),*)
            )
        }
    };

    expanded.into()
}

/// Kernel test case procedural macro
///
/// Enhances test cases with:
/// - Logger initialisation
/// - Automatic test identification
/// - Source location reporting
///
/// Generates the original body under a private name and a `#[test]` wrapper
/// carrying the original name and attributes (`#[should_panic]` and friends).
#[proc_macro_attribute]
pub fn kernel_test(_attr: TokenStream, input: TokenStream) -> TokenStream {
    let input_fn = parse_macro_input!(input as ItemFn);
    let fn_name = input_fn.sig.ident.clone();
    let attrs = input_fn.attrs.clone();

    let body_name = format_ident!("__{}_body", fn_name);
    let mut body_fn = input_fn;
    body_fn.sig.ident = body_name.clone();
    body_fn.attrs.clear();

    let output = quote! {
        #[allow(unused)]
        #body_fn

        #(#attrs)*
        #[test]
        fn #fn_name() {
            crate::io::logging::init_for_test();
            ::log::info!(
                "Testing > {} ({}) ...",
                stringify!(#fn_name),
                file!()
            );
            #body_name();
            ::log::info!("========[Test passed!]========");
        }
    };

    output.into()
}
