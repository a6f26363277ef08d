/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use proc_macro::TokenStream;
use quote::quote;
use syn::Expr;
use syn::ItemFn;
use syn::Lit;
use syn::MetaNameValue;
use syn::parse_macro_input;

/// A test attribute that fails the test if it does not finish within
/// `timeout_secs` seconds.
///
/// The test body runs on a separate thread so that the bound holds
/// even when the body deadlocks. Async bodies are driven by a fresh
/// multi-threaded tokio runtime on that thread; sync bodies are run
/// directly.
///
/// # Examples
///
/// ```rust,ignore
/// #[bounded_test(timeout_secs = 5)]
/// async fn completes() {
///     tokio::time::sleep(std::time::Duration::from_millis(10)).await;
/// }
///
/// #[bounded_test(timeout_secs = 5)]
/// fn also_completes() {}
/// ```
#[proc_macro_attribute]
pub fn bounded_test(attr: TokenStream, input: TokenStream) -> TokenStream {
    let attr = parse_macro_input!(attr as MetaNameValue);
    let input_fn = parse_macro_input!(input as ItemFn);

    if !attr.path.is_ident("timeout_secs") {
        return syn::Error::new_spanned(attr.path, "only timeout_secs allowed as argument")
            .to_compile_error()
            .into();
    }
    let timeout_secs = match &attr.value {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Int(val) => match val.base10_parse::<u64>() {
                Ok(secs) => secs,
                Err(err) => return err.to_compile_error().into(),
            },
            _ => return integer_literal_expected(&attr.value),
        },
        _ => return integer_literal_expected(&attr.value),
    };

    let fn_block = &input_fn.block;
    let fn_attrs = &input_fn.attrs;
    let fn_vis = &input_fn.vis;
    let sig = &input_fn.sig;
    let fn_name = &sig.ident;
    let output = &sig.output;

    if !sig.inputs.is_empty() {
        return syn::Error::new_spanned(&sig.inputs, "test function must not take arguments")
            .to_compile_error()
            .into();
    }

    let run = if sig.asyncness.is_some() {
        quote! {
            let test_rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .expect("failed to build test runtime");
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                test_rt.block_on(async #fn_block)
            }));
            // A deadlocked body must not keep the runtime alive on drop.
            test_rt.shutdown_background();
            result
        }
    } else {
        quote! {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| #fn_block))
        }
    };

    let output = quote! {
        #[test]
        #(#fn_attrs)*
        #fn_vis fn #fn_name() #output {
            use std::sync::mpsc::{channel, RecvTimeoutError};
            use std::thread;
            use std::time::Duration;

            let (result_tx, result_rx) = channel();

            thread::spawn(move || {
                let result = { #run };
                let _ = result_tx.send(result);
            });

            match result_rx.recv_timeout(Duration::from_secs(#timeout_secs)) {
                Ok(Ok(test_result)) => test_result,
                Ok(Err(panic)) => std::panic::resume_unwind(panic),
                Err(RecvTimeoutError::Timeout) => {
                    panic!("test did not finish within {} seconds", #timeout_secs);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    panic!("test thread exited without sending a result");
                }
            }
        }
    };

    output.into()
}

fn integer_literal_expected(value: &Expr) -> TokenStream {
    syn::Error::new_spanned(
        value,
        "unexpected value for timeout_secs, please pass an integer literal",
    )
    .to_compile_error()
    .into()
}
