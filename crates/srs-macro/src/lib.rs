//! Internal macros and codegen for the `srs` media server project.
//!
//! This crate is intended for inner use only by the `srs` workspace.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::private_intra_doc_links)]
#![forbid(non_ascii_idents, unsafe_code)]

mod dispatchable;

use proc_macro::TokenStream;

/// Generates a `*Handler` trait and a dispatching method for an event
/// represented as an `enum`.
///
/// # How to use
///
/// ### 1. Declare an `enum` for the event variants.
///
/// ```
/// use srs_macro::dispatchable;
///
/// #[dispatchable]
/// enum ReloadEvent {
///     ListenChanged { ports: Vec<u16> },
///     VhostAdded(String),
/// }
/// ```
///
/// ### 2. Implement the generated handler trait.
///
/// The macro adds `Handler` to the end of the `enum`'s name to name the
/// trait. Each method is the `snake_case`'d variant name prefixed with
/// `on_`. The trait carries an associated `Output` type returned by every
/// method, which lets subscriber hooks return a `Result`.
///
/// ```
/// # use srs_macro::dispatchable;
/// # #[dispatchable]
/// # enum ReloadEvent {
/// #     ListenChanged { ports: Vec<u16> },
/// #     VhostAdded(String),
/// # }
/// struct Subscriber;
///
/// impl ReloadEventHandler for Subscriber {
///     type Output = Result<(), ()>;
///
///     fn on_listen_changed(&mut self, ports: Vec<u16>) -> Self::Output {
///         let _ = ports;
///         Ok(())
///     }
///
///     fn on_vhost_added(&mut self, f0: String) -> Self::Output {
///         let _ = f0;
///         Ok(())
///     }
/// }
/// ```
///
/// ### 3. Dispatch an event with the handler.
///
/// ```
/// # use srs_macro::dispatchable;
/// # #[dispatchable]
/// # enum ReloadEvent {
/// #     ListenChanged { ports: Vec<u16> },
/// #     VhostAdded(String),
/// # }
/// # struct Subscriber;
/// # impl ReloadEventHandler for Subscriber {
/// #     type Output = Result<(), ()>;
/// #     fn on_listen_changed(&mut self, ports: Vec<u16>) -> Self::Output {
/// #         let _ = ports;
/// #         Ok(())
/// #     }
/// #     fn on_vhost_added(&mut self, f0: String) -> Self::Output {
/// #         let _ = f0;
/// #         Ok(())
/// #     }
/// # }
/// let mut subscriber = Subscriber;
/// let res = ReloadEvent::VhostAdded("default".to_string())
///     .dispatch_with(&mut subscriber);
/// assert!(res.is_ok());
/// ```
#[proc_macro_attribute]
pub fn dispatchable(_args: TokenStream, input: TokenStream) -> TokenStream {
    dispatchable::derive(input).unwrap_or_else(|e| e.to_compile_error().into())
}
