//! `agrokit-core` is the session layer of the Agro mobile wallet.
//!
//! It owns the authentication and balance state every screen renders from and
//! sequences the email, passkey and logout flows against a wallet backend the
//! host app provides. Exposed to Swift, Kotlin and React Native through `UniFFI`.
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

mod backend;
pub use backend::*;

mod chain;
pub use chain::*;

mod controller;
pub use controller::*;

mod error;
pub use error::*;

mod rpc;
pub use rpc::*;

mod snapshot;
pub use snapshot::*;

pub mod email;

pub mod logger;

// private modules
mod defaults;

uniffi::setup_scaffolding!("agrokit_core");
