//! # Scopes: deterministic ownership and keyed re-creation.
//!
//! - [`Lifetime`] - cleanup stack released in reverse order
//! - [`Scope`] - keyed destroy-then-recreate container
//! - [`DanglingScope`] / [`Dispose`] - unkeyed, imperatively started instances

mod dangling;
mod keyed;
mod lifetime;

pub use dangling::{DanglingScope, Dispose};
pub use keyed::Scope;
pub(crate) use lifetime::CleanupGuard;
pub use lifetime::Lifetime;
