// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store adapters.
//!
//! Every store (primary or secondary) is reached through the [`Adapter`]
//! trait. Vendor clients live outside this crate; [`InMemoryAdapter`] is the
//! reference implementation used by tests and demos.

pub mod traits;
pub mod memory;

pub use traits::{Adapter, AdapterError, Patch};
pub use memory::InMemoryAdapter;
