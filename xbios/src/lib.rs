//! Layered codec for Xbox (original) BIOS ROM images: locates the nested
//! preldr/2BL/kernel components by convention-driven offsets, applies the
//! chained symmetric and asymmetric cryptographic transforms in the correct
//! order, enforces the invariants tying the layers together, and can
//! assemble a fresh image from independently supplied components.
//!
//! Out of scope: file I/O, CLI argument parsing, console logging, and the
//! primitive cryptographic routines themselves -- those are external
//! collaborators this crate composes, not reimplements.

pub mod bldr;
pub mod builder;
pub mod bytes;
pub mod consts;
pub mod crypto;
pub mod error;
pub mod image;
pub mod kernel;
pub mod layout;
pub mod params;
pub mod preldr;

pub use bldr::{Bldr, BootParams};
pub use builder::Components;
pub use consts::*;
pub use error::{LoadStatus, PreldrStatus, XbiosError, XbiosResult};
pub use image::{BiosStatus, Image};
pub use kernel::{Kernel, KernelStatus};
pub use layout::{replicate, Layout};
pub use params::{BuildParams, LoadParams, MCPXVersion};
pub use preldr::Preldr;
