//! UbiArt `.ckd` texture container.
//!
//! Provides the fixed header layout, the `1TXD`/`APMC` texture records and
//! the assembler that patches the container length once everything is in
//! place. [`CkdInfo`] reads a finished container back for inspection.

pub mod layout;
mod container;
mod record;

pub use container::{assemble, validate_dimensions, CkdInfo, RecordKind};
pub use record::{MaskedPayload, TextureRecord};
