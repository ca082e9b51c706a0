//! Upload working areas and part assembly.

pub mod assembler;
pub mod store;

pub use assembler::PartAssembler;
pub use store::{PartStore, StagedPart};
