//! Binary model formats
//!
//! All formats are little-endian. The Cast scene graph is the only format the
//! merger writes; [`ByteReader`] is shared by every decoder.

pub mod cast;
mod reader;

pub use cast::*;
pub use reader::ByteReader;
