//! Content decoders for the `extract` step, selected by mime
//! type or file name. Add a new format by implementing [`ContentDecoder`]
//! and registering it with a [`DecoderRegistry`].

pub mod decoder;
pub mod error;
pub mod extract;
pub mod plain_text;
pub mod registry;
pub mod url;

pub use decoder::ContentDecoder;
pub use error::{DecodeError, Result};
pub use extract::ExtractHandler;
pub use plain_text::PlainTextDecoder;
pub use registry::DecoderRegistry;
pub use url::UrlDecoder;
