//! Context-scoped binary encoding for configuration cache state.
//!
//! This crate provides the length-prefixed binary codec stream, the
//! isolate mechanism that scopes payload-encoder resolution to an owner
//! (host, build, or project), and the sealed read/write contexts that
//! guarantee a serialization procedure ran to completion before its
//! stream is trusted.

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod isolate;
pub mod stream;

pub use context::{ReadContext, WriteContext};
pub use error::CodecError;
pub use isolate::{EncoderResolver, EncoderSet, IsolateContext, IsolateOwner, PayloadCodec, PayloadValue};
pub use stream::{ByteDecoder, ByteEncoder};
