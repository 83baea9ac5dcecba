//! Write and read contexts binding a codec stream to an isolate stack.
//!
//! The original serialization driver let individual encoders suspend
//! while awaiting sub-results; every procedure was still synchronous
//! from the caller's point of view. Here the suspension is structural
//! recursion, and what survives of the driver contract is completion:
//! a sealed stream ends with an explicit marker, and a reader that does
//! not find it has hit a defect in an encoder/decoder pair, not a
//! recoverable cache condition.

use crate::error::CodecError;
use crate::isolate::{EncoderSet, IsolateContext, IsolateOwner, PayloadValue};
use crate::stream::{ByteDecoder, ByteEncoder};
use std::io::{Read, Write};
use std::sync::Arc;

/// Marker byte terminating a sealed stream.
const STREAM_SEAL: u8 = 0xC5;

/// Serialization context: a codec stream plus the isolate stack scoping
/// payload-encoder resolution.
pub struct WriteContext<'a> {
    enc: ByteEncoder<'a>,
    isolates: IsolateContext,
}

impl<'a> WriteContext<'a> {
    /// Creates a context writing into the given sink with an empty
    /// isolate stack.
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self {
            enc: ByteEncoder::new(out),
            isolates: IsolateContext::new(),
        }
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.enc.write_u8(value)
    }

    /// Writes a little-endian u32.
    pub fn write_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.enc.write_u32(value)
    }

    /// Writes a little-endian u64.
    pub fn write_u64(&mut self, value: u64) -> Result<(), CodecError> {
        self.enc.write_u64(value)
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<(), CodecError> {
        self.enc.write_string(value)
    }

    /// Writes a length-prefixed byte blob.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), CodecError> {
        self.enc.write_bytes(value)
    }

    /// Writes raw bytes with no length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<(), CodecError> {
        self.enc.write_raw(value)
    }

    /// Writes a counted collection through the given element writer.
    ///
    /// Unlike the stream-level combinator, elements here have access to
    /// the full context, so they may enter isolates or write payloads.
    pub fn write_collection<T>(
        &mut self,
        items: &[T],
        mut each: impl FnMut(&mut Self, &T) -> Result<(), CodecError>,
    ) -> Result<(), CodecError> {
        self.enc.write_u32(items.len() as u32)?;
        for item in items {
            each(self, item)?;
        }
        Ok(())
    }

    /// Runs `body` inside a nested isolate.
    ///
    /// The (owner, encoder set) frame is pushed before `body` runs and
    /// popped on every exit, success or error, restoring the previous
    /// frame. Generic over the error type so callers layering their own
    /// errors over [`CodecError`] can propagate them through.
    pub fn with_isolate<T, E>(
        &mut self,
        owner: IsolateOwner,
        set: Arc<EncoderSet>,
        body: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        self.isolates.push(owner, set);
        let result = body(self);
        self.isolates.pop();
        result
    }

    /// Returns the currently active isolate owner.
    pub fn owner(&self) -> Option<&IsolateOwner> {
        self.isolates.owner()
    }

    /// Resolves a payload codec against the active encoder set.
    pub fn resolve(&self, tag: &str) -> Result<Arc<dyn crate::isolate::PayloadCodec>, CodecError> {
        self.isolates.resolve(tag)
    }

    /// Writes a tagged payload: the type tag, then the body through the
    /// codec resolved in the active isolate.
    pub fn write_payload(&mut self, value: &dyn PayloadValue) -> Result<(), CodecError> {
        let tag = value.type_tag().to_string();
        let codec = self.isolates.resolve(&tag)?;
        self.enc.write_string(&tag)?;
        codec.encode(value, self)
    }

    /// Terminates the stream with the completion marker and flushes.
    ///
    /// Must be called exactly once, after the serialization procedure
    /// has written everything it intends to.
    pub fn seal(&mut self) -> Result<(), CodecError> {
        self.enc.write_u8(STREAM_SEAL)?;
        self.enc.flush()
    }
}

/// Deserialization context: the decoding dual of [`WriteContext`].
pub struct ReadContext<'a> {
    dec: ByteDecoder<'a>,
    isolates: IsolateContext,
}

impl<'a> ReadContext<'a> {
    /// Creates a context reading from the given source with an empty
    /// isolate stack.
    pub fn new(input: &'a mut dyn Read) -> Self {
        Self {
            dec: ByteDecoder::new(input),
            isolates: IsolateContext::new(),
        }
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.dec.read_u8()
    }

    /// Reads a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.dec.read_u32()
    }

    /// Reads a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.dec.read_u64()
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        self.dec.read_string()
    }

    /// Reads a length-prefixed byte blob.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        self.dec.read_vec()
    }

    /// Reads exactly `buf.len()` raw bytes.
    pub fn read_raw(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        self.dec.read_raw(buf)
    }

    /// Reads a counted collection through the given element reader.
    pub fn read_collection<T>(
        &mut self,
        mut each: impl FnMut(&mut Self) -> Result<T, CodecError>,
    ) -> Result<Vec<T>, CodecError> {
        let len = self.dec.read_u32()?;
        let mut items = Vec::with_capacity(len.min(1024) as usize);
        for _ in 0..len {
            items.push(each(self)?);
        }
        Ok(items)
    }

    /// Reads a counted collection, stopping as soon as the element
    /// reader returns `Some`.
    ///
    /// On an early return the remaining declared elements are NOT
    /// drained and the stream position is undefined; the caller must
    /// abandon the stream immediately.
    pub fn read_collection_until<T>(
        &mut self,
        mut each: impl FnMut(&mut Self) -> Result<Option<T>, CodecError>,
    ) -> Result<Option<T>, CodecError> {
        let len = self.dec.read_u32()?;
        for _ in 0..len {
            if let Some(found) = each(self)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Runs `body` inside a nested isolate, popping the frame on every
    /// exit.
    pub fn with_isolate<T, E>(
        &mut self,
        owner: IsolateOwner,
        set: Arc<EncoderSet>,
        body: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        self.isolates.push(owner, set);
        let result = body(self);
        self.isolates.pop();
        result
    }

    /// Returns the currently active isolate owner.
    pub fn owner(&self) -> Option<&IsolateOwner> {
        self.isolates.owner()
    }

    /// Resolves a payload codec against the active encoder set.
    pub fn resolve(&self, tag: &str) -> Result<Arc<dyn crate::isolate::PayloadCodec>, CodecError> {
        self.isolates.resolve(tag)
    }

    /// Reads a tagged payload: the type tag, then the body through the
    /// codec resolved in the active isolate.
    pub fn read_payload(&mut self) -> Result<Box<dyn PayloadValue>, CodecError> {
        let tag = self.dec.read_string()?;
        self.read_payload_with_tag(&tag)
    }

    /// Reads a payload body for an already-read tag.
    pub fn read_payload_with_tag(&mut self, tag: &str) -> Result<Box<dyn PayloadValue>, CodecError> {
        let codec = self.isolates.resolve(tag)?;
        codec.decode(self)
    }

    /// Verifies the completion marker at the current position.
    ///
    /// A missing or wrong marker means the writer and reader disagree on
    /// the stream layout, which is a defect in a codec, not a
    /// recoverable cache condition.
    pub fn verify_seal(&mut self) -> Result<(), CodecError> {
        match self.dec.read_u8() {
            Ok(STREAM_SEAL) => Ok(()),
            Ok(other) => Err(CodecError::protocol(format!(
                "expected completion marker, found byte {other:#04x}"
            ))),
            Err(_) => Err(CodecError::protocol(
                "stream ended without completion marker",
            )),
        }
    }
}
