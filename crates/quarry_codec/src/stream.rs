//! Length-prefixed binary codec stream.
//!
//! A cursor over a byte stream supporting little-endian fixed-width
//! integers, length-prefixed strings and byte blobs, and counted
//! collections written and read through per-element callbacks.

use crate::error::CodecError;
use std::io::{Read, Write};

/// Upper bound accepted for any declared length in the stream.
///
/// Corrupt input can declare absurd lengths; anything above this bound
/// is rejected as malformed instead of being allocated.
const MAX_DECLARED_LEN: u32 = 1 << 30;

/// Writing half of the codec stream.
pub struct ByteEncoder<'a> {
    out: &'a mut dyn Write,
}

impl<'a> ByteEncoder<'a> {
    /// Creates an encoder writing into the given sink.
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self { out }
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.out.write_all(&[value])?;
        Ok(())
    }

    /// Writes a little-endian u32.
    pub fn write_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.out.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Writes a little-endian u64.
    pub fn write_u64(&mut self, value: u64) -> Result<(), CodecError> {
        self.out.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<(), CodecError> {
        self.write_bytes(value.as_bytes())
    }

    /// Writes a length-prefixed byte blob.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), CodecError> {
        let len = declared_len(value.len())?;
        self.write_u32(len)?;
        self.out.write_all(value)?;
        Ok(())
    }

    /// Writes raw bytes with no length prefix (fixed-width fields).
    pub fn write_raw(&mut self, value: &[u8]) -> Result<(), CodecError> {
        self.out.write_all(value)?;
        Ok(())
    }

    /// Writes a counted collection: the element count followed by each
    /// element through the given writer callback.
    pub fn write_collection<T>(
        &mut self,
        items: &[T],
        mut each: impl FnMut(&mut Self, &T) -> Result<(), CodecError>,
    ) -> Result<(), CodecError> {
        let len = declared_len(items.len())?;
        self.write_u32(len)?;
        for item in items {
            each(self, item)?;
        }
        Ok(())
    }

    /// Flushes the underlying sink.
    pub fn flush(&mut self) -> Result<(), CodecError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Reading half of the codec stream.
pub struct ByteDecoder<'a> {
    input: &'a mut dyn Read,
}

impl<'a> ByteDecoder<'a> {
    /// Creates a decoder reading from the given source.
    pub fn new(input: &'a mut dyn Read) -> Self {
        Self { input }
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let mut buf = [0u8; 1];
        self.input.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let mut buf = [0u8; 4];
        self.input.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let mut buf = [0u8; 8];
        self.input.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let bytes = self.read_vec()?;
        String::from_utf8(bytes).map_err(|_| CodecError::malformed("string is not valid UTF-8"))
    }

    /// Reads a length-prefixed byte blob.
    pub fn read_vec(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_declared_len()?;
        let mut buf = Vec::new();
        (&mut *self.input).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len as usize {
            return Err(CodecError::malformed(format!(
                "declared length {len} exceeds remaining input"
            )));
        }
        Ok(buf)
    }

    /// Reads exactly `n` raw bytes with no length prefix.
    pub fn read_raw(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        self.input.read_exact(buf)?;
        Ok(())
    }

    /// Reads a counted collection through the given element reader.
    pub fn read_collection<T>(
        &mut self,
        mut each: impl FnMut(&mut Self) -> Result<T, CodecError>,
    ) -> Result<Vec<T>, CodecError> {
        let len = self.read_declared_len()?;
        let mut items = Vec::with_capacity(len.min(1024) as usize);
        for _ in 0..len {
            items.push(each(self)?);
        }
        Ok(items)
    }

    /// Reads a counted collection, stopping as soon as the element
    /// reader returns `Some`.
    ///
    /// The remaining declared elements are NOT drained; the stream
    /// position is undefined after an early return, and the caller must
    /// abandon the stream immediately.
    pub fn read_collection_until<T>(
        &mut self,
        mut each: impl FnMut(&mut Self) -> Result<Option<T>, CodecError>,
    ) -> Result<Option<T>, CodecError> {
        let len = self.read_declared_len()?;
        for _ in 0..len {
            if let Some(found) = each(self)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn read_declared_len(&mut self) -> Result<u32, CodecError> {
        let len = self.read_u32()?;
        if len > MAX_DECLARED_LEN {
            return Err(CodecError::malformed(format!(
                "declared length {len} exceeds limit"
            )));
        }
        Ok(len)
    }
}

fn declared_len(len: usize) -> Result<u32, CodecError> {
    if len > MAX_DECLARED_LEN as usize {
        return Err(CodecError::malformed(format!(
            "length {len} exceeds encodable limit"
        )));
    }
    Ok(len as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(write: impl FnOnce(&mut ByteEncoder<'_>)) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut enc = ByteEncoder::new(&mut buf);
        write(&mut enc);
        buf
    }

    #[test]
    fn primitives_roundtrip() {
        let buf = roundtrip(|enc| {
            enc.write_u8(7).unwrap();
            enc.write_u32(0xDEAD_BEEF).unwrap();
            enc.write_u64(u64::MAX - 1).unwrap();
        });
        let mut input = buf.as_slice();
        let mut dec = ByteDecoder::new(&mut input);
        assert_eq!(dec.read_u8().unwrap(), 7);
        assert_eq!(dec.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(dec.read_u64().unwrap(), u64::MAX - 1);
    }

    #[test]
    fn string_roundtrip() {
        let buf = roundtrip(|enc| {
            enc.write_string(":app:build").unwrap();
            enc.write_string("").unwrap();
        });
        let mut input = buf.as_slice();
        let mut dec = ByteDecoder::new(&mut input);
        assert_eq!(dec.read_string().unwrap(), ":app:build");
        assert_eq!(dec.read_string().unwrap(), "");
    }

    #[test]
    fn bytes_roundtrip() {
        let buf = roundtrip(|enc| enc.write_bytes(&[1, 2, 3]).unwrap());
        let mut input = buf.as_slice();
        let mut dec = ByteDecoder::new(&mut input);
        assert_eq!(dec.read_vec().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn collection_roundtrip() {
        let items = vec!["a".to_string(), "bb".to_string(), "ccc".to_string()];
        let buf = roundtrip(|enc| {
            enc.write_collection(&items, |enc, s| enc.write_string(s)).unwrap();
        });
        let mut input = buf.as_slice();
        let mut dec = ByteDecoder::new(&mut input);
        let back = dec.read_collection(|dec| dec.read_string()).unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn collection_until_stops_without_draining() {
        let items = vec![1u32, 2, 3, 4];
        let buf = roundtrip(|enc| {
            enc.write_collection(&items, |enc, v| enc.write_u32(*v)).unwrap();
        });
        let mut input = buf.as_slice();
        let mut dec = ByteDecoder::new(&mut input);
        let found = dec
            .read_collection_until(|dec| {
                let v = dec.read_u32()?;
                Ok((v == 2).then_some(v))
            })
            .unwrap();
        assert_eq!(found, Some(2));
        // Elements 3 and 4 were not consumed.
        assert_eq!(input.len(), 8);
    }

    #[test]
    fn collection_until_consumes_all_on_no_match() {
        let items = vec![1u32, 2];
        let buf = roundtrip(|enc| {
            enc.write_collection(&items, |enc, v| enc.write_u32(*v)).unwrap();
        });
        let mut input = buf.as_slice();
        let mut dec = ByteDecoder::new(&mut input);
        let found: Option<u32> = dec
            .read_collection_until(|dec| {
                dec.read_u32()?;
                Ok(None)
            })
            .unwrap();
        assert!(found.is_none());
        assert!(input.is_empty());
    }

    #[test]
    fn truncated_string_is_error() {
        let mut buf = roundtrip(|enc| enc.write_string("abcdef").unwrap());
        buf.truncate(6);
        let mut input = buf.as_slice();
        let mut dec = ByteDecoder::new(&mut input);
        assert!(dec.read_string().is_err());
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let buf = roundtrip(|enc| enc.write_bytes(&[0xFF, 0xFE]).unwrap());
        let mut input = buf.as_slice();
        let mut dec = ByteDecoder::new(&mut input);
        assert!(matches!(
            dec.read_string(),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn absurd_declared_length_is_malformed() {
        let buf = (u32::MAX).to_le_bytes().to_vec();
        let mut input = buf.as_slice();
        let mut dec = ByteDecoder::new(&mut input);
        assert!(matches!(
            dec.read_vec(),
            Err(CodecError::Malformed { .. })
        ));
    }
}
