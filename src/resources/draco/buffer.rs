//! Little-endian reads over a Draco bitstream.

use anyhow::{Context, bail, ensure};

pub(super) struct DecoderBuffer<'a> {
    data: &'a [u8],
    pos: usize,
    /// `(major, minor)` from the header.
    pub version: (u8, u8),
}

impl<'a> DecoderBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            version: (0, 0),
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn bytes(&mut self, len: usize) -> anyhow::Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .with_context(|| format!("stream ends {} bytes short", len.saturating_sub(self.remaining())))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> anyhow::Result<[u8; N]> {
        let mut out = [0; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> anyhow::Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn i8(&mut self) -> anyhow::Result<i8> {
        Ok(i8::from_le_bytes(self.array()?))
    }

    pub fn u16(&mut self) -> anyhow::Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> anyhow::Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> anyhow::Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> anyhow::Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// LEB128, least significant group first.
    pub fn varint(&mut self) -> anyhow::Result<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        bail!("varint longer than 64 bits")
    }

    pub fn varint_u32(&mut self) -> anyhow::Result<u32> {
        let value = self.varint()?;
        u32::try_from(value).with_context(|| format!("{value} does not fit 32 bits"))
    }

    /// Hands out the rest of the stream as a bit reader; [`Self::end_bits`]
    /// skips the bytes it touched.
    pub fn start_bits(&self) -> BitReader<'a> {
        BitReader {
            data: &self.data[self.pos..],
            bit: 0,
        }
    }

    pub fn end_bits(&mut self, reader: BitReader<'a>) -> anyhow::Result<()> {
        self.bytes(reader.bit.div_ceil(8)).map(|_| ())
    }

    pub fn at_least(&self, len: usize, what: &str) -> anyhow::Result<()> {
        ensure!(
            len <= self.remaining(),
            "{what} needs {len} bytes, {} left",
            self.remaining()
        );
        Ok(())
    }
}

/// Bits are read least significant first within each byte.
pub(super) struct BitReader<'a> {
    data: &'a [u8],
    bit: usize,
}

impl BitReader<'_> {
    pub fn bits(&mut self, count: u32) -> anyhow::Result<u32> {
        ensure!(count <= 32, "cannot read {count} bits at once");
        let mut value = 0u32;
        for i in 0..count {
            let byte = self
                .data
                .get(self.bit / 8)
                .context("bit stream ends early")?;
            value |= u32::from((byte >> (self.bit % 8)) & 1) << i;
            self.bit += 1;
        }
        Ok(value)
    }
}
