//! rANS entropy decoding of symbol streams.
//!
//! A stream starts with a scheme byte. Raw streams code every symbol with one
//! rANS alphabet; tagged streams code the bit length of each value group with
//! rANS and store the values themselves as plain bits behind it.

use anyhow::{Context, bail, ensure};

use super::buffer::DecoderBuffer;

const TAGGED: u8 = 0;
const RAW: u8 = 1;
const IO_BASE: u32 = 256;
const TAG_BIT_LENGTH: u8 = 5;
const MAX_ALPHABET: u64 = 1 << 20;

struct Symbol {
    prob: u32,
    cum_prob: u32,
}

/// One rANS alphabet and the coded bytes that use it.
struct SymbolDecoder<'a> {
    precision: u32,
    base: u32,
    symbols: Vec<Symbol>,
    lookup: Vec<u32>,
    data: &'a [u8],
    offset: usize,
    state: u32,
}

impl<'a> SymbolDecoder<'a> {
    /// Reads the probability table, then the coded bytes.
    fn read(buffer: &mut DecoderBuffer<'a>, bit_length: u8) -> anyhow::Result<Self> {
        let precision_bits = (3 * u32::from(bit_length) / 2).clamp(12, 20);
        let precision = 1u32 << precision_bits;

        let count = buffer.varint()?;
        ensure!(count > 0, "empty symbol alphabet");
        ensure!(count <= MAX_ALPHABET, "alphabet of {count} symbols");
        let count = count as usize;
        let mut probs = vec![0u32; count];
        let mut i = 0;
        while i < count {
            let first = buffer.u8()?;
            let token = first & 3;
            if token == 3 {
                // A run of zero probabilities
                let run = usize::from(first >> 2) + 1;
                ensure!(i + run <= count, "zero run past the alphabet");
                i += run;
                continue;
            }
            let mut prob = u32::from(first >> 2);
            for b in 0..u32::from(token) {
                prob |= u32::from(buffer.u8()?) << (8 * (b + 1) - 2);
            }
            probs[i] = prob;
            i += 1;
        }

        let mut symbols = Vec::with_capacity(count);
        let mut lookup = vec![0u32; precision as usize];
        let mut cum_prob = 0u32;
        for (index, &prob) in probs.iter().enumerate() {
            let end = cum_prob
                .checked_add(prob)
                .filter(|&end| end <= precision)
                .context("symbol probabilities exceed the precision")?;
            lookup[cum_prob as usize..end as usize].fill(index as u32);
            symbols.push(Symbol { prob, cum_prob });
            cum_prob = end;
        }
        ensure!(
            cum_prob == precision,
            "symbol probabilities sum to {cum_prob}, expected {precision}"
        );

        let len = buffer.varint()?;
        let len = usize::try_from(len).context("coded length")?;
        let data = buffer.bytes(len)?;
        let mut decoder = Self {
            precision,
            base: precision * 4,
            symbols,
            lookup,
            data,
            offset: 0,
            state: 0,
        };
        decoder.init()?;
        Ok(decoder)
    }

    /// The final state sits at the end of the coded bytes; its top two bits
    /// give its width.
    fn init(&mut self) -> anyhow::Result<()> {
        let data = self.data;
        let Some(&last) = data.last() else {
            bail!("no coded bytes");
        };
        let width = usize::from(last >> 6) + 1;
        ensure!(data.len() >= width, "truncated coder state");
        self.offset = data.len() - width;
        let state = data[self.offset..]
            .iter()
            .rev()
            .fold(0u32, |acc, &byte| (acc << 8) | u32::from(byte));
        let mask = (1u32 << (8 * width - 2)) - 1;
        self.state = (state & mask) + self.base;
        ensure!(self.state < self.base * IO_BASE, "coder state out of range");
        Ok(())
    }

    fn next(&mut self) -> u32 {
        while self.state < self.base && self.offset > 0 {
            self.offset -= 1;
            self.state = self.state * IO_BASE + u32::from(self.data[self.offset]);
        }
        let quo = self.state / self.precision;
        let rem = self.state % self.precision;
        let value = self.lookup[rem as usize];
        let symbol = &self.symbols[value as usize];
        self.state = quo * symbol.prob + rem - symbol.cum_prob;
        value
    }
}

/// Decodes `count` values coded in groups of `components`.
pub(super) fn decode_symbols(
    buffer: &mut DecoderBuffer<'_>,
    count: usize,
    components: usize,
) -> anyhow::Result<Vec<u32>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    ensure!(
        components > 0 && count % components == 0,
        "{count} values do not split into groups of {components}"
    );
    match buffer.u8()? {
        TAGGED => decode_tagged(buffer, count, components),
        RAW => {
            let bit_length = buffer.u8()?;
            ensure!(
                (1..=18).contains(&bit_length),
                "symbol bit length {bit_length} out of range"
            );
            let mut decoder = SymbolDecoder::read(buffer, bit_length)?;
            Ok((0..count).map(|_| decoder.next()).collect())
        }
        scheme => bail!("unknown symbol coding {scheme}"),
    }
}

fn decode_tagged(
    buffer: &mut DecoderBuffer<'_>,
    count: usize,
    components: usize,
) -> anyhow::Result<Vec<u32>> {
    let mut tags = SymbolDecoder::read(buffer, TAG_BIT_LENGTH)?;
    let mut bits = buffer.start_bits();
    let mut values = Vec::with_capacity(count);
    for _ in 0..count / components {
        let bit_length = tags.next();
        for _ in 0..components {
            values.push(bits.bits(bit_length)?);
        }
    }
    buffer.end_bits(bits)?;
    Ok(values)
}

/// Sign in the lowest bit: `0, -1, 1, -2, ...`.
pub(super) fn to_signed(symbol: u32) -> i32 {
    let magnitude = (symbol >> 1) as i32;
    if symbol & 1 == 0 {
        magnitude
    } else {
        -magnitude - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_symbol_alphabet_repeats_it() {
        // One symbol owning all 4096 slots, final state 0
        let bytes = [RAW, 4, 0x01, 0x01, 0x40, 0x01, 0x00];
        let mut buffer = DecoderBuffer::new(&bytes);
        let values = decode_symbols(&mut buffer, 5, 1).unwrap();
        assert_eq!(values, vec![0; 5]);
        assert_eq!(buffer.remaining(), 0);
    }

    #[test]
    fn probabilities_must_fill_the_precision() {
        // Half of 4096 is missing
        let bytes = [RAW, 4, 0x01, 0x01, 0x20, 0x01, 0x00];
        let err = decode_symbols(&mut DecoderBuffer::new(&bytes), 1, 1).unwrap_err();
        assert!(err.to_string().contains("sum to 2048"));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(decode_symbols(&mut DecoderBuffer::new(&[7]), 3, 1).is_err());
    }

    #[test]
    fn signs_live_in_the_low_bit() {
        let decoded: Vec<i32> = (0..5).map(to_signed).collect();
        assert_eq!(decoded, vec![0, -1, 1, -2, 2]);
    }
}
