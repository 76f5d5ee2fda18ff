//! Per-point attribute decoding for sequentially encoded meshes.
//!
//! Every attributes decoder lists its attributes first, then stores the
//! portable (integer) values of all of them, then the parameters needed to
//! turn those back into floats (quantization ranges, normal precision).

use anyhow::{Context, bail, ensure};

use super::{
    buffer::DecoderBuffer,
    rans::{decode_symbols, to_signed},
};

const PREDICTION_NONE: i8 = -2;
const PREDICTION_DIFFERENCE: i8 = 0;
const TRANSFORM_WRAP: i8 = 1;
const TRANSFORM_OCTAHEDRON: i8 = 2;
const TRANSFORM_OCTAHEDRON_CANONICALIZED: i8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum AttributeKind {
    Position,
    Normal,
    Color,
    TexCoord,
    Generic,
}

impl AttributeKind {
    fn from_id(id: u8) -> anyhow::Result<Self> {
        Ok(match id {
            0 => AttributeKind::Position,
            1 => AttributeKind::Normal,
            2 => AttributeKind::Color,
            3 => AttributeKind::TexCoord,
            4 => AttributeKind::Generic,
            _ => bail!("unknown attribute type {id}"),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum DataType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bool,
}

impl DataType {
    fn from_id(id: u8) -> anyhow::Result<Self> {
        Ok(match id {
            1 => DataType::I8,
            2 => DataType::U8,
            3 => DataType::I16,
            4 => DataType::U16,
            5 => DataType::I32,
            6 => DataType::U32,
            7 => DataType::I64,
            8 => DataType::U64,
            9 => DataType::F32,
            10 => DataType::F64,
            11 => DataType::Bool,
            _ => bail!("unknown data type {id}"),
        })
    }

    fn size(self) -> usize {
        match self {
            DataType::I8 | DataType::U8 | DataType::Bool => 1,
            DataType::I16 | DataType::U16 => 2,
            DataType::I32 | DataType::U32 | DataType::F32 => 4,
            DataType::I64 | DataType::U64 | DataType::F64 => 8,
        }
    }

    /// Largest magnitude, used to map normalized integers onto [-1, 1].
    fn max_integer(self) -> Option<f64> {
        Some(match self {
            DataType::I8 => i8::MAX as f64,
            DataType::U8 => u8::MAX as f64,
            DataType::I16 => i16::MAX as f64,
            DataType::U16 => u16::MAX as f64,
            DataType::I32 => i32::MAX as f64,
            DataType::U32 => u32::MAX as f64,
            DataType::I64 => i64::MAX as f64,
            DataType::U64 => u64::MAX as f64,
            DataType::F32 | DataType::F64 | DataType::Bool => return None,
        })
    }

    fn to_float(self, value: f64, normalized: bool) -> f32 {
        match self.max_integer() {
            Some(max) if normalized => (value / max).max(-1.0) as f32,
            _ => value as f32,
        }
    }

    /// One little-endian component.
    fn read(self, bytes: &[u8], normalized: bool) -> f32 {
        let mut wide = [0u8; 8];
        wide[..bytes.len()].copy_from_slice(bytes);
        let value = match self {
            DataType::I8 => bytes[0] as i8 as f64,
            DataType::U8 | DataType::Bool => bytes[0] as f64,
            DataType::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            DataType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            DataType::I32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            DataType::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            DataType::I64 => i64::from_le_bytes(wide) as f64,
            DataType::U64 => u64::from_le_bytes(wide) as f64,
            DataType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            DataType::F64 => f64::from_le_bytes(wide),
        };
        self.to_float(value, normalized)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(super) struct AttributeDescriptor {
    pub kind: AttributeKind,
    pub data_type: DataType,
    pub components: usize,
    pub normalized: bool,
    pub unique_id: u32,
}

impl AttributeDescriptor {
    fn read(buffer: &mut DecoderBuffer<'_>) -> anyhow::Result<Self> {
        let kind = AttributeKind::from_id(buffer.u8()?)?;
        let data_type = DataType::from_id(buffer.u8()?)?;
        let components = usize::from(buffer.u8()?);
        ensure!(components > 0, "attribute without components");
        let normalized = buffer.u8()? > 0;
        let unique_id = buffer.varint_u32()?;
        Ok(Self {
            kind,
            data_type,
            components,
            normalized,
            unique_id,
        })
    }
}

/// Float values of one attribute, `components` per point.
#[derive(Clone, Debug, PartialEq)]
pub(super) struct DecodedAttribute {
    pub descriptor: AttributeDescriptor,
    pub values: Vec<f32>,
}

impl DecodedAttribute {
    /// The first `N` components of every point.
    pub fn vectors<const N: usize>(&self) -> Option<Vec<[f32; N]>> {
        if self.descriptor.components < N {
            return None;
        }
        Some(
            self.values
                .chunks_exact(self.descriptor.components)
                .map(|value| {
                    let mut out = [0.0; N];
                    out.copy_from_slice(&value[..N]);
                    out
                })
                .collect(),
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Coding {
    Generic,
    Integer,
    Quantization,
    Normals,
}

impl Coding {
    fn from_id(id: u8) -> anyhow::Result<Self> {
        Ok(match id {
            0 => Coding::Generic,
            1 => Coding::Integer,
            2 => Coding::Quantization,
            3 => Coding::Normals,
            _ => bail!("unknown attribute coding {id}"),
        })
    }
}

struct Quantization {
    min_values: Vec<f32>,
    range: f32,
    bits: u8,
}

/// Values as stored in the stream, before the portable transform is undone.
enum Portable {
    Raw(Vec<f32>),
    Integers(Vec<i32>),
}

struct AttributeDecoder {
    descriptor: AttributeDescriptor,
    coding: Coding,
}

impl AttributeDecoder {
    /// Normals travel as two octahedral coordinates.
    fn portable_components(&self) -> usize {
        match self.coding {
            Coding::Normals => 2,
            _ => self.descriptor.components,
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        match self.coding {
            Coding::Quantization => ensure!(
                self.descriptor.data_type == DataType::F32,
                "only float attributes are quantized"
            ),
            Coding::Normals => ensure!(
                self.descriptor.data_type == DataType::F32 && self.descriptor.components == 3,
                "octahedral normals must be three floats"
            ),
            Coding::Integer => ensure!(
                self.descriptor.data_type.max_integer().is_some(),
                "integer coding of a {:?} attribute",
                self.descriptor.data_type
            ),
            Coding::Generic => {}
        }
        Ok(())
    }

    fn decode_portable(
        &self,
        buffer: &mut DecoderBuffer<'_>,
        points: usize,
    ) -> anyhow::Result<Portable> {
        let components = self.portable_components();
        let count = points
            .checked_mul(components)
            .context("attribute value count overflows")?;
        if self.coding == Coding::Generic {
            let descriptor = &self.descriptor;
            let size = descriptor.data_type.size();
            buffer.at_least(count.saturating_mul(size), "raw attribute")?;
            let bytes = buffer.bytes(count * size)?;
            return Ok(Portable::Raw(
                bytes
                    .chunks_exact(size)
                    .map(|b| descriptor.data_type.read(b, descriptor.normalized))
                    .collect(),
            ));
        }
        decode_integers(buffer, count, components, self.coding).map(Portable::Integers)
    }

    fn finish(
        self,
        portable: Portable,
        buffer: &mut DecoderBuffer<'_>,
    ) -> anyhow::Result<PendingTransform> {
        let parameters = match self.coding {
            Coding::Quantization => {
                let min_values = (0..self.descriptor.components)
                    .map(|_| buffer.f32())
                    .collect::<anyhow::Result<Vec<_>>>()?;
                let range = buffer.f32()?;
                let bits = buffer.u8()?;
                ensure!((1..=30).contains(&bits), "{bits} quantization bits");
                Parameters::Quantization(Quantization {
                    min_values,
                    range,
                    bits,
                })
            }
            Coding::Normals => {
                let bits = buffer.u8()?;
                ensure!((2..=30).contains(&bits), "{bits} normal bits");
                Parameters::Octahedral(bits)
            }
            Coding::Generic | Coding::Integer => Parameters::None,
        };
        Ok(PendingTransform {
            descriptor: self.descriptor,
            portable,
            parameters,
        })
    }
}

enum Parameters {
    None,
    Quantization(Quantization),
    Octahedral(u8),
}

struct PendingTransform {
    descriptor: AttributeDescriptor,
    portable: Portable,
    parameters: Parameters,
}

impl PendingTransform {
    fn into_floats(self) -> anyhow::Result<DecodedAttribute> {
        let descriptor = self.descriptor;
        let values = match (self.portable, self.parameters) {
            (Portable::Raw(values), _) => values,
            (Portable::Integers(values), Parameters::None) => values
                .into_iter()
                .map(|v| descriptor.data_type.to_float(f64::from(v), descriptor.normalized))
                .collect(),
            (Portable::Integers(values), Parameters::Quantization(q)) => {
                let max_quantized = ((1u32 << q.bits) - 1) as f32;
                let delta = q.range / max_quantized;
                values
                    .iter()
                    .zip(q.min_values.iter().cycle())
                    .map(|(&v, &min)| v as f32 * delta + min)
                    .collect()
            }
            (Portable::Integers(values), Parameters::Octahedral(bits)) => {
                let octahedron = Octahedron::new(bits);
                values
                    .chunks_exact(2)
                    .flat_map(|st| octahedron.unit_vector(st[0], st[1]))
                    .collect()
            }
        };
        Ok(DecodedAttribute { descriptor, values })
    }
}

/// Reads one attributes decoder: its attribute list, then all values.
pub(super) fn decode_attributes(
    buffer: &mut DecoderBuffer<'_>,
    points: usize,
) -> anyhow::Result<Vec<DecodedAttribute>> {
    let decoder_count = buffer.u8()?;
    let mut groups = Vec::with_capacity(usize::from(decoder_count));
    for _ in 0..decoder_count {
        let count = buffer.varint()?;
        ensure!(count > 0, "attributes decoder without attributes");
        buffer.at_least(count as usize, "attribute list")?;
        let descriptors = (0..count)
            .map(|_| AttributeDescriptor::read(buffer))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let mut decoders = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let decoder = AttributeDecoder {
                descriptor,
                coding: Coding::from_id(buffer.u8()?)?,
            };
            decoder.check()?;
            decoders.push(decoder);
        }
        groups.push(decoders);
    }

    let mut decoded = Vec::new();
    for decoders in groups {
        let portables = decoders
            .iter()
            .map(|decoder| decoder.decode_portable(buffer, points))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let mut pending = Vec::with_capacity(decoders.len());
        for (decoder, portable) in decoders.into_iter().zip(portables) {
            pending.push(decoder.finish(portable, buffer)?);
        }
        for attribute in pending {
            decoded.push(attribute.into_floats()?);
        }
    }
    Ok(decoded)
}

fn decode_integers(
    buffer: &mut DecoderBuffer<'_>,
    count: usize,
    components: usize,
    coding: Coding,
) -> anyhow::Result<Vec<i32>> {
    let transform = match buffer.i8()? {
        PREDICTION_NONE => None,
        PREDICTION_DIFFERENCE => {
            let transform = buffer.i8()?;
            match (coding, transform) {
                (Coding::Normals, TRANSFORM_OCTAHEDRON | TRANSFORM_OCTAHEDRON_CANONICALIZED) => {}
                (Coding::Integer | Coding::Quantization, TRANSFORM_WRAP) => {}
                _ => bail!("prediction transform {transform} does not fit {coding:?} coding"),
            }
            Some(transform)
        }
        method @ 1..=6 => bail!("prediction scheme {method} needs Edgebreaker connectivity"),
        method => bail!("unknown prediction scheme {method}"),
    };

    let symbols = if buffer.u8()? > 0 {
        decode_symbols(buffer, count, components)?
    } else {
        let width = usize::from(buffer.u8()?);
        ensure!((1..=4).contains(&width), "{width} byte integers");
        buffer.at_least(count.saturating_mul(width), "raw integers")?;
        let bytes = buffer.bytes(count * width)?;
        bytes
            .chunks_exact(width)
            .map(|b| b.iter().rev().fold(0u32, |acc, &byte| (acc << 8) | u32::from(byte)))
            .collect()
    };

    // Octahedral corrections are stored non-negative
    let corrections: Vec<i32> = match transform {
        Some(TRANSFORM_OCTAHEDRON | TRANSFORM_OCTAHEDRON_CANONICALIZED) => {
            symbols.into_iter().map(|s| s as i32).collect()
        }
        _ => symbols.into_iter().map(to_signed).collect(),
    };

    match transform {
        None => Ok(corrections),
        Some(TRANSFORM_WRAP) => {
            let min = buffer.i32()?;
            let max = buffer.i32()?;
            undo_wrapped_difference(&corrections, components, min, max)
        }
        Some(transform) => {
            let max_quantized = buffer.i32()?;
            let canonical = transform == TRANSFORM_OCTAHEDRON_CANONICALIZED;
            if canonical || buffer.version < (2, 2) {
                // Center value, implied by the maximum
                buffer.i32()?;
            }
            ensure!(
                max_quantized > 0 && max_quantized % 2 == 1,
                "octahedral maximum {max_quantized} is not odd"
            );
            let bits = (32 - max_quantized.leading_zeros()) as u8;
            ensure!((2..=30).contains(&bits), "{bits} octahedral bits");
            Octahedron::new(bits).undo_difference(&corrections, canonical)
        }
    }
}

/// Each value is predicted by the previous one, clamped to `[min, max]`, and
/// sums wrap around that range.
fn undo_wrapped_difference(
    corrections: &[i32],
    components: usize,
    min: i32,
    max: i32,
) -> anyhow::Result<Vec<i32>> {
    ensure!(min <= max, "wrap range {min}..{max} is empty");
    let span = i64::from(max) - i64::from(min) + 1;
    ensure!(span <= i64::from(i32::MAX), "wrap range {min}..{max} is too wide");
    let mut out: Vec<i32> = Vec::with_capacity(corrections.len());
    for (i, &correction) in corrections.iter().enumerate() {
        let predicted = match i.checked_sub(components) {
            Some(previous) => out[previous].clamp(min, max),
            None => 0i32.clamp(min, max),
        };
        let mut value = i64::from(predicted) + i64::from(correction);
        if value > i64::from(max) {
            value -= span;
        } else if value < i64::from(min) {
            value += span;
        }
        ensure!(
            (i64::from(min)..=i64::from(max)).contains(&value),
            "correction {correction} leaves the wrap range"
        );
        out.push(value as i32);
    }
    Ok(out)
}

/// Integer octahedral coordinates of unit vectors.
struct Octahedron {
    max_quantized: i64,
    center: i64,
}

impl Octahedron {
    fn new(bits: u8) -> Self {
        let max_quantized = (1i64 << bits) - 1;
        Self {
            max_quantized,
            center: (max_quantized - 1) / 2,
        }
    }

    fn in_diamond(&self, (s, t): (i64, i64)) -> bool {
        s.abs() + t.abs() <= self.center
    }

    /// Mirrors a point between the inner diamond and the outer triangles.
    fn invert_diamond(&self, (s, t): (i64, i64)) -> (i64, i64) {
        let (sign_s, sign_t) = if s >= 0 && t >= 0 {
            (1, 1)
        } else if s <= 0 && t <= 0 {
            (-1, -1)
        } else {
            (if s > 0 { 1 } else { -1 }, if t > 0 { 1 } else { -1 })
        };
        let corner_s = sign_s * self.center;
        let corner_t = sign_t * self.center;
        let (s, t) = (2 * s - corner_s, 2 * t - corner_t);
        let (s, t) = if sign_s * sign_t >= 0 { (-t, -s) } else { (t, s) };
        ((s + corner_s) / 2, (t + corner_t) / 2)
    }

    fn wrap(&self, x: i64) -> i64 {
        if x > self.center {
            x - self.max_quantized
        } else if x < -self.center {
            x + self.max_quantized
        } else {
            x
        }
    }

    fn undo_difference(&self, corrections: &[i32], canonical: bool) -> anyhow::Result<Vec<i32>> {
        let mut out = Vec::with_capacity(corrections.len());
        let mut previous = (0i64, 0i64);
        for pair in corrections.chunks_exact(2) {
            let correction = (i64::from(pair[0]), i64::from(pair[1]));
            ensure!(
                (0..self.max_quantized).contains(&correction.0)
                    && (0..self.max_quantized).contains(&correction.1),
                "octahedral correction {pair:?} out of range"
            );
            let value = self.restore(previous, correction, canonical);
            out.extend([value.0 as i32, value.1 as i32]);
            previous = value;
        }
        Ok(out)
    }

    fn restore(&self, predicted: (i64, i64), correction: (i64, i64), canonical: bool) -> (i64, i64) {
        let mut predicted = (predicted.0 - self.center, predicted.1 - self.center);
        let in_diamond = self.in_diamond(predicted);
        if !in_diamond {
            predicted = self.invert_diamond(predicted);
        }
        let rotation = if canonical && !bottom_left(predicted) {
            rotation_count(predicted)
        } else {
            0
        };
        predicted = rotate(predicted, rotation);
        let mut value = (
            self.wrap(predicted.0 + correction.0),
            self.wrap(predicted.1 + correction.1),
        );
        value = rotate(value, (4 - rotation) % 4);
        if !in_diamond {
            value = self.invert_diamond(value);
        }
        (value.0 + self.center, value.1 + self.center)
    }

    fn unit_vector(&self, s: i32, t: i32) -> [f32; 3] {
        let scale = 2.0 / (self.max_quantized - 1) as f32;
        let mut y = s as f32 * scale - 1.0;
        let mut z = t as f32 * scale - 1.0;
        let x = 1.0 - y.abs() - z.abs();
        let offset = (-x).max(0.0);
        y += if y < 0.0 { offset } else { -offset };
        z += if z < 0.0 { offset } else { -offset };
        let norm_squared = x * x + y * y + z * z;
        if norm_squared < 1e-6 {
            return [0.0; 3];
        }
        let d = norm_squared.sqrt().recip();
        [x * d, y * d, z * d]
    }
}

fn bottom_left((s, t): (i64, i64)) -> bool {
    (s == 0 && t == 0) || (s < 0 && t <= 0)
}

fn rotation_count((s, t): (i64, i64)) -> usize {
    match (s.signum(), t.signum()) {
        (0, 0) => 0,
        (0, 1) => 3,
        (0, _) => 1,
        (1, -1) => 1,
        (1, _) => 2,
        (_, 1) => 3,
        _ => 0,
    }
}

/// Quarter turns: 1 maps (s, t) to (t, -s).
fn rotate((s, t): (i64, i64), count: usize) -> (i64, i64) {
    match count {
        1 => (t, -s),
        2 => (-s, -t),
        3 => (-t, s),
        _ => (s, t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_differences_accumulate_per_component() {
        // Two components, values (0, 10) (2047, 5) (0, 0) in [0, 2047]
        let corrections = [0, 10, -1, -5, 1, -5];
        let values = undo_wrapped_difference(&corrections, 2, 0, 2047).unwrap();
        assert_eq!(values, vec![0, 10, 2047, 5, 0, 0]);
    }

    #[test]
    fn corrections_outside_the_range_are_rejected() {
        assert!(undo_wrapped_difference(&[5000], 1, 0, 10).is_err());
        assert!(undo_wrapped_difference(&[0], 1, 10, 0).is_err());
    }

    #[test]
    fn octahedral_center_is_the_x_axis() {
        let octahedron = Octahedron::new(8);
        let [x, y, z] = octahedron.unit_vector(127, 127);
        assert!((x - 1.0).abs() < 1e-6 && y.abs() < 1e-6 && z.abs() < 1e-6);
        // A corner of the square folds onto -x
        let [x, _, _] = octahedron.unit_vector(0, 0);
        assert!((x + 1.0).abs() < 1e-6);
    }

    #[test]
    fn inverting_the_diamond_twice_is_identity() {
        let octahedron = Octahedron::new(8);
        for point in [(100, 60), (-90, 70), (-120, -40), (50, -110)] {
            let once = octahedron.invert_diamond(point);
            assert_ne!(once, point);
            assert_eq!(octahedron.invert_diamond(once), point);
        }
    }

    #[test]
    fn normalized_integers_map_to_unit_range() {
        assert_eq!(DataType::U8.read(&[255], true), 1.0);
        assert_eq!(DataType::I16.read(&(-32768i16).to_le_bytes(), true), -1.0);
        assert_eq!(DataType::U16.read(&7u16.to_le_bytes(), false), 7.0);
        assert_eq!(DataType::F32.read(&0.25f32.to_le_bytes(), false), 0.25);
    }
}
