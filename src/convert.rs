//! Sample format conversion
//!
//! Converts between raw hardware containers, as laid out in a buffer, and
//! host values. A container is `length` bits wide and stored with the
//! endianness declared by its [`DataFormat`]; the payload is the
//! `bits`-bit field starting at bit `shift`.
//!
//! Conversion never fails for a format that passed [`DataFormat::validate`].
//! Callers are expected to hand in at least `storage_bytes()` bytes; shorter
//! slices are treated as zero padded rather than rejected.
//!
//! # Example
//!
//! ```
//! use iio_core::convert::convert;
//! use iio_core::types::{DataFormat, Sample};
//!
//! let fmt: DataFormat = "le:s12/16>>4".parse().unwrap();
//! assert_eq!(convert(&fmt, &[0xF0, 0xFF]), Sample::I16(-1));
//! ```

use crate::types::{DataFormat, Sample};

/// All-ones mask of `bits` width; full width for 64 and above
#[inline]
pub fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Sign-extend the low `bits` bits of `value` to 64 bits
#[inline]
pub fn sign_extend(value: u64, bits: u32) -> u64 {
    if bits == 0 || bits >= 64 {
        return value;
    }
    let unused = 64 - bits;
    (((value << unused) as i64) >> unused) as u64
}

/// Assemble a container value from its stored bytes
#[inline]
pub fn read_container(format: &DataFormat, raw: &[u8]) -> u64 {
    let len = format.storage_bytes().min(raw.len()).min(8);
    let bytes = &raw[..len];
    if format.is_be {
        bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
    } else {
        bytes.iter().rev().fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }
}

/// Store a container value into its byte representation
#[inline]
pub fn write_container(format: &DataFormat, value: u64, dst: &mut [u8]) {
    let len = format.storage_bytes().min(dst.len()).min(8);
    for i in 0..len {
        let byte = (value >> (8 * i)) as u8;
        if format.is_be {
            dst[len - 1 - i] = byte;
        } else {
            dst[i] = byte;
        }
    }
}

/// Pull the payload out of a container as two's complement bits
fn extract(format: &DataFormat, container: u64) -> u64 {
    if format.is_fully_defined {
        if format.is_signed {
            let full = sign_extend(container, format.length) as i64;
            full.checked_shr(format.shift)
                .unwrap_or(if full < 0 { -1 } else { 0 }) as u64
        } else {
            container.checked_shr(format.shift).unwrap_or(0)
        }
    } else {
        let field = container.checked_shr(format.shift).unwrap_or(0) & mask(format.bits);
        if format.is_signed {
            sign_extend(field, format.bits)
        } else {
            field
        }
    }
}

/// Convert one raw container into its host value
pub fn convert(format: &DataFormat, raw: &[u8]) -> Sample {
    let value = extract(format, read_container(format, raw));
    if format.with_scale {
        let int = if format.is_signed {
            value as i64 as f64
        } else {
            value as f64
        };
        Sample::F64(int * format.scale)
    } else {
        Sample::from_bits(format.host_kind(), value)
    }
}

/// Quantize a host value back to the raw integer domain
fn quantize(format: &DataFormat, value: Sample) -> u64 {
    if !format.with_scale {
        return value.to_bits();
    }
    let raw = (value.as_f64() / format.scale).trunc();
    if format.is_signed {
        raw as i64 as u64
    } else {
        raw as u64
    }
}

/// Convert a host value into a raw container, writing `storage_bytes()` bytes
///
/// Bits of the container outside the payload field are zeroed, except for
/// fully-defined formats where the sign/zero extension above the field is
/// produced as the hardware would.
pub fn convert_inverse_into(format: &DataFormat, value: Sample, dst: &mut [u8]) {
    let raw = quantize(format, value);
    let container = if format.is_fully_defined {
        raw.checked_shl(format.shift).unwrap_or(0) & mask(format.length)
    } else {
        (raw & mask(format.bits)).checked_shl(format.shift).unwrap_or(0)
    };
    write_container(format, container, dst);
}

/// Convert a host value into a freshly allocated raw container
pub fn convert_inverse(format: &DataFormat, value: Sample) -> Vec<u8> {
    let mut out = vec![0u8; format.storage_bytes()];
    convert_inverse_into(format, value, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SampleKind;
    use proptest::prelude::*;

    #[test]
    fn test_mask_full_width() {
        assert_eq!(mask(0), 0);
        assert_eq!(mask(12), 0xFFF);
        assert_eq!(mask(63), u64::MAX >> 1);
        assert_eq!(mask(64), u64::MAX);
    }

    #[test]
    fn test_sign_extend_boundaries() {
        assert_eq!(sign_extend(0x800, 12) as i64, -2048);
        assert_eq!(sign_extend(0x7FF, 12) as i64, 2047);
        assert_eq!(sign_extend(u64::MAX, 64), u64::MAX);
        assert_eq!(sign_extend(0x80, 8) as i64, -128);
    }

    #[test]
    fn test_shifted_signed_field_little_endian() {
        let fmt = DataFormat::new(16, 12).with_shift(4).signed();
        // Container 0x0FF0: field [4, 16) = 0x0FF, bit 11 clear
        assert_eq!(convert(&fmt, &[0xF0, 0x0F]), Sample::I16(255));
        // Container 0xFFF0: field = 0xFFF, bit 11 set
        assert_eq!(convert(&fmt, &[0xF0, 0xFF]), Sample::I16(-1));
        // Container 0x8000: field = 0x800
        assert_eq!(convert(&fmt, &[0x00, 0x80]), Sample::I16(-2048));
    }

    #[test]
    fn test_unsigned_field_ignores_noise_bits() {
        let fmt = DataFormat::new(16, 12).with_shift(4);
        assert_eq!(convert(&fmt, &[0xFF, 0xFF]), Sample::U16(0xFFF));
        let fmt = DataFormat::new(16, 12);
        assert_eq!(convert(&fmt, &[0xFF, 0xFF]), Sample::U16(0xFFF));
    }

    #[test]
    fn test_big_endian_container() {
        let fmt = DataFormat::new(16, 16).big_endian();
        assert_eq!(convert(&fmt, &[0x12, 0x34]), Sample::U16(0x1234));
        let fmt = DataFormat::new(32, 24).with_shift(8).signed().big_endian();
        assert_eq!(convert(&fmt, &[0xFF, 0xFF, 0xFE, 0x00]), Sample::I32(-2));
        assert_eq!(convert_inverse(&fmt, Sample::I32(-2)), vec![0xFF, 0xFF, 0xFE, 0x00]);
    }

    #[test]
    fn test_fully_defined_skips_sign_extension() {
        // Hardware already sign-extended the 12-bit field across the container
        let fmt = DataFormat::new(16, 12).signed().fully_defined();
        assert_eq!(convert(&fmt, &(-5i16).to_le_bytes()), Sample::I16(-5));
        assert_eq!(convert_inverse(&fmt, Sample::I16(-5)), (-5i16).to_le_bytes().to_vec());

        let fmt = DataFormat::new(16, 12).with_shift(4).signed().fully_defined();
        assert_eq!(convert(&fmt, &(-32i16).to_le_bytes()), Sample::I16(-2));
    }

    #[test]
    fn test_full_width_64_bit_paths() {
        let fmt = DataFormat::new(64, 64).signed();
        let raw = i64::MIN.to_le_bytes();
        assert_eq!(convert(&fmt, &raw), Sample::I64(i64::MIN));
        assert_eq!(convert_inverse(&fmt, Sample::I64(i64::MIN)), raw.to_vec());

        let fmt = DataFormat::new(64, 64).big_endian();
        let raw = u64::MAX.to_be_bytes();
        assert_eq!(convert(&fmt, &raw), Sample::U64(u64::MAX));
        assert_eq!(convert_inverse(&fmt, Sample::U64(u64::MAX)), raw.to_vec());

        let fmt = DataFormat::new(64, 63).with_shift(1).signed();
        let raw = ((-1i64 as u64) << 1).to_le_bytes();
        assert_eq!(convert(&fmt, &raw), Sample::I64(-1));
    }

    #[test]
    fn test_bits_equal_length_needs_no_mask() {
        let fmt = DataFormat::new(8, 8).signed();
        assert_eq!(convert(&fmt, &[0x80]), Sample::I8(-128));
        let fmt = DataFormat::new(32, 32);
        assert_eq!(convert(&fmt, &u32::MAX.to_le_bytes()), Sample::U32(u32::MAX));
    }

    #[test]
    fn test_scaled_conversion() {
        let fmt = DataFormat::new(16, 12).signed().with_scale(0.5);
        assert_eq!(convert(&fmt, &(-4i16 as u16 & 0xFFF).to_le_bytes()), Sample::F64(-2.0));
        assert_eq!(convert_inverse(&fmt, Sample::F64(-2.0)), (0xFFCu16).to_le_bytes().to_vec());
        // Truncation toward zero when quantizing
        assert_eq!(convert_inverse(&fmt, Sample::F64(1.9)), 3u16.to_le_bytes().to_vec());
    }

    #[test]
    fn test_inverse_zeroes_bits_outside_field() {
        let fmt = DataFormat::new(16, 8).with_shift(4);
        assert_eq!(convert_inverse(&fmt, Sample::U16(0xABCD)), 0x0CD0u16.to_le_bytes().to_vec());
    }

    #[test]
    fn test_short_input_is_zero_padded() {
        let fmt = DataFormat::new(32, 32);
        assert_eq!(convert(&fmt, &[0x01]), Sample::U32(1));
    }

    /// Build a well-formed container for the format from an arbitrary seed
    fn well_formed_container(fmt: &DataFormat, seed: u64) -> u64 {
        let field = seed & mask(fmt.bits);
        if fmt.is_fully_defined {
            let extended = if fmt.is_signed {
                sign_extend(field, fmt.bits)
            } else {
                field
            };
            (extended << fmt.shift) & mask(fmt.length)
        } else {
            field << fmt.shift
        }
    }

    fn arbitrary_format(length: u32, a: u64, b: u64, flags: u8) -> DataFormat {
        let bits = 1 + (a % length as u64) as u32;
        let shift = (b % (length - bits + 1) as u64) as u32;
        let mut fmt = DataFormat::new(length, bits).with_shift(shift);
        fmt.is_signed = flags & 1 != 0;
        fmt.is_fully_defined = flags & 2 != 0;
        fmt.is_be = flags & 4 != 0;
        fmt
    }

    proptest! {
        #[test]
        fn test_lossless_round_trip(
            length in prop::sample::select(vec![8u32, 16, 32, 64]),
            a in any::<u64>(),
            b in any::<u64>(),
            flags in 0u8..8,
            seed in any::<u64>(),
        ) {
            let fmt = arbitrary_format(length, a, b, flags).validate().unwrap();
            let mut raw = vec![0u8; fmt.storage_bytes()];
            write_container(&fmt, well_formed_container(&fmt, seed), &mut raw);

            let host = convert(&fmt, &raw);
            prop_assert_eq!(host.kind(), fmt.host_kind());
            prop_assert_eq!(convert_inverse(&fmt, host), raw, "format {}", fmt);
        }

        #[test]
        fn test_scaled_round_trip_within_one_step(
            length in prop::sample::select(vec![8u32, 16, 32]),
            a in any::<u64>(),
            b in any::<u64>(),
            flags in 0u8..8,
            seed in any::<u64>(),
            scale in prop::sample::select(vec![0.1f64, 0.25, 0.5, 1e-3, 3.0, 1.0 / 3.0]),
        ) {
            let fmt = arbitrary_format(length, a, b, flags).with_scale(scale).validate().unwrap();
            let mut raw = vec![0u8; fmt.storage_bytes()];
            write_container(&fmt, well_formed_container(&fmt, seed), &mut raw);

            let host = convert(&fmt, &raw);
            let back = convert_inverse(&fmt, host);

            let mut unscaled = fmt;
            unscaled.with_scale = false;
            let original = convert(&unscaled, &raw).as_f64();
            let recovered = convert(&unscaled, &back).as_f64();
            prop_assert!((original - recovered).abs() <= 1.0,
                "{} vs {} for {} scale {}", original, recovered, fmt, scale);
        }

        #[test]
        fn test_convert_never_panics(
            length in prop::sample::select(vec![8u32, 16, 32, 64]),
            a in any::<u64>(),
            b in any::<u64>(),
            flags in 0u8..8,
            bytes in prop::collection::vec(any::<u8>(), 0..9),
        ) {
            let fmt = arbitrary_format(length, a, b, flags);
            let _ = convert(&fmt, &bytes);
        }

        #[test]
        fn test_host_kind_holds_extracted_value(
            bits in 1u32..=16,
            seed in any::<u16>(),
        ) {
            let fmt = DataFormat::new(16, bits);
            let host = convert(&fmt, &seed.to_le_bytes());
            let expected = SampleKind::size_bytes(&fmt.host_kind()) * 8;
            prop_assert!(bits as usize <= expected);
            prop_assert_eq!(host.to_bits(), seed as u64 & mask(bits));
        }
    }
}
