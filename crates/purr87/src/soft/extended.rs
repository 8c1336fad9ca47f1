use super::{ExtendedClass, Exceptions, FpContext};

pub const BIAS: i32 = 16383;
pub const MAX_EXPONENT: u16 = 0x7FFE;
/// Exponent of infinities and NaNs
pub const SPECIAL_EXPONENT: u16 = MAX_EXPONENT + 1;

pub const MANTISSA_HIGH_BIT: u64 = 1 << 63;
pub const QUIET_NAN_BIT: u64 = 1 << 62;

/// One 80-bit extended precision value.
///
/// value = (-1)^sign * (mantissa / 2^63) * 2^(exponent - BIAS)
///
/// The integer bit of the mantissa is explicit, so a cleared bit 63 on a non-zero value marks a
/// denormal (or an unnormal when the exponent is non-zero).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ExtendedReal {
	pub sign: bool,
	/// 15 bit biased exponent
	pub exponent: u16,
	pub mantissa: u64,
}

impl ExtendedReal {
	pub const ZERO: Self = Self::new(false, 0, 0);
	pub const ONE: Self = Self::new(false, BIAS as u16, MANTISSA_HIGH_BIT);
	/// The default quiet NaN written by masked invalid operations
	pub const INDEFINITE: Self = Self::new(true, SPECIAL_EXPONENT, 0xC000_0000_0000_0000);

	pub const fn new(sign: bool, exponent: u16, mantissa: u64) -> Self {
		Self {
			sign,
			exponent: exponent & 0x7FFF,
			mantissa,
		}
	}

	pub const fn zero(sign: bool) -> Self {
		Self::new(sign, 0, 0)
	}

	pub const fn infinity(sign: bool) -> Self {
		Self::new(sign, SPECIAL_EXPONENT, MANTISSA_HIGH_BIT)
	}

	/// Largest finite magnitude representable with `bits` significant bits
	pub const fn max_finite(sign: bool, bits: u32) -> Self {
		Self::new(sign, MAX_EXPONENT, u64::MAX << (64 - bits))
	}

	pub const fn is_zero(&self) -> bool {
		self.exponent == 0 && self.mantissa == 0
	}

	pub const fn is_normalized(&self) -> bool {
		self.is_zero() || (self.mantissa & MANTISSA_HIGH_BIT) != 0
	}

	pub const fn is_special(&self) -> bool {
		self.exponent == SPECIAL_EXPONENT
	}

	pub const fn is_denormal(&self) -> bool {
		!self.is_special() && !self.is_normalized()
	}

	pub const fn is_nan(&self) -> bool {
		self.is_special() && self.mantissa != MANTISSA_HIGH_BIT
	}

	pub const fn is_signaling_nan(&self) -> bool {
		self.is_nan() && (self.mantissa & QUIET_NAN_BIT) == 0
	}

	pub const fn is_infinity(&self) -> bool {
		self.is_special() && self.mantissa == MANTISSA_HIGH_BIT
	}

	pub const fn is_positive_infinity(&self) -> bool {
		self.is_infinity() && !self.sign
	}

	pub const fn is_negative_infinity(&self) -> bool {
		self.is_infinity() && self.sign
	}

	/// true for any finite value whose magnitude is zero, including pseudo-zeros
	pub(crate) const fn has_zero_magnitude(&self) -> bool {
		!self.is_special() && self.mantissa == 0
	}

	pub const fn negate(self) -> Self {
		Self {
			sign: !self.sign,
			..self
		}
	}

	pub const fn abs(self) -> Self {
		Self { sign: false, ..self }
	}

	pub const fn quieted(self) -> Self {
		Self {
			mantissa: self.mantissa | QUIET_NAN_BIT,
			..self
		}
	}

	pub fn class(&self) -> ExtendedClass {
		if self.is_zero() {
			ExtendedClass::Zero
		} else if self.is_special() {
			if self.is_infinity() {
				ExtendedClass::Infinity
			} else if self.mantissa & MANTISSA_HIGH_BIT != 0 {
				ExtendedClass::NaN
			} else {
				ExtendedClass::Unsupported
			}
		} else if self.mantissa & MANTISSA_HIGH_BIT != 0 {
			ExtendedClass::Normal
		} else if self.exponent == 0 {
			ExtendedClass::Denormal
		} else {
			ExtendedClass::Unsupported
		}
	}

	/// Decodes the 10 byte memory layout: mantissa, then sign and exponent packed in a u16
	pub fn from_le_bytes(bytes: [u8; 10]) -> Self {
		let mut mantissa = [0u8; 8];
		mantissa.copy_from_slice(&bytes[..8]);
		let sign_exponent = u16::from_le_bytes([bytes[8], bytes[9]]);
		Self::new(
			sign_exponent & 0x8000 != 0,
			sign_exponent & 0x7FFF,
			u64::from_le_bytes(mantissa),
		)
	}

	pub fn to_le_bytes(self) -> [u8; 10] {
		let mut bytes = [0u8; 10];
		bytes[..8].copy_from_slice(&self.mantissa.to_le_bytes());
		let sign_exponent = self.exponent | if self.sign { 0x8000 } else { 0 };
		bytes[8..].copy_from_slice(&sign_exponent.to_le_bytes());
		bytes
	}

	/// Splits a finite non-zero value into sign, unbounded biased exponent and a mantissa with
	/// bit 63 set. Denormals use an effective exponent of 1.
	pub(crate) fn unpack(&self) -> (bool, i32, u64) {
		debug_assert!(!self.is_special() && self.mantissa != 0);
		let exponent = if self.exponent == 0 { 1 } else { i32::from(self.exponent) };
		let shift = self.mantissa.leading_zeros();
		(self.sign, exponent - shift as i32, self.mantissa << shift)
	}

	/// Re-rounds a finite value under the context's precision control.
	pub(crate) fn rounded(&self, ctx: &mut FpContext) -> Self {
		if self.is_special() || self.mantissa == 0 {
			return *self;
		}
		let (sign, exponent, mantissa) = self.unpack();
		normalize_round(sign, exponent, u128::from(mantissa) << 63, ctx)
	}
}

/// Shifts right, ORing every bit shifted out into bit 0 so rounding still sees them
pub(crate) fn shift_right_jamming(value: u128, count: u32) -> u128 {
	if count == 0 {
		value
	} else if count < 128 {
		(value >> count) | u128::from(value << (128 - count) != 0)
	} else {
		u128::from(value != 0)
	}
}

/// Normalizes a working significand whose binary point sits below bit 126, i.e.
/// value = sig / 2^126 * 2^(exponent - BIAS), then rounds it into an extended value.
pub(crate) fn normalize_round(sign: bool, exponent: i32, sig: u128, ctx: &mut FpContext) -> ExtendedReal {
	if sig == 0 {
		return ExtendedReal::zero(sign);
	}
	let shift = sig.leading_zeros();
	round_pack(sign, exponent + 1 - shift as i32, sig << shift, ctx)
}

/// Rounds a significand with its leading bit at position 127 to the precision selected by the
/// context and packs it, handling overflow and gradual underflow.
pub(crate) fn round_pack(sign: bool, exponent: i32, sig: u128, ctx: &mut FpContext) -> ExtendedReal {
	let bits = ctx.precision.significand_bits();
	let (exponent, kept) = round_significand(sign, exponent, sig, bits, ctx);

	if exponent >= i32::from(SPECIAL_EXPONENT) {
		ctx.raise(Exceptions::OVERFLOW | Exceptions::PRECISION);
		return if ctx.rounding.overflows_to_infinity(sign) {
			ExtendedReal::infinity(sign)
		} else {
			ExtendedReal::max_finite(sign, bits)
		};
	}

	let mantissa = (kept << (64 - bits)) as u64;
	if mantissa == 0 {
		return ExtendedReal::zero(sign);
	}
	ExtendedReal::new(sign, exponent as u16, mantissa)
}

/// Keeps the top `bits` bits of `sig` (leading bit at position 127), rounded by the context's
/// rounding mode. An exponent below 1 denormalizes first and comes back as 0, unless rounding
/// carried the value back into the normal range. Overflow is left to the caller.
pub(crate) fn round_significand(
	sign: bool,
	mut exponent: i32,
	mut sig: u128,
	bits: u32,
	ctx: &mut FpContext,
) -> (i32, u128) {
	let tiny = exponent < 1;
	if tiny {
		sig = shift_right_jamming(sig, (1 - exponent).min(160) as u32);
		exponent = 0;
	}

	let dropped = 128 - bits;
	let half = 1u128 << (dropped - 1);
	let rest = sig & ((1u128 << dropped) - 1);
	let mut kept = sig >> dropped;

	if rest != 0 {
		ctx.raise(Exceptions::PRECISION);
		if tiny {
			ctx.raise(Exceptions::UNDERFLOW);
		}
	}

	if ctx.rounding.rounds_away(sign, kept & 1 != 0, rest, half) {
		kept += 1;
		if kept >> bits != 0 {
			kept >>= 1;
			exponent += 1;
		}
	}

	// a denormal that rounded up into the normal range
	if exponent == 0 && kept >> (bits - 1) != 0 {
		exponent = 1;
	}

	(exponent, kept)
}

/// 64x64 -> 128 bit multiplication from four 32x32 -> 64 partial products.
/// Returns (high, low).
pub(crate) fn mul_64x64(multiplicand: u64, multiplier: u64) -> (u64, u64) {
	let multiplicand_low = multiplicand & 0xFFFF_FFFF;
	let multiplicand_high = multiplicand >> 32;
	let multiplier_low = multiplier & 0xFFFF_FFFF;
	let multiplier_high = multiplier >> 32;

	let mut low = multiplicand_low * multiplier_low;
	let cross1 = multiplicand_low * multiplier_high;
	let cross2 = multiplicand_high * multiplier_low;
	let mut high = multiplicand_high * multiplier_high;

	let (cross, carried) = cross1.overflowing_add(cross2);
	if carried {
		high += 1 << 32;
	}

	let (sum, carried) = low.overflowing_add(cross << 32);
	low = sum;
	if carried {
		high += 1;
	}

	high += cross >> 32;
	(high, low)
}
