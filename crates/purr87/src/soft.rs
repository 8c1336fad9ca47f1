use bitflags::bitflags;

pub mod arith;
pub mod convert;
pub mod double;
pub mod extended;
pub mod float;

pub use extended::ExtendedReal;

/// Classes reported by FXAM in C3/C2/C0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedClass {
	Unsupported,
	NaN,
	Normal,
	Infinity,
	Zero,
	Empty,
	Denormal,
}

impl ExtendedClass {
	/// Returns (C3, C2, C0)
	pub const fn condition_codes(self) -> (bool, bool, bool) {
		match self {
			Self::Unsupported => (false, false, false),
			Self::NaN => (false, false, true),
			Self::Normal => (false, true, false),
			Self::Infinity => (false, true, true),
			Self::Zero => (true, false, false),
			Self::Empty => (true, false, true),
			Self::Denormal => (true, true, false),
		}
	}
}

/// The RC field of the control word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoundingMode {
	/// Round to Nearest, ties to Even
	#[default]
	RoundToNearestTieEven = 0,
	/// Round Down (towards neg infinity)
	RoundDown = 1,
	/// Round Up (towards pos infinity)
	RoundUp = 2,
	/// Round towards Zero (truncate)
	RoundTowardsZero = 3,
}

impl RoundingMode {
	pub const fn from_u8(value: u8) -> Self {
		match value & 0b11 {
			0b00 => Self::RoundToNearestTieEven,
			0b01 => Self::RoundDown,
			0b10 => Self::RoundUp,
			_ => Self::RoundTowardsZero,
		}
	}

	pub const fn to_u8(self) -> u8 {
		self as u8
	}

	/// Decides whether a magnitude whose discarded low part is `rest` gets bumped by one unit.
	/// `half` is the weight of the most significant discarded bit.
	pub fn rounds_away(self, negative: bool, odd: bool, rest: u128, half: u128) -> bool {
		match self {
			Self::RoundToNearestTieEven => rest > half || (rest == half && odd),
			Self::RoundDown => rest != 0 && negative,
			Self::RoundUp => rest != 0 && !negative,
			Self::RoundTowardsZero => false,
		}
	}

	/// Masked overflow produces infinity when rounding away from zero in the direction of the
	/// result, and the largest finite value otherwise.
	pub fn overflows_to_infinity(self, negative: bool) -> bool {
		match self {
			Self::RoundToNearestTieEven => true,
			Self::RoundDown => negative,
			Self::RoundUp => !negative,
			Self::RoundTowardsZero => false,
		}
	}
}

/// The PC field of the control word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrecisionControl {
	Single = 0,
	Reserved = 1,
	Double = 2,
	#[default]
	Extended = 3,
}

impl PrecisionControl {
	pub const fn from_u8(value: u8) -> Self {
		match value & 0b11 {
			0b00 => Self::Single,
			0b01 => Self::Reserved,
			0b10 => Self::Double,
			_ => Self::Extended,
		}
	}

	pub const fn to_u8(self) -> u8 {
		self as u8
	}

	pub const fn significand_bits(self) -> u32 {
		match self {
			Self::Single => 24,
			Self::Double => 53,
			Self::Reserved | Self::Extended => 64,
		}
	}
}

bitflags! {
	/// Sticky numeric exception flags, laid out like the low bits of the status word
	#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
	pub struct Exceptions: u16 {
		const INVALID = 1 << 0;
		const DENORMAL = 1 << 1;
		const ZERO_DIVIDE = 1 << 2;
		const OVERFLOW = 1 << 3;
		const UNDERFLOW = 1 << 4;
		const PRECISION = 1 << 5;
	}
}

/// Everything a primitive needs besides its operands: the rounding configuration taken from the
/// control word and the exceptions raised so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FpContext {
	pub rounding: RoundingMode,
	pub precision: PrecisionControl,
	pub exceptions: Exceptions,
}

impl FpContext {
	pub fn new(rounding: RoundingMode, precision: PrecisionControl) -> Self {
		Self {
			rounding,
			precision,
			exceptions: Exceptions::empty(),
		}
	}

	pub fn raise(&mut self, flags: Exceptions) {
		self.exceptions |= flags;
	}
}
