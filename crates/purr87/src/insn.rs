use crate::soft::extended::BIAS;
use crate::soft::{ExtendedReal, RoundingMode};
use crate::ty::{FpuRegisterIndex, SegmentReg};

/// Memory operand encodings an FPU instruction can name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemFormat {
	Int16,
	Int32,
	Int64,
	Single,
	Double,
	Extended,
}

impl MemFormat {
	pub const fn size(self) -> usize {
		match self {
			Self::Int16 => 2,
			Self::Int32 | Self::Single => 4,
			Self::Int64 | Self::Double => 8,
			Self::Extended => 10,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRef {
	pub segment: SegmentReg,
	pub address: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
	Register(FpuRegisterIndex),
	Memory(MemRef, MemFormat),
}

pub type Destination = Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithKind {
	Add,
	Mul,
	Sub,
	Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDest {
	Memory(MemRef),
	Ax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
	One,
	Log2Ten,
	Log2E,
	Pi,
	Log10Two,
	LnTwo,
	Zero,
}

impl Constant {
	/// The hardware keeps these constants to 66 bits and rounds them by the active rounding mode
	pub const fn value(self, rounding: RoundingMode) -> ExtendedReal {
		// (exponent, mantissa rounded to nearest, whether nearest rounded up)
		let (exponent, nearest, rounded_up) = match self {
			Self::One => return ExtendedReal::ONE,
			Self::Zero => return ExtendedReal::ZERO,
			Self::Log2Ten => (BIAS as u16 + 1, 0xD49A_784B_CD1B_8AFE, false),
			Self::Log2E => (BIAS as u16, 0xB8AA_3B29_5C17_F0BC, true),
			Self::Pi => (BIAS as u16 + 1, 0xC90F_DAA2_2168_C235, true),
			Self::Log10Two => (BIAS as u16 - 2, 0x9A20_9A84_FBCF_F799, true),
			Self::LnTwo => (BIAS as u16 - 1, 0xB172_17F7_D1CF_79AC, true),
		};

		let mantissa = match rounding {
			RoundingMode::RoundDown | RoundingMode::RoundTowardsZero if rounded_up => nearest - 1,
			RoundingMode::RoundUp if !rounded_up => nearest + 1,
			_ => nearest,
		};
		ExtendedReal::new(false, exponent, mantissa)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuInstruction {
	/// dst = dst op src, or src op dst when reversed
	Arith {
		kind: ArithKind,
		reversed: bool,
		dst: FpuRegisterIndex,
		src: Source,
		pop: bool,
	},
	/// compares ST(0) against `src`; unordered compares only complain about signaling NaNs
	Compare {
		src: Source,
		pops: u8,
		unordered: bool,
	},

	Load(Source),
	LoadConstant(Constant),
	Store {
		dst: Destination,
		pop: bool,
	},
	Exchange(FpuRegisterIndex),
	Free(FpuRegisterIndex),

	ChangeSign,
	Abs,
	Test,
	Examine,
	RoundToIntegral,
	IncrementTop,
	DecrementTop,
	/// FNOP and the 8087/287 leftovers FENI, FDISI and FSETPM
	Nop,

	LoadControlWord(MemRef),
	StoreControlWord(MemRef),
	StoreStatusWord(StatusDest),
	LoadEnvironment(MemRef),
	StoreEnvironment(MemRef),
	Restore(MemRef),
	Save(MemRef),
	ClearExceptions,
	Init,
}
