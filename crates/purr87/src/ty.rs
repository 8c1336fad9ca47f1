use std::fmt::Debug;
use std::marker::PhantomData;

use thiserror::Error;

use crate::machine::GPRegisters;
use crate::regs::FpuRegisters;

// The register file types are only used as markers so an ST(i) index can't be
// handed to something expecting a general purpose register.
pub type GPRegisterIndex = RegisterIndex<GPRegisters>;
pub type FpuRegisterIndex = RegisterIndex<FpuRegisters>;

/// a valid register index 0..=7
pub struct RegisterIndex<T>(u8, PhantomData<T>);

impl<T> Clone for RegisterIndex<T> {
	fn clone(&self) -> Self {
		*self
	}
}
impl<T> Copy for RegisterIndex<T> {}

impl<T> PartialEq for RegisterIndex<T> {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}

impl<T> Eq for RegisterIndex<T> {}

impl<T> RegisterIndex<T> {
	pub fn new(idx: u8) -> Option<Self> {
		if idx <= 7 {
			Some(Self(idx, PhantomData))
		} else {
			None
		}
	}

	/// Takes the low three bits, as found in the reg and rm fields of a ModRM byte
	pub const fn from_bits(bits: u8) -> Self {
		Self(bits & 0b111, PhantomData)
	}

	pub fn as_usize(&self) -> usize {
		debug_assert!(self.0 <= 7);
		usize::from(self.0 & 0b111)
	}

	pub const fn as_u8(&self) -> u8 {
		self.0
	}
}

impl FpuRegisterIndex {
	pub const ST0: FpuRegisterIndex = RegisterIndex(0, PhantomData);
	pub const ST1: FpuRegisterIndex = RegisterIndex(1, PhantomData);
}

#[allow(unused)]
impl GPRegisterIndex {
	pub const EAX: GPRegisterIndex = RegisterIndex(0, PhantomData);
	pub const ECX: GPRegisterIndex = RegisterIndex(1, PhantomData);
	pub const EDX: GPRegisterIndex = RegisterIndex(2, PhantomData);
	pub const EBX: GPRegisterIndex = RegisterIndex(3, PhantomData);
	pub const ESP: GPRegisterIndex = RegisterIndex(4, PhantomData);
	pub const EBP: GPRegisterIndex = RegisterIndex(5, PhantomData);
	pub const ESI: GPRegisterIndex = RegisterIndex(6, PhantomData);
	pub const EDI: GPRegisterIndex = RegisterIndex(7, PhantomData);
}

impl Debug for FpuRegisterIndex {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "ST({})", self.0)
	}
}

impl Debug for GPRegisterIndex {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let r = match self.0 {
			0 => "eax",
			1 => "ecx",
			2 => "edx",
			3 => "ebx",
			4 => "esp",
			5 => "ebp",
			6 => "esi",
			7 => "edi",
			_ => unreachable!(),
		};
		write!(f, "Reg({})", r)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentReg {
	ES,
	CS,
	SS,
	DS,
	FS,
	GS,
}

/// A ModRM byte after address decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRegRm {
	/// the raw byte, kept for fault reporting
	pub raw: u8,
	/// the reg field, an opcode extension for every FPU instruction
	pub register: u8,
	pub operand: RmOperand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmOperand {
	Memory { segment: SegmentReg, address: u32 },
	/// mod == 0b11, the rm field names ST(i)
	Register(FpuRegisterIndex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FaultKind {
	#[error("undefined opcode {opcode:#04X} /{modrm:#04X}")]
	UndefinedOpcode { opcode: u8, modrm: u8 },
	#[error("page fault at {address:#010X} (write: {write})")]
	PageFault { address: u32, write: bool },
	#[error("general protection fault at {address:#010X}")]
	GeneralProtection { address: u32 },
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn register_indices() {
		assert!(FpuRegisterIndex::new(8).is_none());
		assert_eq!(FpuRegisterIndex::from_bits(0b1101_1011), FpuRegisterIndex::new(3).unwrap());
		assert_eq!(format!("{:?}", FpuRegisterIndex::ST1), "ST(1)");
		assert_eq!(format!("{:?}", GPRegisterIndex::EBP), "Reg(ebp)");
	}

	#[test]
	fn fault_messages() {
		let fault = FaultKind::PageFault {
			address: 0x1000,
			write: true,
		};
		assert_eq!(fault.to_string(), "page fault at 0x00001000 (write: true)");
		let fault = FaultKind::UndefinedOpcode {
			opcode: 0xD9,
			modrm: 0xF0,
		};
		assert_eq!(fault.to_string(), "undefined opcode 0xD9 /0xF0");
	}
}
