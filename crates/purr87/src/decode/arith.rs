use super::undefined;
use crate::insn::{ArithKind, FpuInstruction, MemFormat, MemRef, Source};
use crate::ty::{FaultKind, FpuRegisterIndex, ModRegRm, RmOperand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpDescriptor {
	Arith { kind: ArithKind, reversed: bool },
	Compare { pops: u8 },
}

/// What the reg field means in D8, DA, DC and DE
pub const ARITH_TABLE: [OpDescriptor; 8] = [
	OpDescriptor::Arith {
		kind: ArithKind::Add,
		reversed: false,
	},
	OpDescriptor::Arith {
		kind: ArithKind::Mul,
		reversed: false,
	},
	OpDescriptor::Compare { pops: 0 },
	OpDescriptor::Compare { pops: 1 },
	OpDescriptor::Arith {
		kind: ArithKind::Sub,
		reversed: false,
	},
	OpDescriptor::Arith {
		kind: ArithKind::Sub,
		reversed: true,
	},
	OpDescriptor::Arith {
		kind: ArithKind::Div,
		reversed: false,
	},
	OpDescriptor::Arith {
		kind: ArithKind::Div,
		reversed: true,
	},
];

pub fn parse_arith(opcode: u8, modrm: &ModRegRm) -> Result<FpuInstruction, FaultKind> {
	use super::consts::opcode::*;
	use consts::*;

	let descriptor = ARITH_TABLE[usize::from(modrm.register & 0b111)];

	let idx = match modrm.operand {
		RmOperand::Memory { segment, address } => {
			let format = match opcode {
				ESC_D8 => MemFormat::Single,
				ESC_DA => MemFormat::Int32,
				ESC_DC => MemFormat::Double,
				_ => MemFormat::Int16,
			};
			let src = Source::Memory(MemRef { segment, address }, format);
			return Ok(match descriptor {
				OpDescriptor::Arith { kind, reversed } => FpuInstruction::Arith {
					kind,
					reversed,
					dst: FpuRegisterIndex::ST0,
					src,
					pop: false,
				},
				OpDescriptor::Compare { pops } => FpuInstruction::Compare {
					src,
					pops,
					unordered: false,
				},
			});
		}
		RmOperand::Register(idx) => idx,
	};

	match (opcode, descriptor) {
		(ESC_D8, OpDescriptor::Arith { kind, reversed }) => Ok(FpuInstruction::Arith {
			kind,
			reversed,
			dst: FpuRegisterIndex::ST0,
			src: Source::Register(idx),
			pop: false,
		}),
		// DC D0+i and DC D8+i are aliases of FCOM and FCOMP
		(ESC_D8 | ESC_DC, OpDescriptor::Compare { pops }) => Ok(FpuInstruction::Compare {
			src: Source::Register(idx),
			pops,
			unordered: false,
		}),
		(ESC_DC | ESC_DE, OpDescriptor::Arith { kind, reversed }) => Ok(FpuInstruction::Arith {
			kind,
			reversed: swap_reversed(kind, reversed),
			dst: idx,
			src: Source::Register(FpuRegisterIndex::ST0),
			pop: opcode == ESC_DE,
		}),
		(ESC_DE, OpDescriptor::Compare { pops: 1 }) if modrm.raw == FCOMPP => Ok(FpuInstruction::Compare {
			src: Source::Register(FpuRegisterIndex::ST1),
			pops: 2,
			unordered: false,
		}),
		(ESC_DA, _) if modrm.raw == FUCOMPP => Ok(FpuInstruction::Compare {
			src: Source::Register(FpuRegisterIndex::ST1),
			pops: 2,
			unordered: true,
		}),
		_ => Err(undefined(opcode, modrm)),
	}
}

/// The ST(i) destination forms encode SUB/SUBR and DIV/DIVR the other way around
fn swap_reversed(kind: ArithKind, reversed: bool) -> bool {
	match kind {
		ArithKind::Sub | ArithKind::Div => !reversed,
		ArithKind::Add | ArithKind::Mul => reversed,
	}
}

pub mod consts {
	/// full ModRM bytes
	pub const FCOMPP: u8 = 0xD9;
	pub const FUCOMPP: u8 = 0xE9;
}
