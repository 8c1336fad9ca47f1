pub mod arith;
pub mod d9;
pub mod db;
pub mod dd;
pub mod df;

use crate::insn::{FpuInstruction, MemRef};
use crate::ty::{FaultKind, ModRegRm, RmOperand};
use tracing::*;

/// Decodes one escape opcode (D8..DF) and its ModRM into an instruction.
/// Encodings with no x87 meaning come back as the fault to raise.
pub fn parse(opcode: u8, modrm: &ModRegRm) -> Result<FpuInstruction, FaultKind> {
	use consts::opcode::*;
	match opcode {
		ESC_D8 | ESC_DA | ESC_DC | ESC_DE => arith::parse_arith(opcode, modrm),
		ESC_D9 => d9::parse_d9(modrm),
		ESC_DB => db::parse_db(modrm),
		ESC_DD => dd::parse_dd(modrm),
		ESC_DF => df::parse_df(modrm),
		_ => Err(undefined(opcode, modrm)),
	}
}

pub(crate) fn undefined(opcode: u8, modrm: &ModRegRm) -> FaultKind {
	FaultKind::UndefinedOpcode {
		opcode,
		modrm: modrm.raw,
	}
}

/// Valid x87 instructions this unit does not implement fault like undefined ones
pub(crate) fn unsupported(opcode: u8, modrm: &ModRegRm, mnemonic: &'static str) -> FaultKind {
	warn!("{mnemonic} is not implemented");
	undefined(opcode, modrm)
}

pub(crate) fn memory_operand(modrm: &ModRegRm) -> Option<MemRef> {
	match modrm.operand {
		RmOperand::Memory { segment, address } => Some(MemRef { segment, address }),
		RmOperand::Register(_) => None,
	}
}

pub mod consts {
	pub mod opcode {
		pub const ESC_D8: u8 = 0xD8;
		pub const ESC_D9: u8 = 0xD9;
		pub const ESC_DA: u8 = 0xDA;
		pub const ESC_DB: u8 = 0xDB;
		pub const ESC_DC: u8 = 0xDC;
		pub const ESC_DD: u8 = 0xDD;
		pub const ESC_DE: u8 = 0xDE;
		pub const ESC_DF: u8 = 0xDF;
	}
}
