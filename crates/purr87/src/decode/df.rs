use super::{memory_operand, undefined, unsupported};
use crate::insn::{FpuInstruction, MemFormat, Source, StatusDest};
use crate::ty::{FaultKind, ModRegRm};

pub fn parse_df(modrm: &ModRegRm) -> Result<FpuInstruction, FaultKind> {
	use super::consts::opcode::ESC_DF;
	use consts::*;

	let Some(mem) = memory_operand(modrm) else {
		return match modrm.raw {
			register::FNSTSW_AX => Ok(FpuInstruction::StoreStatusWord(StatusDest::Ax)),
			_ => Err(undefined(ESC_DF, modrm)),
		};
	};

	match modrm.register {
		FILD => Ok(FpuInstruction::Load(Source::Memory(mem, MemFormat::Int16))),
		FIST | FISTP => Ok(FpuInstruction::Store {
			dst: Source::Memory(mem, MemFormat::Int16),
			pop: modrm.register == FISTP,
		}),
		FBLD => Err(unsupported(ESC_DF, modrm, "FBLD")),
		FILD_64 => Ok(FpuInstruction::Load(Source::Memory(mem, MemFormat::Int64))),
		FBSTP => Err(unsupported(ESC_DF, modrm, "FBSTP")),
		FISTP_64 => Ok(FpuInstruction::Store {
			dst: Source::Memory(mem, MemFormat::Int64),
			pop: true,
		}),
		_ => Err(undefined(ESC_DF, modrm)),
	}
}

pub mod consts {
	pub const FILD: u8 = 0;
	pub const FIST: u8 = 2;
	pub const FISTP: u8 = 3;
	pub const FBLD: u8 = 4;
	pub const FILD_64: u8 = 5;
	pub const FBSTP: u8 = 6;
	pub const FISTP_64: u8 = 7;

	pub mod register {
		pub const FNSTSW_AX: u8 = 0xE0;
	}
}
