use super::consts::opcode::ESC_D9;
use super::{undefined, unsupported};
use crate::insn::{Constant, FpuInstruction, MemFormat, MemRef, Source};
use crate::ty::{FaultKind, FpuRegisterIndex, ModRegRm, RmOperand};

pub fn parse_d9(modrm: &ModRegRm) -> Result<FpuInstruction, FaultKind> {
	use consts::*;

	let mem = match modrm.operand {
		RmOperand::Memory { segment, address } => MemRef { segment, address },
		RmOperand::Register(idx) => return parse_d9_register(modrm, idx),
	};

	match modrm.register {
		FLD => Ok(FpuInstruction::Load(Source::Memory(mem, MemFormat::Single))),
		FST => Ok(FpuInstruction::Store {
			dst: Source::Memory(mem, MemFormat::Single),
			pop: false,
		}),
		FSTP => Ok(FpuInstruction::Store {
			dst: Source::Memory(mem, MemFormat::Single),
			pop: true,
		}),
		FLDENV => Ok(FpuInstruction::LoadEnvironment(mem)),
		FLDCW => Ok(FpuInstruction::LoadControlWord(mem)),
		FNSTENV => Ok(FpuInstruction::StoreEnvironment(mem)),
		FNSTCW => Ok(FpuInstruction::StoreControlWord(mem)),
		_ => Err(undefined(ESC_D9, modrm)),
	}
}

fn parse_d9_register(modrm: &ModRegRm, idx: FpuRegisterIndex) -> Result<FpuInstruction, FaultKind> {
	use consts::register::*;

	let insn = match modrm.register {
		FLD_ST => FpuInstruction::Load(Source::Register(idx)),
		FXCH => FpuInstruction::Exchange(idx),
		_ => match modrm.raw {
			FNOP => FpuInstruction::Nop,
			FCHS => FpuInstruction::ChangeSign,
			FABS => FpuInstruction::Abs,
			FTST => FpuInstruction::Test,
			FXAM => FpuInstruction::Examine,
			FLD1 => FpuInstruction::LoadConstant(Constant::One),
			FLDL2T => FpuInstruction::LoadConstant(Constant::Log2Ten),
			FLDL2E => FpuInstruction::LoadConstant(Constant::Log2E),
			FLDPI => FpuInstruction::LoadConstant(Constant::Pi),
			FLDLG2 => FpuInstruction::LoadConstant(Constant::Log10Two),
			FLDLN2 => FpuInstruction::LoadConstant(Constant::LnTwo),
			FLDZ => FpuInstruction::LoadConstant(Constant::Zero),
			FDECSTP => FpuInstruction::DecrementTop,
			FINCSTP => FpuInstruction::IncrementTop,
			FRNDINT => FpuInstruction::RoundToIntegral,
			F2XM1 => return Err(unsupported(ESC_D9, modrm, "F2XM1")),
			FYL2X => return Err(unsupported(ESC_D9, modrm, "FYL2X")),
			FPTAN => return Err(unsupported(ESC_D9, modrm, "FPTAN")),
			FPATAN => return Err(unsupported(ESC_D9, modrm, "FPATAN")),
			FXTRACT => return Err(unsupported(ESC_D9, modrm, "FXTRACT")),
			FPREM1 => return Err(unsupported(ESC_D9, modrm, "FPREM1")),
			FPREM => return Err(unsupported(ESC_D9, modrm, "FPREM")),
			FYL2XP1 => return Err(unsupported(ESC_D9, modrm, "FYL2XP1")),
			FSQRT => return Err(unsupported(ESC_D9, modrm, "FSQRT")),
			FSINCOS => return Err(unsupported(ESC_D9, modrm, "FSINCOS")),
			FSCALE => return Err(unsupported(ESC_D9, modrm, "FSCALE")),
			FSIN => return Err(unsupported(ESC_D9, modrm, "FSIN")),
			FCOS => return Err(unsupported(ESC_D9, modrm, "FCOS")),
			_ => return Err(undefined(ESC_D9, modrm)),
		},
	};
	Ok(insn)
}

pub mod consts {
	pub const FLD: u8 = 0;
	pub const FST: u8 = 2;
	pub const FSTP: u8 = 3;
	pub const FLDENV: u8 = 4;
	pub const FLDCW: u8 = 5;
	pub const FNSTENV: u8 = 6;
	pub const FNSTCW: u8 = 7;

	pub mod register {
		/// reg field values
		pub const FLD_ST: u8 = 0;
		pub const FXCH: u8 = 1;

		/// full ModRM bytes
		pub const FNOP: u8 = 0xD0;
		pub const FCHS: u8 = 0xE0;
		pub const FABS: u8 = 0xE1;
		pub const FTST: u8 = 0xE4;
		pub const FXAM: u8 = 0xE5;
		pub const FLD1: u8 = 0xE8;
		pub const FLDL2T: u8 = 0xE9;
		pub const FLDL2E: u8 = 0xEA;
		pub const FLDPI: u8 = 0xEB;
		pub const FLDLG2: u8 = 0xEC;
		pub const FLDLN2: u8 = 0xED;
		pub const FLDZ: u8 = 0xEE;
		pub const F2XM1: u8 = 0xF0;
		pub const FYL2X: u8 = 0xF1;
		pub const FPTAN: u8 = 0xF2;
		pub const FPATAN: u8 = 0xF3;
		pub const FXTRACT: u8 = 0xF4;
		pub const FPREM1: u8 = 0xF5;
		pub const FDECSTP: u8 = 0xF6;
		pub const FINCSTP: u8 = 0xF7;
		pub const FPREM: u8 = 0xF8;
		pub const FYL2XP1: u8 = 0xF9;
		pub const FSQRT: u8 = 0xFA;
		pub const FSINCOS: u8 = 0xFB;
		pub const FRNDINT: u8 = 0xFC;
		pub const FSCALE: u8 = 0xFD;
		pub const FSIN: u8 = 0xFE;
		pub const FCOS: u8 = 0xFF;
	}
}
