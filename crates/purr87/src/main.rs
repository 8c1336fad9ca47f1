use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use purr87::machine::Machine;
use purr87::soft::RoundingMode;
use tracing::*;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[derive(Debug, Parser)]
#[command(version)]
struct CliArgs {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Runs a flat binary of 32-bit x87 code and prints the final FPU state
	Run {
		#[arg()]
		program: PathBuf,
		/// writable memory image
		#[arg(long)]
		data: Option<PathBuf>,
		#[arg(long, value_parser = parse_dec_or_hex, default_value_t = Machine::DEFAULT_DATA_BASE)]
		data_base: u32,
		/// overrides the rounding control field of the initial control word
		#[arg(long, value_enum)]
		rounding: Option<Rounding>,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Rounding {
	Nearest,
	Down,
	Up,
	Truncate,
}

impl From<Rounding> for RoundingMode {
	fn from(value: Rounding) -> Self {
		match value {
			Rounding::Nearest => RoundingMode::RoundToNearestTieEven,
			Rounding::Down => RoundingMode::RoundDown,
			Rounding::Up => RoundingMode::RoundUp,
			Rounding::Truncate => RoundingMode::RoundTowardsZero,
		}
	}
}

fn parse_dec_or_hex(s: &str) -> Result<u32, <u32 as FromStr>::Err> {
	if let Some(hex) = s.strip_prefix("0x") {
		u32::from_str_radix(hex, 16)
	} else {
		// try decimal and non-prefixed hex
		u32::from_str_radix(s, 10).or_else(|_| u32::from_str_radix(s, 16))
	}
}

fn main() -> anyhow::Result<()> {
	tracing_subscriber::registry()
		.with(tracing_subscriber::fmt::layer().without_time())
		.with(tracing_subscriber::EnvFilter::from_default_env())
		.init();

	let cli = CliArgs::parse();

	match cli.command {
		Commands::Run {
			program,
			data,
			data_base,
			rounding,
		} => {
			let mut machine = init_machine(program, data, data_base)?;
			if let Some(rounding) = rounding {
				let mode = RoundingMode::from(rounding);
				let control = (machine.fpu.control_word() & !0x0C00) | (u16::from(mode.to_u8()) << 10);
				machine.fpu.csrs.load_control(control);
			}

			let result = machine.run();
			println!("{machine}");
			result.map_err(|fault| anyhow!("execution stopped at {:#010X}: {fault}", machine.cpu.ip))
		}
	}
}

fn init_machine(program: PathBuf, data: Option<PathBuf>, data_base: u32) -> anyhow::Result<Machine> {
	let code = fs::read(&program).with_context(|| format!("could not read program {}", program.display()))?;
	let data = match data {
		Some(path) => fs::read(&path).with_context(|| format!("could not read data image {}", path.display()))?,
		None => Vec::new(),
	};
	info!(
		"loaded {} bytes of code and {} bytes of data at {data_base:#010X}",
		code.len(),
		data.len()
	);

	Machine::new(code, data, data_base).map_err(|page| anyhow!("data image overlaps the program or stack at {page:?}"))
}
