/// Bits `start..=end` of `value`, shifted down to bit 0
pub fn extract_bits_8(value: u8, start: u8, end: u8) -> u8 {
	debug_assert!(start <= end && end < 8);
	let width = end - start + 1;
	let mask = if width == 8 { u8::MAX } else { (1 << width) - 1 };
	(value >> start) & mask
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn modrm_fields() {
		let modrm = 0b10_011_101;
		assert_eq!(extract_bits_8(modrm, 6, 7), 0b10);
		assert_eq!(extract_bits_8(modrm, 3, 5), 0b011);
		assert_eq!(extract_bits_8(modrm, 0, 2), 0b101);
		assert_eq!(extract_bits_8(modrm, 0, 7), modrm);
	}
}
