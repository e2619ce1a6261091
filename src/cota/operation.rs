/// Operation carried in the first byte of a cota input-type payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
	Define,
	Mint,
	Withdraw,
	Claim,
	Update,
	Transfer,
	ClaimUpdate,
	TransferUpdate,
	/// Unknown code; produces no mutations.
	Ignored(u8),
}

impl Operation {
	pub fn from_code(code: u8) -> Self {
		match code {
			1 => Operation::Define,
			2 => Operation::Mint,
			3 => Operation::Withdraw,
			4 => Operation::Claim,
			5 => Operation::Update,
			6 => Operation::Transfer,
			7 => Operation::ClaimUpdate,
			8 => Operation::TransferUpdate,
			other => Operation::Ignored(other),
		}
	}

	/// Splits a payload into its operation and the entry table that follows.
	pub fn split(payload: &[u8]) -> Option<(Self, &[u8])> {
		let (code, rest) = payload.split_first()?;
		Some((Self::from_code(*code), rest))
	}

	pub fn name(&self) -> &'static str {
		match self {
			Operation::Define => "define",
			Operation::Mint => "mint",
			Operation::Withdraw => "withdraw",
			Operation::Claim => "claim",
			Operation::Update => "update",
			Operation::Transfer => "transfer",
			Operation::ClaimUpdate => "claim-update",
			Operation::TransferUpdate => "transfer-update",
			Operation::Ignored(_) => "ignored",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decode_is_total() {
		for code in 0..=u8::MAX {
			let operation = Operation::from_code(code);
			match code {
				1..=8 => assert!(!matches!(operation, Operation::Ignored(_))),
				_ => assert_eq!(operation, Operation::Ignored(code)),
			}
		}
	}

	#[test]
	fn split_separates_code_from_entries() {
		assert_eq!(
			Operation::split(&[7, 0xaa, 0xbb]),
			Some((Operation::ClaimUpdate, &[0xaa, 0xbb][..]))
		);
		assert_eq!(Operation::split(&[]), None);
	}
}
