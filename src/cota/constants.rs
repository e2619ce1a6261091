use crate::node::{Script, ScriptHashType};

const MAINNET_COTA_CODE_HASH: &str =
	"1122a4fb54697cf2e6e3a96c9d80fd398a936559b90954c6e88eb7ba0cf652df";
const MAINNET_REGISTRY_CODE_HASH: &str =
	"90ca618be6c15f5857d3cbd09f9f24ca6770af047ba9ee70989ec3b229419ac7";
const TESTNET_COTA_CODE_HASH: &str =
	"89cd8003a0eaf8e65e0c31525b7d1d5c1becefd2ea75bb4cff87810ae37764d8";
const TESTNET_REGISTRY_CODE_HASH: &str =
	"9302db6cc1344b81a5efee06962abcb40427ecfcbe69d471b01b2658ed948075";

/// Which protocol cell a type script identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
	Cota,
	Registry,
}

/// Code hash and hash type of a protocol type script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeScriptId {
	pub code_hash: Vec<u8>,
	pub hash_type: ScriptHashType,
}

impl TypeScriptId {
	fn from_hex(code_hash: &str) -> Self {
		Self {
			// constants above are valid hex
			code_hash: hex::decode(code_hash).unwrap_or_default(),
			hash_type: ScriptHashType::Type,
		}
	}

	pub fn matches(&self, script: &Script) -> bool {
		script.hash_type == self.hash_type && script.code_hash == self.code_hash
	}
}

/// Protocol type scripts for one chain.
#[derive(Debug, Clone)]
pub struct ProtocolScripts {
	pub cota: TypeScriptId,
	pub registry: TypeScriptId,
}

impl ProtocolScripts {
	pub fn for_chain(is_mainnet: bool) -> Self {
		if is_mainnet {
			Self {
				cota: TypeScriptId::from_hex(MAINNET_COTA_CODE_HASH),
				registry: TypeScriptId::from_hex(MAINNET_REGISTRY_CODE_HASH),
			}
		} else {
			Self {
				cota: TypeScriptId::from_hex(TESTNET_COTA_CODE_HASH),
				registry: TypeScriptId::from_hex(TESTNET_REGISTRY_CODE_HASH),
			}
		}
	}

	/// Classifies a type script, `None` when it is not a protocol cell.
	pub fn classify(&self, script: &Script) -> Option<CellKind> {
		if self.cota.matches(script) {
			Some(CellKind::Cota)
		} else if self.registry.matches(script) {
			Some(CellKind::Registry)
		} else {
			None
		}
	}
}
