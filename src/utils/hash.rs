use crate::cota::molecule::encode_script;
use crate::node::Script;

const CKB_HASH_PERSONALIZATION: &[u8] = b"ckb-default-hash";

/// Blake2b-256 with the chain's personalization.
pub fn ckb_hash(data: &[u8]) -> [u8; 32] {
	let hash = blake2b_simd::Params::new()
		.hash_length(32)
		.personal(CKB_HASH_PERSONALIZATION)
		.hash(data);
	let mut out = [0u8; 32];
	out.copy_from_slice(hash.as_bytes());
	out
}

/// Script hash as computed by the chain (lock hash / type hash).
pub fn script_hash(script: &Script) -> [u8; 32] {
	ckb_hash(&encode_script(script))
}

/// CRC32 of a hex identifier, used as a cheap pre-filter before exact comparison.
pub fn crc32(value: &str) -> u32 {
	crc32fast::hash(value.as_bytes())
}
