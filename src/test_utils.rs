//! Shared test doubles: a scripted node gateway and transaction/block builders.

use crate::cota::constants::ProtocolScripts;
use crate::cota::molecule::WitnessArgs;
use crate::node::{
	Block, CellInput, CellOutput, ChainInfo, Header, NodeError, NodeGateway, OutPoint, Script,
	ScriptHashType, Transaction,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct MockState {
	tip: u64,
	blocks: HashMap<u64, Block>,
	transactions: HashMap<Vec<u8>, Transaction>,
	next_tx: u64,
	failing_block: Option<u64>,
}

/// In-process node gateway driven by the test.
#[derive(Default)]
pub struct MockNode {
	state: Mutex<MockState>,
}

impl MockNode {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn next_tx_hash(&self) -> Vec<u8> {
		let mut state = self.state.lock().unwrap();
		state.next_tx += 1;
		let mut hash = vec![0x70u8; 32];
		hash[24..].copy_from_slice(&state.next_tx.to_be_bytes());
		hash
	}

	pub fn insert_transaction(&self, tx: Transaction) {
		self.state
			.lock()
			.unwrap()
			.transactions
			.insert(tx.hash.clone(), tx);
	}

	pub fn update_transaction(&self, hash: &[u8], update: impl FnOnce(&mut Transaction)) {
		let mut state = self.state.lock().unwrap();
		if let Some(tx) = state.transactions.get_mut(hash) {
			update(tx);
		}
	}

	pub fn remove_transaction(&self, hash: &[u8]) {
		self.state.lock().unwrap().transactions.remove(hash);
	}

	/// Installs a block and moves the tip to it when it is higher.
	pub fn set_block(&self, block: Block) {
		let mut state = self.state.lock().unwrap();
		state.tip = state.tip.max(block.header.number);
		state.blocks.insert(block.header.number, block);
	}

	/// Replaces the chain above `number` (exclusive), simulating a reorg.
	pub fn truncate_above(&self, number: u64) {
		let mut state = self.state.lock().unwrap();
		state.blocks.retain(|height, _| *height <= number);
		state.tip = number;
	}

	pub fn fail_block_fetch(&self, number: Option<u64>) {
		self.state.lock().unwrap().failing_block = number;
	}
}

#[async_trait::async_trait]
impl NodeGateway for MockNode {
	async fn tip_block_number(&self) -> Result<u64, NodeError> {
		Ok(self.state.lock().unwrap().tip)
	}

	async fn block_by_number(&self, number: u64) -> Result<Option<Block>, NodeError> {
		let state = self.state.lock().unwrap();
		if state.failing_block == Some(number) {
			return Err(NodeError::RpcError {
				code: -1,
				message: "connection reset".to_string(),
			});
		}
		Ok(state.blocks.get(&number).cloned())
	}

	async fn transaction(&self, hash: &[u8]) -> Result<Option<Transaction>, NodeError> {
		Ok(self.state.lock().unwrap().transactions.get(hash).cloned())
	}

	async fn chain_info(&self) -> Result<ChainInfo, NodeError> {
		Ok(ChainInfo {
			chain: "ckb_testnet".to_string(),
		})
	}
}

pub fn lock(owner: u8) -> Script {
	Script {
		code_hash: vec![0x10; 32],
		hash_type: ScriptHashType::Type,
		args: vec![owner; 20],
	}
}

pub fn cota_type(mainnet: bool) -> Script {
	Script {
		code_hash: ProtocolScripts::for_chain(mainnet).cota.code_hash,
		hash_type: ScriptHashType::Type,
		args: vec![0xab; 20],
	}
}

pub fn registry_type() -> Script {
	Script {
		code_hash: ProtocolScripts::for_chain(false).registry.code_hash,
		hash_type: ScriptHashType::Type,
		args: Vec::new(),
	}
}

fn cell(lock: Script, type_: Option<Script>) -> CellOutput {
	CellOutput {
		capacity: 150_0000_0000,
		lock,
		type_,
	}
}

/// A testnet protocol transaction consuming and recreating one cell of `type_script`.
pub fn protocol_tx_with_type(
	node: &MockNode,
	type_script: Script,
	version: u8,
	input_type: Option<Vec<u8>>,
	output_type: Option<Vec<u8>>,
) -> Transaction {
	let prev_hash = node.next_tx_hash();
	node.insert_transaction(Transaction {
		hash: prev_hash.clone(),
		inputs: Vec::new(),
		outputs: vec![cell(lock(1), Some(type_script.clone()))],
		outputs_data: vec![vec![version]],
		witnesses: Vec::new(),
	});

	let witness = WitnessArgs {
		lock: Some(vec![0u8; 65]),
		input_type,
		output_type,
	};

	let mut data = vec![version];
	data.extend_from_slice(&[0u8; 32]);

	Transaction {
		hash: node.next_tx_hash(),
		inputs: vec![CellInput {
			previous_output: OutPoint {
				tx_hash: prev_hash,
				index: 0,
			},
			since: 0,
		}],
		outputs: vec![cell(lock(1), Some(type_script))],
		outputs_data: vec![data],
		witnesses: vec![witness.encode()],
	}
}

pub fn protocol_tx(
	node: &MockNode,
	version: u8,
	input_type: Option<Vec<u8>>,
	output_type: Option<Vec<u8>>,
) -> Transaction {
	protocol_tx_with_type(node, cota_type(false), version, input_type, output_type)
}

pub fn block_hash(number: u64, fork: u8) -> Vec<u8> {
	let mut hash = vec![fork; 32];
	hash[24..].copy_from_slice(&number.to_be_bytes());
	hash
}

/// Block `number` on chain `fork`, whose parent is block `number - 1` on chain `parent_fork`.
pub fn block(number: u64, fork: u8, parent_fork: u8, transactions: Vec<Transaction>) -> Block {
	Block {
		header: Header {
			number,
			hash: block_hash(number, fork),
			parent_hash: block_hash(number.saturating_sub(1), parent_fork),
		},
		transactions,
	}
}
