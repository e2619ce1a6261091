//! Witness entry parser.
//!
//! A transaction is relevant when one of its outputs carries a protocol type script. Protocol cells
//! are grouped by type hash on both sides of the transaction; for every group present in inputs and
//! outputs, the witness at the first input's index holds the operation payload and the first
//! output supplies the owner lock and the protocol version.

use super::constants::{CellKind, ProtocolScripts};
use super::molecule::WitnessArgs;
use super::CotaError;
use crate::node::{Block, NodeGateway, NodeError, Script, Transaction};
use crate::utils::script_hash;

use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;

/// Which witness field an entry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPayload {
	/// Operation payload, routed through the dispatcher.
	InputType(Vec<u8>),
	/// Metadata payload, read by the metadata stream.
	OutputType(Vec<u8>),
}

/// A decoded witness payload plus its transaction context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
	pub kind: CellKind,
	pub payload: EntryPayload,
	pub lock_script: Script,
	pub tx_index: u32,
	pub tx_hash: Vec<u8>,
	pub version: u8,
}

/// Extracts protocol entries from transaction witnesses.
#[derive(Debug, Clone)]
pub struct WitnessEntryParser {
	scripts: ProtocolScripts,
}

impl WitnessEntryParser {
	pub fn new(scripts: ProtocolScripts) -> Self {
		Self { scripts }
	}

	/// Parse every transaction of a block, in block order.
	pub async fn parse_block<N: NodeGateway + ?Sized>(
		&self,
		node: &N,
		block: &Block,
	) -> Result<Vec<Entry>, CotaError> {
		let mut entries = Vec::new();
		for (tx_index, tx) in block.transactions.iter().enumerate() {
			entries.extend(self.parse_transaction(node, tx, tx_index as u32).await?);
		}
		Ok(entries)
	}

	/// Parse one transaction into zero or more entries.
	pub async fn parse_transaction<N: NodeGateway + ?Sized>(
		&self,
		node: &N,
		tx: &Transaction,
		tx_index: u32,
	) -> Result<Vec<Entry>, CotaError> {
		let output_groups = tx
			.outputs
			.iter()
			.enumerate()
			.filter_map(|(index, output)| {
				let type_script = output.type_.as_ref()?;
				let kind = self.scripts.classify(type_script)?;
				Some((script_hash(type_script), (index, kind)))
			})
			.into_group_map();

		if output_groups.is_empty() {
			return Ok(Vec::new());
		}

		let input_groups = self.resolve_protocol_inputs(node, tx).await?;

		let mut entries = Vec::new();
		let ordered = output_groups
			.iter()
			.sorted_by_key(|(_, cells)| cells[0].0);

		for (type_hash, cells) in ordered {
			let Some(input_indices) = input_groups.get(type_hash) else {
				continue;
			};
			let witness_index = input_indices[0];
			let (output_index, kind) = cells[0];

			let witness = tx.witnesses.get(witness_index).map(Vec::as_slice).unwrap_or_default();
			if witness.is_empty() {
				debug!(
					"No data: empty witness {} in tx 0x{}",
					witness_index,
					hex::encode(&tx.hash)
				);
				continue;
			}

			let witness_args = WitnessArgs::decode(witness)?;
			let version = tx
				.outputs_data
				.get(output_index)
				.and_then(|data| data.first().copied())
				.unwrap_or(0);
			let lock_script = tx.outputs[output_index].lock.clone();

			let payloads = [
				witness_args.input_type.map(EntryPayload::InputType),
				witness_args.output_type.map(EntryPayload::OutputType),
			];
			let before = entries.len();
			for payload in payloads.into_iter().flatten() {
				let empty = match &payload {
					EntryPayload::InputType(data) | EntryPayload::OutputType(data) => data.is_empty(),
				};
				if empty {
					continue;
				}
				entries.push(Entry {
					kind,
					payload,
					lock_script: lock_script.clone(),
					tx_index,
					tx_hash: tx.hash.clone(),
					version,
				});
			}

			if entries.len() == before {
				debug!(
					"No data: witness {} of tx 0x{} has no type fields",
					witness_index,
					hex::encode(&tx.hash)
				);
			}
		}

		Ok(entries)
	}

	/// Map of type hash to input indices of protocol cells consumed by `tx`.
	async fn resolve_protocol_inputs<N: NodeGateway + ?Sized>(
		&self,
		node: &N,
		tx: &Transaction,
	) -> Result<HashMap<[u8; 32], Vec<usize>>, CotaError> {
		let mut previous: HashMap<Vec<u8>, Transaction> = HashMap::new();
		let mut resolved = Vec::new();

		for (index, input) in tx.inputs.iter().enumerate() {
			let out_point = &input.previous_output;
			if out_point.tx_hash.iter().all(|byte| *byte == 0) {
				// cellbase
				continue;
			}

			if !previous.contains_key(&out_point.tx_hash) {
				let prev_tx = node.transaction(&out_point.tx_hash).await?.ok_or_else(|| {
					NodeError::NoData(format!(
						"previous transaction 0x{}",
						hex::encode(&out_point.tx_hash)
					))
				})?;
				previous.insert(out_point.tx_hash.clone(), prev_tx);
			}

			let type_script = previous
				.get(&out_point.tx_hash)
				.and_then(|prev_tx| prev_tx.outputs.get(out_point.index as usize))
				.and_then(|output| output.type_.as_ref());

			if let Some(type_script) = type_script {
				if self.scripts.classify(type_script).is_some() {
					resolved.push((script_hash(type_script), index));
				}
			}
		}

		Ok(resolved.into_iter().into_group_map())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::{
		MockNode, cota_type, lock, protocol_tx, protocol_tx_with_type, registry_type,
	};

	fn parser() -> WitnessEntryParser {
		WitnessEntryParser::new(ProtocolScripts::for_chain(false))
	}

	#[tokio::test]
	async fn transaction_without_protocol_outputs_is_ignored() {
		let node = MockNode::new();
		let mut tx = protocol_tx(&node, 1, Some(vec![1]), None);
		tx.outputs[0].type_ = None;

		let entries = parser().parse_transaction(&node, &tx, 0).await.unwrap();
		assert!(entries.is_empty());
	}

	#[tokio::test]
	async fn input_type_becomes_entry_with_context() {
		let node = MockNode::new();
		let tx = protocol_tx(&node, 1, Some(vec![0x01, 0xaa]), None);

		let entries = parser().parse_transaction(&node, &tx, 3).await.unwrap();
		assert_eq!(entries.len(), 1);
		let entry = &entries[0];
		assert_eq!(entry.kind, CellKind::Cota);
		assert_eq!(entry.payload, EntryPayload::InputType(vec![0x01, 0xaa]));
		assert_eq!(entry.tx_index, 3);
		assert_eq!(entry.version, 1);
		assert_eq!(entry.lock_script, lock(1));
		assert_eq!(entry.tx_hash, tx.hash);
	}

	#[tokio::test]
	async fn registry_cells_are_classified() {
		let node = MockNode::new();
		let tx = protocol_tx_with_type(&node, registry_type(), 0, Some(vec![0xaa]), None);

		let entries = parser().parse_transaction(&node, &tx, 0).await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].kind, CellKind::Registry);
	}

	#[tokio::test]
	async fn both_fields_yield_two_entries() {
		let node = MockNode::new();
		let tx = protocol_tx(&node, 0, Some(vec![0x05]), Some(b"{}".to_vec()));

		let entries = parser().parse_transaction(&node, &tx, 0).await.unwrap();
		assert_eq!(entries.len(), 2);
		assert!(matches!(entries[0].payload, EntryPayload::InputType(_)));
		assert!(matches!(entries[1].payload, EntryPayload::OutputType(_)));
	}

	#[tokio::test]
	async fn empty_witness_is_no_data() {
		let node = MockNode::new();
		let mut tx = protocol_tx(&node, 0, Some(vec![1]), None);
		tx.witnesses[0] = Vec::new();

		let entries = parser().parse_transaction(&node, &tx, 0).await.unwrap();
		assert!(entries.is_empty());
	}

	#[tokio::test]
	async fn witness_without_type_fields_is_no_data() {
		let node = MockNode::new();
		let tx = protocol_tx(&node, 0, None, None);

		let entries = parser().parse_transaction(&node, &tx, 0).await.unwrap();
		assert!(entries.is_empty());
	}

	#[tokio::test]
	async fn output_only_protocol_cell_is_not_matched() {
		let node = MockNode::new();
		let mut tx = protocol_tx(&node, 0, Some(vec![1]), None);
		// the consumed cell carries an unrelated type
		let prev_hash = tx.inputs[0].previous_output.tx_hash.clone();
		node.update_transaction(&prev_hash, |prev| {
			prev.outputs[0].type_ = None;
		});
		tx.outputs[0].type_ = Some(cota_type(false));

		let entries = parser().parse_transaction(&node, &tx, 0).await.unwrap();
		assert!(entries.is_empty());
	}

	#[tokio::test]
	async fn malformed_witness_is_an_error() {
		let node = MockNode::new();
		let mut tx = protocol_tx(&node, 0, Some(vec![1]), None);
		tx.witnesses[0] = vec![0xff, 0x00];

		let result = parser().parse_transaction(&node, &tx, 0).await;
		assert!(matches!(result, Err(CotaError::Decode(_))));
	}

	#[tokio::test]
	async fn missing_previous_transaction_is_a_node_error() {
		let node = MockNode::new();
		let tx = protocol_tx(&node, 0, Some(vec![1]), None);
		node.remove_transaction(&tx.inputs[0].previous_output.tx_hash);

		let result = parser().parse_transaction(&node, &tx, 0).await;
		assert!(matches!(result, Err(CotaError::Node(NodeError::NoData(_)))));
	}
}
