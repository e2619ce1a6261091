//! Issuer and class metadata.
//!
//! Metadata lives in the output-type field of a cota witness as a JSON envelope
//! `{id, ver, metadata: {target, type, data}}`. Only `issuer` and `cota` types produce records;
//! anything else, or a payload that is not valid JSON, is skipped.

use super::witness::{Entry, EntryPayload};
use crate::store::{ClassRecord, DomainRecord, IssuerRecord, Mutation, TxMutation};
use crate::utils::script_hash;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct Envelope {
	#[serde(default)]
	id: Option<String>,
	#[serde(default)]
	ver: Option<Value>,
	metadata: Body,
}

#[derive(Debug, Deserialize)]
struct Body {
	#[serde(default)]
	target: Option<String>,
	#[serde(rename = "type")]
	kind: String,
	#[serde(default)]
	data: Value,
}

/// Text form of a JSON field: strings verbatim, other values as JSON, absent as empty.
fn text(data: &Value, name: &str) -> String {
	match data.get(name) {
		None | Some(Value::Null) => String::new(),
		Some(Value::String(value)) => value.clone(),
		Some(other) => other.to_string(),
	}
}

/// Upsert for the metadata carried by an output-type entry, if any.
pub fn parse_metadata(entry: &Entry, block_number: u64) -> Option<TxMutation> {
	let EntryPayload::OutputType(payload) = &entry.payload else {
		return None;
	};

	let envelope: Envelope = match serde_json::from_slice(payload) {
		Ok(envelope) => envelope,
		Err(e) => {
			warn!(
				"Skipping metadata in tx 0x{}: {}",
				hex::encode(&entry.tx_hash),
				e
			);
			return None;
		}
	};

	let data = &envelope.metadata.data;
	let version = match data.get("version") {
		Some(_) => text(data, "version"),
		None => envelope.ver.as_ref().map(|ver| match ver {
			Value::String(ver) => ver.clone(),
			other => other.to_string(),
		}).unwrap_or_default(),
	};

	let record: DomainRecord = match envelope.metadata.kind.as_str() {
		"issuer" => IssuerRecord {
			block_number,
			lock_hash: hex::encode(script_hash(&entry.lock_script)),
			version,
			name: text(data, "name"),
			avatar: text(data, "avatar"),
			description: text(data, "description"),
			localization: text(data, "localization"),
		}
		.into(),
		"cota" => {
			let cota_id = text(data, "cota_id");
			let cota_id = cota_id.trim_start_matches("0x").to_lowercase();
			if cota_id.is_empty() {
				warn!(
					"Skipping class metadata without cota_id in tx 0x{}",
					hex::encode(&entry.tx_hash)
				);
				return None;
			}
			ClassRecord {
				block_number,
				cota_id,
				version,
				name: text(data, "name"),
				symbol: text(data, "symbol"),
				description: text(data, "description"),
				image: text(data, "image"),
				audio: text(data, "audio"),
				video: text(data, "video"),
				model: text(data, "model"),
				characteristic: text(data, "characteristic"),
				properties: text(data, "properties"),
				localization: text(data, "localization"),
			}
			.into()
		}
		other => {
			debug!(
				"Ignoring metadata type {} (id {:?}, target {:?})",
				other, envelope.id, envelope.metadata.target
			);
			return None;
		}
	};

	Some(TxMutation {
		tx_index: entry.tx_index,
		mutation: Mutation::Upsert(record),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cota::constants::CellKind;
	use crate::test_utils::lock;

	fn metadata_entry(json: &str) -> Entry {
		Entry {
			kind: CellKind::Cota,
			payload: EntryPayload::OutputType(json.as_bytes().to_vec()),
			lock_script: lock(1),
			tx_index: 4,
			tx_hash: vec![0x55; 32],
			version: 1,
		}
	}

	fn record(json: &str) -> Option<DomainRecord> {
		parse_metadata(&metadata_entry(json), 77).map(|tx_mutation| {
			assert_eq!(tx_mutation.tx_index, 4);
			match tx_mutation.mutation {
				Mutation::Upsert(record) => record,
				other => panic!("expected upsert, got {:?}", other),
			}
		})
	}

	#[test]
	fn issuer_metadata_is_keyed_by_lock_hash() {
		let json = r#"{"id":"cota","ver":"1.0","metadata":{"target":"output#0","type":"issuer",
			"data":{"version":"0","name":"Alice","avatar":"https://a/b.png","description":"d",
			"localization":{"uri":"x"}}}}"#;
		let Some(DomainRecord::Issuer(issuer)) = record(json) else {
			panic!("expected issuer");
		};
		assert_eq!(issuer.block_number, 77);
		assert_eq!(issuer.lock_hash, hex::encode(script_hash(&lock(1))));
		assert_eq!(issuer.version, "0");
		assert_eq!(issuer.name, "Alice");
		assert_eq!(issuer.localization, r#"{"uri":"x"}"#);
	}

	#[test]
	fn class_metadata_is_keyed_by_cota_id() {
		let json = r#"{"id":"cota","ver":"1.1","metadata":{"target":"output#0","type":"cota",
			"data":{"cota_id":"0xABCDEF","name":"Ticket","symbol":"TKT",
			"characteristic":[["rarity",1]]}}}"#;
		let Some(DomainRecord::Class(class)) = record(json) else {
			panic!("expected class");
		};
		assert_eq!(class.cota_id, "abcdef");
		assert_eq!(class.version, "1.1");
		assert_eq!(class.symbol, "TKT");
		assert_eq!(class.characteristic, r#"[["rarity",1]]"#);
		assert_eq!(class.audio, "");
	}

	#[test]
	fn other_payloads_yield_nothing() {
		assert!(record(r#"{"metadata":{"type":"joyid","data":{}}}"#).is_none());
		assert!(record(r#"{"metadata":{"type":"cota","data":{"name":"x"}}}"#).is_none());
		assert!(record("not json").is_none());

		let mut input = metadata_entry("{}");
		input.payload = EntryPayload::InputType(vec![1]);
		assert!(parse_metadata(&input, 1).is_none());
	}
}
