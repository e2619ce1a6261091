//! Domain transformers.
//!
//! The dispatcher reads the operation code of a cota entry, decodes the entry table for that
//! operation and protocol revision, and turns every SMT leaf into one row mutation. Lock scripts
//! referenced by rows are resolved to script ids before the record is built.

use super::constants::CellKind;
use super::entries::{
    ClaimEntries, ClaimKey, DefineEntries, MintEntries, NftId, NftInfo, ProtocolVersion,
    RegistryEntries, TransferEntries, UpdateEntries, WithdrawEntries, WithdrawalLeaf,
};
use super::molecule::{DecodeError, decode_script};
use super::operation::Operation;
use super::witness::{Entry, EntryPayload};
use crate::store::{
    ClaimedRecord, DefineRecord, HoldRecord, Mutation, RegisterRecord, ScriptRegistry,
    StoreError, TxMutation, WithdrawRecord,
};
use crate::utils::script_hash;

use std::sync::Arc;
use tracing::debug;

/// Errors raised while turning an entry into mutations
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Lock that signed the entry, resolved against the script table.
struct Sender {
    lock_hash: String,
    lock_script_id: i64,
}

/// Routes entries to their transformer by operation code.
pub struct EntryDispatcher<R: ?Sized> {
    registry: Arc<R>,
}

impl<R: ScriptRegistry + ?Sized> EntryDispatcher<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    /// Mutations produced by one input-type entry; output-type entries produce none here.
    pub async fn dispatch(
        &self,
        entry: &Entry,
        block_number: u64,
    ) -> Result<Vec<TxMutation>, TransformError> {
        let EntryPayload::InputType(payload) = &entry.payload else {
            return Ok(Vec::new());
        };

        let mutations = match entry.kind {
            CellKind::Registry => registry(payload, block_number)?,
            CellKind::Cota => {
                let Some((operation, data)) = Operation::split(payload) else {
                    return Ok(Vec::new());
                };
                debug!(
                    "Dispatching {} entry of tx 0x{} (version {})",
                    operation.name(),
                    hex::encode(&entry.tx_hash),
                    entry.version
                );
                self.cota(operation, data, entry, block_number).await?
            }
        };

        Ok(mutations
            .into_iter()
            .map(|mutation| TxMutation {
                tx_index: entry.tx_index,
                mutation,
            })
            .collect())
    }

    async fn cota(
        &self,
        operation: Operation,
        data: &[u8],
        entry: &Entry,
        block_number: u64,
    ) -> Result<Vec<Mutation>, TransformError> {
        let owner = hex::encode(script_hash(&entry.lock_script));

        let mutations = match operation {
            Operation::Define => {
                let entries = DefineEntries::decode(data)?;
                let sender = self.sender(entry).await?;
                entries
                    .keys
                    .iter()
                    .zip(&entries.values)
                    .map(|(key, value)| {
                        Mutation::Create(
                            DefineRecord {
                                block_number,
                                cota_id: hex::encode(key.cota_id),
                                total: value.total,
                                issued: value.issued,
                                configure: value.configure,
                                lock_hash: sender.lock_hash.clone(),
                                lock_script_id: sender.lock_script_id,
                            }
                            .into(),
                        )
                    })
                    .collect()
            }
            Operation::Mint => {
                let entries = MintEntries::decode(data, version(entry)?)?;
                let sender = self.sender(entry).await?;
                let mut mutations: Vec<Mutation> = entries
                    .define_keys
                    .iter()
                    .zip(&entries.define_new_values)
                    .map(|(key, value)| {
                        Mutation::Update(
                            DefineRecord {
                                block_number,
                                cota_id: hex::encode(key.cota_id),
                                total: value.total,
                                issued: value.issued,
                                configure: value.configure,
                                lock_hash: sender.lock_hash.clone(),
                                lock_script_id: sender.lock_script_id,
                            }
                            .into(),
                        )
                    })
                    .collect();
                mutations.extend(
                    self.withdrawals(&entries.withdrawals, &sender, entry, block_number)
                        .await?,
                );
                mutations
            }
            Operation::Withdraw => {
                let entries = WithdrawEntries::decode(data, version(entry)?)?;
                let sender = self.sender(entry).await?;
                let mut mutations: Vec<Mutation> = entries
                    .hold_keys
                    .iter()
                    .map(|key| {
                        Mutation::Delete(HoldRecord::key(
                            &sender.lock_hash,
                            &hex::encode(key.cota_id),
                            key.index,
                        ))
                    })
                    .collect();
                mutations.extend(
                    self.withdrawals(&entries.withdrawals, &sender, entry, block_number)
                        .await?,
                );
                mutations
            }
            Operation::Claim | Operation::ClaimUpdate => {
                let entries = if operation == Operation::Claim {
                    ClaimEntries::decode_claim(data)?
                } else {
                    ClaimEntries::decode_claim_update(data)?
                };
                let mut mutations: Vec<Mutation> = entries
                    .hold_keys
                    .iter()
                    .zip(&entries.hold_values)
                    .map(|(key, info)| Mutation::Create(hold(&owner, key, info, block_number).into()))
                    .collect();
                mutations.extend(
                    entries
                        .claim_keys
                        .iter()
                        .map(|key| Mutation::Create(claimed(&owner, key, block_number).into())),
                );
                mutations
            }
            Operation::Update => {
                let entries = UpdateEntries::decode(data)?;
                entries
                    .hold_keys
                    .iter()
                    .zip(&entries.hold_values)
                    .map(|(key, info)| Mutation::Update(hold(&owner, key, info, block_number).into()))
                    .collect()
            }
            Operation::Transfer | Operation::TransferUpdate => {
                let version = version(entry)?;
                let entries = if operation == Operation::Transfer {
                    TransferEntries::decode_transfer(data, version)?
                } else {
                    TransferEntries::decode_transfer_update(data, version)?
                };
                let sender = self.sender(entry).await?;
                let mut mutations: Vec<Mutation> = entries
                    .claim_keys
                    .iter()
                    .map(|key| Mutation::Create(claimed(&owner, key, block_number).into()))
                    .collect();
                mutations.extend(
                    self.withdrawals(&entries.withdrawals, &sender, entry, block_number)
                        .await?,
                );
                mutations
            }
            Operation::Ignored(code) => {
                debug!(
                    "Ignoring unknown operation {} in tx 0x{}",
                    code,
                    hex::encode(&entry.tx_hash)
                );
                Vec::new()
            }
        };

        Ok(mutations)
    }

    async fn sender(&self, entry: &Entry) -> Result<Sender, TransformError> {
        Ok(Sender {
            lock_hash: hex::encode(script_hash(&entry.lock_script)),
            lock_script_id: self
                .registry
                .find_or_create_script(&entry.lock_script)
                .await?,
        })
    }

    async fn withdrawals(
        &self,
        leaves: &[WithdrawalLeaf],
        sender: &Sender,
        entry: &Entry,
        block_number: u64,
    ) -> Result<Vec<Mutation>, TransformError> {
        let mut mutations = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            let receiver = decode_script(&leaf.to_lock)?;
            let receiver_lock_script_id = self.registry.find_or_create_script(&receiver).await?;
            mutations.push(Mutation::Create(
                WithdrawRecord {
                    block_number,
                    cota_id: hex::encode(leaf.nft_id.cota_id),
                    token_index: leaf.nft_id.index,
                    out_point: hex::encode(leaf.out_point),
                    state: leaf.info.state,
                    configure: leaf.info.configure,
                    characteristic: hex::encode(leaf.info.characteristic),
                    receiver_lock_script_id,
                    lock_hash: sender.lock_hash.clone(),
                    lock_script_id: sender.lock_script_id,
                    version: entry.version,
                    tx_hash: hex::encode(&entry.tx_hash),
                }
                .into(),
            ));
        }
        Ok(mutations)
    }
}

fn version(entry: &Entry) -> Result<ProtocolVersion, DecodeError> {
    ProtocolVersion::try_from(entry.version)
}

fn hold(owner: &str, key: &NftId, info: &NftInfo, block_number: u64) -> HoldRecord {
    HoldRecord {
        block_number,
        lock_hash: owner.to_string(),
        cota_id: hex::encode(key.cota_id),
        token_index: key.index,
        state: info.state,
        configure: info.configure,
        characteristic: hex::encode(info.characteristic),
    }
}

fn claimed(owner: &str, key: &ClaimKey, block_number: u64) -> ClaimedRecord {
    ClaimedRecord {
        block_number,
        lock_hash: owner.to_string(),
        cota_id: hex::encode(key.nft_id.cota_id),
        token_index: key.nft_id.index,
        out_point: hex::encode(key.out_point),
    }
}

/// Registry cells carry no operation byte, the whole payload is the entry table.
fn registry(payload: &[u8], block_number: u64) -> Result<Vec<Mutation>, TransformError> {
    Ok(RegistryEntries::decode(payload)?
        .lock_hashes
        .iter()
        .map(|lock_hash| {
            Mutation::Create(
                RegisterRecord {
                    block_number,
                    lock_hash: hex::encode(lock_hash),
                    lock_script_id: None,
                }
                .into(),
            )
        })
        .collect())
}
