//! CoTA SMT entry layouts.
//!
//! Every operation carries a molecule table of key/value leaf vectors. Integers inside CoTA
//! structs are big-endian. Withdrawal leaves changed shape between protocol revisions: revision 0
//! keeps the out point in the value, later revisions move it into the key.

use super::molecule::{DecodeError, bytes, dynvec, fixvec, table};

pub const COTA_ID_SIZE: usize = 20;
pub const OUT_POINT_SIZE: usize = 24;

const DEFINE_ID_SIZE: usize = 2 + COTA_ID_SIZE;
const DEFINE_VALUE_SIZE: usize = 4 + 4 + 1;
const NFT_ID_SIZE: usize = 2 + COTA_ID_SIZE + 4;
const NFT_INFO_SIZE: usize = 1 + 1 + 20;
const CLAIM_KEY_SIZE: usize = NFT_ID_SIZE + OUT_POINT_SIZE;
const CLAIM_INFO_SIZE: usize = 1 + NFT_INFO_SIZE;
const BYTE32_SIZE: usize = 32;
const REGISTRY_SIZE: usize = 64;

/// Protocol revision, taken from the first byte of the cota cell data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V0,
    V1,
    V2,
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(ProtocolVersion::V0),
            1 => Ok(ProtocolVersion::V1),
            2 => Ok(ProtocolVersion::V2),
            other => Err(DecodeError::UnsupportedVersion(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineId {
    pub smt_type: u16,
    pub cota_id: [u8; COTA_ID_SIZE],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineValue {
    pub total: u32,
    pub issued: u32,
    pub configure: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftId {
    pub smt_type: u16,
    pub cota_id: [u8; COTA_ID_SIZE],
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftInfo {
    pub configure: u8,
    pub state: u8,
    pub characteristic: [u8; 20],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimKey {
    pub nft_id: NftId,
    pub out_point: [u8; OUT_POINT_SIZE],
}

/// One withdrawal leaf, normalized across protocol revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalLeaf {
    pub nft_id: NftId,
    pub info: NftInfo,
    /// Molecule-encoded receiver lock script.
    pub to_lock: Vec<u8>,
    pub out_point: [u8; OUT_POINT_SIZE],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineEntries {
    pub keys: Vec<DefineId>,
    pub values: Vec<DefineValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintEntries {
    pub define_keys: Vec<DefineId>,
    pub define_old_values: Vec<DefineValue>,
    pub define_new_values: Vec<DefineValue>,
    pub withdrawals: Vec<WithdrawalLeaf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawEntries {
    pub hold_keys: Vec<NftId>,
    pub hold_values: Vec<NftInfo>,
    pub withdrawals: Vec<WithdrawalLeaf>,
}

/// Hold leaves created together with claim leaves (claim and claim+update).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimEntries {
    pub hold_keys: Vec<NftId>,
    pub hold_values: Vec<NftInfo>,
    pub claim_keys: Vec<ClaimKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEntries {
    pub hold_keys: Vec<NftId>,
    pub hold_old_values: Vec<NftInfo>,
    pub hold_values: Vec<NftInfo>,
}

/// Claim leaves consumed together with new withdrawals (transfer and transfer+update).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEntries {
    pub claim_keys: Vec<ClaimKey>,
    pub withdrawals: Vec<WithdrawalLeaf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntries {
    pub lock_hashes: Vec<[u8; 32]>,
}

fn array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&slice[..N]);
    out
}

fn be_u16(slice: &[u8]) -> u16 {
    u16::from_be_bytes(array(slice))
}

fn be_u32(slice: &[u8]) -> u32 {
    u32::from_be_bytes(array(slice))
}

fn check_len(
    what: &'static str,
    keys: usize,
    values: usize,
) -> Result<(), DecodeError> {
    if keys != values {
        return Err(DecodeError::LengthMismatch { what, keys, values });
    }
    Ok(())
}

fn define_ids(data: &[u8]) -> Result<Vec<DefineId>, DecodeError> {
    Ok(fixvec(data, DEFINE_ID_SIZE, "DefineCotaNFTKeyVec")?
        .into_iter()
        .map(|item| DefineId {
            smt_type: be_u16(&item[0..2]),
            cota_id: array(&item[2..]),
        })
        .collect())
}

fn define_values(data: &[u8]) -> Result<Vec<DefineValue>, DecodeError> {
    Ok(fixvec(data, DEFINE_VALUE_SIZE, "DefineCotaNFTValueVec")?
        .into_iter()
        .map(|item| DefineValue {
            total: be_u32(&item[0..4]),
            issued: be_u32(&item[4..8]),
            configure: item[8],
        })
        .collect())
}

fn nft_id(item: &[u8]) -> NftId {
    NftId {
        smt_type: be_u16(&item[0..2]),
        cota_id: array(&item[2..2 + COTA_ID_SIZE]),
        index: be_u32(&item[2 + COTA_ID_SIZE..NFT_ID_SIZE]),
    }
}

fn nft_info(item: &[u8]) -> NftInfo {
    NftInfo {
        configure: item[0],
        state: item[1],
        characteristic: array(&item[2..NFT_INFO_SIZE]),
    }
}

fn nft_ids(data: &[u8]) -> Result<Vec<NftId>, DecodeError> {
    Ok(fixvec(data, NFT_ID_SIZE, "HoldCotaNFTKeyVec")?
        .into_iter()
        .map(nft_id)
        .collect())
}

fn nft_infos(data: &[u8]) -> Result<Vec<NftInfo>, DecodeError> {
    Ok(fixvec(data, NFT_INFO_SIZE, "HoldCotaNFTValueVec")?
        .into_iter()
        .map(nft_info)
        .collect())
}

fn claim_keys(data: &[u8]) -> Result<Vec<ClaimKey>, DecodeError> {
    Ok(fixvec(data, CLAIM_KEY_SIZE, "ClaimCotaNFTKeyVec")?
        .into_iter()
        .map(|item| ClaimKey {
            nft_id: nft_id(&item[..NFT_ID_SIZE]),
            out_point: array(&item[NFT_ID_SIZE..]),
        })
        .collect())
}

/// Claim+update and transfer+update carry `ClaimCotaNFTInfo` instead of `Byte32` claim values.
fn claim_infos(data: &[u8]) -> Result<Vec<NftInfo>, DecodeError> {
    Ok(fixvec(data, CLAIM_INFO_SIZE, "ClaimCotaNFTInfoVec")?
        .into_iter()
        .map(|item| nft_info(&item[1..]))
        .collect())
}

fn claim_values(data: &[u8]) -> Result<usize, DecodeError> {
    Ok(fixvec(data, BYTE32_SIZE, "ClaimCotaNFTValueVec")?.len())
}

fn withdrawals(
    keys: &[u8],
    values: &[u8],
    version: ProtocolVersion,
) -> Result<Vec<WithdrawalLeaf>, DecodeError> {
    let values = dynvec(values, "WithdrawalCotaNFTValueVec")?;

    let leaves = match version {
        ProtocolVersion::V0 => {
            let keys = fixvec(keys, NFT_ID_SIZE, "WithdrawalCotaNFTKeyVec")?;
            check_len("withdrawals", keys.len(), values.len())?;
            keys.into_iter()
                .zip(values)
                .map(|(key, value)| {
                    let fields = table(value, 3, "WithdrawalCotaNFTValue")?;
                    if fields[0].len() != NFT_INFO_SIZE || fields[2].len() != OUT_POINT_SIZE {
                        return Err(DecodeError::SizeMismatch {
                            what: "WithdrawalCotaNFTValue",
                            declared: NFT_INFO_SIZE + OUT_POINT_SIZE,
                            actual: fields[0].len() + fields[2].len(),
                        });
                    }
                    Ok(WithdrawalLeaf {
                        nft_id: nft_id(key),
                        info: nft_info(fields[0]),
                        to_lock: bytes(fields[1], "WithdrawalCotaNFTValue.to_lock")?.to_vec(),
                        out_point: array(fields[2]),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        }
        ProtocolVersion::V1 | ProtocolVersion::V2 => {
            let keys = fixvec(keys, CLAIM_KEY_SIZE, "WithdrawalCotaNFTKeyV1Vec")?;
            check_len("withdrawals", keys.len(), values.len())?;
            keys.into_iter()
                .zip(values)
                .map(|(key, value)| {
                    let fields = table(value, 2, "WithdrawalCotaNFTValueV1")?;
                    if fields[0].len() != NFT_INFO_SIZE {
                        return Err(DecodeError::SizeMismatch {
                            what: "WithdrawalCotaNFTValueV1.nft_info",
                            declared: NFT_INFO_SIZE,
                            actual: fields[0].len(),
                        });
                    }
                    Ok(WithdrawalLeaf {
                        nft_id: nft_id(&key[..NFT_ID_SIZE]),
                        info: nft_info(fields[0]),
                        to_lock: bytes(fields[1], "WithdrawalCotaNFTValueV1.to_lock")?.to_vec(),
                        out_point: array(&key[NFT_ID_SIZE..]),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(leaves)
}

impl DefineEntries {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let fields = table(data, 2, "DefineCotaNFTEntries")?;
        let keys = define_ids(fields[0])?;
        let values = define_values(fields[1])?;
        check_len("define", keys.len(), values.len())?;
        Ok(Self { keys, values })
    }
}

impl MintEntries {
    pub fn decode(data: &[u8], version: ProtocolVersion) -> Result<Self, DecodeError> {
        let fields = table(data, 5, "MintCotaNFTEntries")?;
        let define_keys = define_ids(fields[0])?;
        let define_old_values = define_values(fields[1])?;
        let define_new_values = define_values(fields[2])?;
        check_len("mint define", define_keys.len(), define_new_values.len())?;
        check_len("mint define", define_keys.len(), define_old_values.len())?;
        Ok(Self {
            define_keys,
            define_old_values,
            define_new_values,
            withdrawals: withdrawals(fields[3], fields[4], version)?,
        })
    }
}

impl WithdrawEntries {
    pub fn decode(data: &[u8], version: ProtocolVersion) -> Result<Self, DecodeError> {
        let fields = table(data, 4, "WithdrawalCotaNFTEntries")?;
        let hold_keys = nft_ids(fields[0])?;
        let hold_values = nft_infos(fields[1])?;
        check_len("withdraw hold", hold_keys.len(), hold_values.len())?;
        Ok(Self {
            hold_keys,
            hold_values,
            withdrawals: withdrawals(fields[2], fields[3], version)?,
        })
    }
}

impl ClaimEntries {
    /// Claim: `{hold_keys, hold_values, claim_keys, claim_values, ..}`.
    pub fn decode_claim(data: &[u8]) -> Result<Self, DecodeError> {
        let fields = table(data, 4, "ClaimCotaNFTEntries")?;
        let entries = Self::from_fields(fields[0], fields[1], fields[2])?;
        check_len("claim", entries.claim_keys.len(), claim_values(fields[3])?)?;
        Ok(entries)
    }

    /// Claim+update: claim values are `ClaimCotaNFTInfo`.
    pub fn decode_claim_update(data: &[u8]) -> Result<Self, DecodeError> {
        let fields = table(data, 4, "ClaimUpdateCotaNFTEntries")?;
        let entries = Self::from_fields(fields[0], fields[1], fields[2])?;
        check_len(
            "claim update",
            entries.claim_keys.len(),
            claim_infos(fields[3])?.len(),
        )?;
        Ok(entries)
    }

    fn from_fields(hold_keys: &[u8], hold_values: &[u8], keys: &[u8]) -> Result<Self, DecodeError> {
        let hold_keys = nft_ids(hold_keys)?;
        let hold_values = nft_infos(hold_values)?;
        check_len("claim hold", hold_keys.len(), hold_values.len())?;
        Ok(Self {
            hold_keys,
            hold_values,
            claim_keys: claim_keys(keys)?,
        })
    }
}

impl UpdateEntries {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let fields = table(data, 3, "UpdateCotaNFTEntries")?;
        let hold_keys = nft_ids(fields[0])?;
        let hold_old_values = nft_infos(fields[1])?;
        let hold_values = nft_infos(fields[2])?;
        check_len("update", hold_keys.len(), hold_values.len())?;
        check_len("update", hold_keys.len(), hold_old_values.len())?;
        Ok(Self {
            hold_keys,
            hold_old_values,
            hold_values,
        })
    }
}

impl TransferEntries {
    /// Transfer: `{claim_keys, claim_values, withdrawal_keys, withdrawal_values, ..}`.
    pub fn decode_transfer(data: &[u8], version: ProtocolVersion) -> Result<Self, DecodeError> {
        let fields = table(data, 4, "TransferCotaNFTEntries")?;
        let claim_keys = claim_keys(fields[0])?;
        check_len("transfer", claim_keys.len(), claim_values(fields[1])?)?;
        Ok(Self {
            claim_keys,
            withdrawals: withdrawals(fields[2], fields[3], version)?,
        })
    }

    /// Transfer+update: claim values are `ClaimCotaNFTInfo`.
    pub fn decode_transfer_update(
        data: &[u8],
        version: ProtocolVersion,
    ) -> Result<Self, DecodeError> {
        let fields = table(data, 4, "TransferUpdateCotaNFTEntries")?;
        let claim_keys = claim_keys(fields[0])?;
        check_len("transfer update", claim_keys.len(), claim_infos(fields[1])?.len())?;
        Ok(Self {
            claim_keys,
            withdrawals: withdrawals(fields[2], fields[3], version)?,
        })
    }
}

impl RegistryEntries {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let fields = table(data, 1, "CotaNFTRegistryEntries")?;
        Ok(Self {
            lock_hashes: fixvec(fields[0], REGISTRY_SIZE, "RegistryVec")?
                .into_iter()
                .map(|item| array(&item[..32]))
                .collect(),
        })
    }
}

/// Molecule builders for synthetic entries.
#[cfg(test)]
pub(crate) mod builder {
    use super::*;
    use crate::cota::molecule::{pack_bytes, pack_dynvec, pack_fixvec, pack_table};

    pub fn define_id(cota_id: [u8; COTA_ID_SIZE]) -> Vec<u8> {
        let mut out = 0x8100u16.to_be_bytes().to_vec();
        out.extend_from_slice(&cota_id);
        out
    }

    pub fn define_value(total: u32, issued: u32, configure: u8) -> Vec<u8> {
        let mut out = total.to_be_bytes().to_vec();
        out.extend_from_slice(&issued.to_be_bytes());
        out.push(configure);
        out
    }

    pub fn nft_id(cota_id: [u8; COTA_ID_SIZE], index: u32) -> Vec<u8> {
        let mut out = 0x8101u16.to_be_bytes().to_vec();
        out.extend_from_slice(&cota_id);
        out.extend_from_slice(&index.to_be_bytes());
        out
    }

    pub fn nft_info(configure: u8, state: u8, characteristic: u8) -> Vec<u8> {
        let mut out = vec![configure, state];
        out.extend_from_slice(&[characteristic; 20]);
        out
    }

    pub fn claim_key(cota_id: [u8; COTA_ID_SIZE], index: u32, out_point: u8) -> Vec<u8> {
        let mut out = nft_id(cota_id, index);
        out.extend_from_slice(&[out_point; OUT_POINT_SIZE]);
        out
    }

    /// Withdrawal key/value pair in the layout of the given revision.
    pub fn withdrawal(
        version: ProtocolVersion,
        cota_id: [u8; COTA_ID_SIZE],
        index: u32,
        to_lock: &[u8],
        out_point: u8,
    ) -> (Vec<u8>, Vec<u8>) {
        let info = nft_info(0, 0, 0xcc);
        match version {
            ProtocolVersion::V0 => (
                nft_id(cota_id, index),
                pack_table(&[info, pack_bytes(to_lock), vec![out_point; OUT_POINT_SIZE]]),
            ),
            ProtocolVersion::V1 | ProtocolVersion::V2 => (
                claim_key(cota_id, index, out_point),
                pack_table(&[info, pack_bytes(to_lock)]),
            ),
        }
    }

    pub fn define_entries(cota_id: [u8; COTA_ID_SIZE], total: u32) -> Vec<u8> {
        pack_table(&[
            pack_fixvec(&[define_id(cota_id)]),
            pack_fixvec(&[define_value(total, 0, 0)]),
            pack_bytes(&[]),
            pack_bytes(&[]),
        ])
    }

    pub fn mint_entries(
        version: ProtocolVersion,
        cota_id: [u8; COTA_ID_SIZE],
        total: u32,
        issued: u32,
        to_lock: &[u8],
    ) -> Vec<u8> {
        let (key, value) = withdrawal(version, cota_id, issued, to_lock, 0x0a);
        pack_table(&[
            pack_fixvec(&[define_id(cota_id)]),
            pack_fixvec(&[define_value(total, issued, 0)]),
            pack_fixvec(&[define_value(total, issued + 1, 0)]),
            pack_fixvec(&[key]),
            pack_dynvec(&[value]),
            pack_bytes(&[]),
            pack_bytes(&[]),
        ])
    }

    pub fn withdraw_entries(
        version: ProtocolVersion,
        cota_id: [u8; COTA_ID_SIZE],
        index: u32,
        to_lock: &[u8],
    ) -> Vec<u8> {
        let (key, value) = withdrawal(version, cota_id, index, to_lock, 0x0b);
        pack_table(&[
            pack_fixvec(&[nft_id(cota_id, index)]),
            pack_fixvec(&[nft_info(0, 0, 0xcc)]),
            pack_fixvec(&[key]),
            pack_dynvec(&[value]),
            pack_bytes(&[]),
            pack_bytes(&[]),
        ])
    }

    pub fn claim_entries(cota_id: [u8; COTA_ID_SIZE], index: u32, with_infos: bool) -> Vec<u8> {
        let claim_value = if with_infos {
            let mut info = vec![1u8];
            info.extend(nft_info(0, 0, 0xcc));
            info
        } else {
            vec![0u8; 32]
        };
        pack_table(&[
            pack_fixvec(&[nft_id(cota_id, index)]),
            pack_fixvec(&[nft_info(0, 0, 0xcc)]),
            pack_fixvec(&[claim_key(cota_id, index, 0x0c)]),
            pack_fixvec(&[claim_value]),
            pack_bytes(&[]),
            pack_bytes(&[]),
            pack_bytes(&[]),
        ])
    }

    pub fn update_entries(cota_id: [u8; COTA_ID_SIZE], index: u32, new_state: u8) -> Vec<u8> {
        pack_table(&[
            pack_fixvec(&[nft_id(cota_id, index)]),
            pack_fixvec(&[nft_info(0, 0, 0xcc)]),
            pack_fixvec(&[nft_info(0, new_state, 0xdd)]),
            pack_bytes(&[]),
            pack_bytes(&[]),
        ])
    }

    pub fn transfer_entries(
        version: ProtocolVersion,
        cota_id: [u8; COTA_ID_SIZE],
        index: u32,
        to_lock: &[u8],
        with_infos: bool,
    ) -> Vec<u8> {
        let claim_value = if with_infos {
            let mut info = vec![1u8];
            info.extend(nft_info(0, 0, 0xcc));
            info
        } else {
            vec![0u8; 32]
        };
        let (key, value) = withdrawal(version, cota_id, index, to_lock, 0x0d);
        let mut fields = vec![
            pack_fixvec(&[claim_key(cota_id, index, 0x0c)]),
            pack_fixvec(&[claim_value]),
            pack_fixvec(&[key]),
            pack_dynvec(&[value]),
            pack_bytes(&[]),
            pack_bytes(&[]),
            pack_bytes(&[]),
        ];
        if version == ProtocolVersion::V2 {
            fields.push(pack_bytes(&[0xee; 8]));
        }
        pack_table(&fields)
    }

    pub fn registry_entries(lock_hashes: &[[u8; 32]]) -> Vec<u8> {
        let leaves: Vec<Vec<u8>> = lock_hashes
            .iter()
            .map(|hash| {
                let mut leaf = hash.to_vec();
                leaf.extend_from_slice(&[0u8; 32]);
                leaf
            })
            .collect();
        pack_table(&[pack_fixvec(&leaves), pack_bytes(&[])])
    }
}
