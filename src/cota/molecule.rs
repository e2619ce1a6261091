//! Minimal molecule reader and writer.
//!
//! Molecule is the serialization format used by CKB for witnesses and scripts, and by CoTA for its
//! SMT entry tables. Only the shapes CoTA needs are covered: tables, fixed vectors, dynamic
//! vectors, `Bytes` and `BytesOpt`. Header words are little-endian `u32`.

use crate::node::{Script, ScriptHashType};

const HEADER_SIZE: usize = 4;

/// Errors raised while decoding molecule or CoTA structures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{what}: expected at least {expected} bytes, got {actual}")]
    TooShort {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{what}: declared size {declared} does not match actual size {actual}")]
    SizeMismatch {
        what: &'static str,
        declared: usize,
        actual: usize,
    },

    #[error("{what}: invalid offset table")]
    InvalidOffsets { what: &'static str },

    #[error("{what}: expected {expected} fields, got {actual}")]
    FieldCount {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{what}: {keys} keys but {values} values")]
    LengthMismatch {
        what: &'static str,
        keys: usize,
        values: usize,
    },

    #[error("unknown script hash type {0}")]
    HashType(u8),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
}

fn read_u32(data: &[u8], at: usize, what: &'static str) -> Result<usize, DecodeError> {
    let word = data
        .get(at..at + HEADER_SIZE)
        .ok_or(DecodeError::TooShort {
            what,
            expected: at + HEADER_SIZE,
            actual: data.len(),
        })?;
    Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]) as usize)
}

/// Splits a table (or dynamic vector) into its item slices.
fn split_offsets<'a>(data: &'a [u8], what: &'static str) -> Result<Vec<&'a [u8]>, DecodeError> {
    let total = read_u32(data, 0, what)?;
    if total != data.len() {
        return Err(DecodeError::SizeMismatch {
            what,
            declared: total,
            actual: data.len(),
        });
    }
    if total == HEADER_SIZE {
        return Ok(Vec::new());
    }

    let first = read_u32(data, HEADER_SIZE, what)?;
    if first % HEADER_SIZE != 0 || first < HEADER_SIZE * 2 || first > total {
        return Err(DecodeError::InvalidOffsets { what });
    }

    let count = first / HEADER_SIZE - 1;
    let mut offsets = Vec::with_capacity(count + 1);
    for i in 0..count {
        offsets.push(read_u32(data, HEADER_SIZE * (i + 1), what)?);
    }
    offsets.push(total);

    if offsets.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(DecodeError::InvalidOffsets { what });
    }

    Ok(offsets
        .windows(2)
        .map(|pair| &data[pair[0]..pair[1]])
        .collect())
}

/// Reads a table and returns its first `expected` fields.
///
/// Tables carrying extra trailing fields are accepted, newer protocol revisions append fields.
pub fn table<'a>(
    data: &'a [u8],
    expected: usize,
    what: &'static str,
) -> Result<Vec<&'a [u8]>, DecodeError> {
    let mut fields = split_offsets(data, what)?;
    if fields.len() < expected {
        return Err(DecodeError::FieldCount {
            what,
            expected,
            actual: fields.len(),
        });
    }
    fields.truncate(expected);
    Ok(fields)
}

/// Reads a vector of fixed-size items.
pub fn fixvec<'a>(
    data: &'a [u8],
    item_size: usize,
    what: &'static str,
) -> Result<Vec<&'a [u8]>, DecodeError> {
    let count = read_u32(data, 0, what)?;
    let expected = HEADER_SIZE + count * item_size;
    if data.len() != expected {
        return Err(DecodeError::SizeMismatch {
            what,
            declared: expected,
            actual: data.len(),
        });
    }
    if item_size == 0 {
        return Ok(vec![&data[HEADER_SIZE..]; count]);
    }
    Ok(data[HEADER_SIZE..].chunks_exact(item_size).collect())
}

/// Reads a vector of dynamically sized items.
pub fn dynvec<'a>(data: &'a [u8], what: &'static str) -> Result<Vec<&'a [u8]>, DecodeError> {
    split_offsets(data, what)
}

/// Reads `Bytes`, a fixed vector of single bytes.
pub fn bytes<'a>(data: &'a [u8], what: &'static str) -> Result<&'a [u8], DecodeError> {
    fixvec(data, 1, what)?;
    Ok(&data[HEADER_SIZE..])
}

/// Reads `BytesOpt`: empty means absent.
pub fn bytes_opt<'a>(data: &'a [u8], what: &'static str) -> Result<Option<&'a [u8]>, DecodeError> {
    if data.is_empty() {
        return Ok(None);
    }
    bytes(data, what).map(Some)
}

/// Decoded `WitnessArgs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WitnessArgs {
    pub lock: Option<Vec<u8>>,
    pub input_type: Option<Vec<u8>>,
    pub output_type: Option<Vec<u8>>,
}

impl WitnessArgs {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let fields = table(data, 3, "WitnessArgs")?;
        Ok(Self {
            lock: bytes_opt(fields[0], "WitnessArgs.lock")?.map(<[u8]>::to_vec),
            input_type: bytes_opt(fields[1], "WitnessArgs.input_type")?.map(<[u8]>::to_vec),
            output_type: bytes_opt(fields[2], "WitnessArgs.output_type")?.map(<[u8]>::to_vec),
        })
    }

    #[cfg(test)]
    pub fn encode(&self) -> Vec<u8> {
        let opt = |field: &Option<Vec<u8>>| field.as_deref().map(pack_bytes).unwrap_or_default();
        pack_table(&[opt(&self.lock), opt(&self.input_type), opt(&self.output_type)])
    }
}

/// Decodes a molecule `Script` table.
pub fn decode_script(data: &[u8]) -> Result<Script, DecodeError> {
    let fields = table(data, 3, "Script")?;
    if fields[0].len() != 32 {
        return Err(DecodeError::SizeMismatch {
            what: "Script.code_hash",
            declared: 32,
            actual: fields[0].len(),
        });
    }
    let hash_type_byte = *fields[1].first().ok_or(DecodeError::TooShort {
        what: "Script.hash_type",
        expected: 1,
        actual: 0,
    })?;
    let hash_type =
        ScriptHashType::from_byte(hash_type_byte).ok_or(DecodeError::HashType(hash_type_byte))?;

    Ok(Script {
        code_hash: fields[0].to_vec(),
        hash_type,
        args: bytes(fields[2], "Script.args")?.to_vec(),
    })
}

/// Encodes a script the way the chain hashes it.
pub fn encode_script(script: &Script) -> Vec<u8> {
    pack_table(&[
        script.code_hash.clone(),
        vec![script.hash_type.as_byte()],
        pack_bytes(&script.args),
    ])
}

/// Packs fields into a table; dynamic vectors share the layout.
pub fn pack_table(fields: &[Vec<u8>]) -> Vec<u8> {
    let header_len = HEADER_SIZE * (fields.len() + 1);
    let total = header_len + fields.iter().map(Vec::len).sum::<usize>();

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_le_bytes());
    let mut offset = header_len;
    for field in fields {
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        offset += field.len();
    }
    for field in fields {
        out.extend_from_slice(field);
    }
    out
}

#[cfg(test)]
pub fn pack_dynvec(items: &[Vec<u8>]) -> Vec<u8> {
    pack_table(items)
}

#[cfg(test)]
pub fn pack_fixvec(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = (items.len() as u32).to_le_bytes().to_vec();
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

pub fn pack_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(data);
    out
}
