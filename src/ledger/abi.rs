//! Just enough of the Solidity contract ABI to talk to the voting contract.
//!
//! Supported types are `uint256` (restricted to values that fit in a `u64`),
//! `string` and `string[]`.

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};

use super::LedgerError;

const WORD: usize = 32;

/// A contract function: its selector and the gas to allow when sending it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Function {
    pub signature: &'static str,
    /// First four bytes of `keccak256(signature)`.
    pub selector: [u8; 4],
    /// Gas limit used when the function is sent as a transaction.
    pub gas: u64,
}

pub const ELECTION_COUNT: Function = Function {
    signature: "electionCount()",
    selector: [0x99, 0x7d, 0x28, 0x30],
    gas: 0,
};

pub const GET_RESULTS: Function = Function {
    signature: "getResults(uint256)",
    selector: [0x81, 0xa6, 0x0c, 0x0d],
    gas: 0,
};

pub const VOTE: Function = Function {
    signature: "vote(uint256,uint256)",
    selector: [0xb3, 0x84, 0xab, 0xef],
    gas: 500_000,
};

pub const CREATE_ELECTION: Function = Function {
    signature: "createElection(string,string[])",
    selector: [0x34, 0x98, 0x13, 0xb2],
    gas: 3_000_000,
};

/// An ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(u64),
    String(String),
    StringArray(Vec<String>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        !matches!(self, Token::Uint(_))
    }
}

/// Encode a call to `function` with the given arguments, as `0x`-prefixed hex.
pub fn encode_call(function: &Function, args: &[Token]) -> String {
    let mut data = function.selector.to_vec();
    data.extend(encode_tokens(args));
    format!("0x{}", HEXLOWER.encode(&data))
}

/// Decode `0x`-prefixed hex returned by the node.
pub fn decode_hex(hex: &str) -> Result<Vec<u8>, LedgerError> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    HEXLOWER_PERMISSIVE
        .decode(digits.as_bytes())
        .map_err(|e| LedgerError::Decode(format!("invalid hex: {e}")))
}

pub(crate) fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode_tokens(tokens: &[Token]) -> Vec<u8> {
    let head_len = WORD * tokens.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            head.extend(uint_word((head_len + tail.len()) as u64));
            tail.extend(encode_dynamic(token));
        } else if let Token::Uint(value) = token {
            head.extend(uint_word(*value));
        }
    }
    head.extend(tail);
    head
}

fn encode_dynamic(token: &Token) -> Vec<u8> {
    match token {
        Token::Uint(value) => uint_word(*value).to_vec(),
        Token::String(s) => encode_bytes(s.as_bytes()),
        Token::StringArray(items) => {
            let elements: Vec<Token> = items.iter().cloned().map(Token::String).collect();
            let mut out = uint_word(items.len() as u64).to_vec();
            out.extend(encode_tokens(&elements));
            out
        }
    }
}

fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = uint_word(bytes.len() as u64).to_vec();
    out.extend_from_slice(bytes);
    let padding = (WORD - bytes.len() % WORD) % WORD;
    out.resize(out.len() + padding, 0);
    out
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], LedgerError> {
    offset
        .checked_add(WORD)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| LedgerError::Decode(format!("word at {offset} out of bounds")))
}

/// Read the `uint256` at `offset`, rejecting values that overflow a `u64`.
pub fn decode_uint(data: &[u8], offset: usize) -> Result<u64, LedgerError> {
    let word = word_at(data, offset)?;
    let (high, low) = word.split_at(WORD - 8);
    if high.iter().any(|b| *b != 0) {
        return Err(LedgerError::Decode(format!("uint at {offset} overflows u64")));
    }
    let mut bytes = [0; 8];
    bytes.copy_from_slice(low);
    Ok(u64::from_be_bytes(bytes))
}

fn decode_usize(data: &[u8], offset: usize) -> Result<usize, LedgerError> {
    let value = decode_uint(data, offset)?;
    usize::try_from(value).map_err(|_| LedgerError::Decode(format!("length {value} too large")))
}

/// `base + offset`, where `offset` was read off the wire.
fn checked_offset(base: usize, offset: usize) -> Result<usize, LedgerError> {
    base.checked_add(offset)
        .ok_or_else(|| LedgerError::Decode(format!("offset {offset} from {base} overflows")))
}

fn decode_string(data: &[u8], offset: usize) -> Result<String, LedgerError> {
    let len = decode_usize(data, offset)?;
    let start = checked_offset(offset, WORD)?;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| LedgerError::Decode(format!("string at {offset} out of bounds")))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| LedgerError::Decode(e.to_string()))
}

/// Decode the `string[]` whose offset is stored in the head word at `head`.
fn decode_string_array(data: &[u8], base: usize, head: usize) -> Result<Vec<String>, LedgerError> {
    let start = checked_offset(base, decode_usize(data, head)?)?;
    let len = decode_usize(data, start)?;
    let elements = checked_offset(start, WORD)?;
    (0..len)
        .map(|i| {
            let offset = decode_usize(data, checked_offset(elements, i * WORD)?)?;
            decode_string(data, checked_offset(elements, offset)?)
        })
        .collect()
}

/// Decode the `uint256[]` whose offset is stored in the head word at `head`.
fn decode_uint_array(data: &[u8], base: usize, head: usize) -> Result<Vec<u64>, LedgerError> {
    let start = checked_offset(base, decode_usize(data, head)?)?;
    let len = decode_usize(data, start)?;
    (0..len)
        .map(|i| decode_uint(data, checked_offset(start, WORD * (i + 1))?))
        .collect()
}

/// Decode the return value of `getResults`: `(string[] names, uint256[] votes)`.
pub fn decode_results(data: &[u8]) -> Result<(Vec<String>, Vec<u64>), LedgerError> {
    let names = decode_string_array(data, 0, 0)?;
    let votes = decode_uint_array(data, 0, WORD)?;
    Ok((names, votes))
}

/// Encode a `(string[], uint256[])` tuple the way the contract returns it.
#[cfg(test)]
pub fn encode_results(names: &[String], votes: &[u64]) -> Vec<u8> {
    let names = encode_dynamic(&Token::StringArray(names.to_vec()));
    let mut out = uint_word(2 * WORD as u64).to_vec();
    out.extend(uint_word((2 * WORD + names.len()) as u64));
    out.extend(names);
    out.extend(uint_word(votes.len() as u64));
    for vote in votes {
        out.extend(uint_word(*vote));
    }
    out
}
