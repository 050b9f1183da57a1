//! Key layout for the symbol store.
//!
//! All keys are ASCII with a namespace prefix:
//!
//! | Prefix   | Key                                      | Value               |
//! |----------|------------------------------------------|---------------------|
//! | `sym:`   | `sym:{fileHash}:{symbolID}`              | Symbol              |
//! | `file:`  | `file:{fileHash}`                        | FileMetadata        |
//! | `ref:`   | `ref:{symbolHash}:{fileHash}:{line}`     | Reference           |
//! | `name:`  | `name:{lowercase name}`                  | Vec<SymbolId>       |
//! | `type:`  | `type:{lowercase type}`                  | Vec<SymbolId>       |
//! | `tag:`   | `tag:{lowercase tag}`                    | Vec<SymbolId>       |
//! | `query:` | `query:{fingerprint hex}`                | QueryResult         |
//! | `sid:`   | `sid:{symbolID}`                         | fileHash            |
//! | `meta:`  | `meta:version`                           | format version      |
//!
//! `fileHash` is the hex SHA-256 of the path string; `symbolHash` the hex
//! SHA-256 of the symbol id string. The line component of `ref:` keys is
//! decimal text.

use cg_core::SymbolId;
use sha2::{Digest, Sha256};

pub const SYM_PREFIX: &str = "sym:";
pub const FILE_PREFIX: &str = "file:";
pub const REF_PREFIX: &str = "ref:";
pub const NAME_PREFIX: &str = "name:";
pub const TYPE_PREFIX: &str = "type:";
pub const TAG_PREFIX: &str = "tag:";
pub const QUERY_PREFIX: &str = "query:";
pub const SID_PREFIX: &str = "sid:";

pub const VERSION_KEY: &str = "meta:version";

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Hex SHA-256 of a file path string.
pub fn file_hash(path: &str) -> String {
    sha256_hex(path)
}

/// Hex SHA-256 of a symbol id string.
pub fn symbol_hash(id: &SymbolId) -> String {
    sha256_hex(id.as_str())
}

pub fn sym_key(file_hash: &str, id: &SymbolId) -> Vec<u8> {
    format!("{SYM_PREFIX}{file_hash}:{id}").into_bytes()
}

pub fn sym_file_prefix(file_hash: &str) -> Vec<u8> {
    format!("{SYM_PREFIX}{file_hash}:").into_bytes()
}

pub fn file_key(file_hash: &str) -> Vec<u8> {
    format!("{FILE_PREFIX}{file_hash}").into_bytes()
}

pub fn ref_key(symbol_hash: &str, file_hash: &str, line: u32) -> Vec<u8> {
    format!("{REF_PREFIX}{symbol_hash}:{file_hash}:{line}").into_bytes()
}

pub fn ref_symbol_prefix(symbol_hash: &str) -> Vec<u8> {
    format!("{REF_PREFIX}{symbol_hash}:").into_bytes()
}

pub fn name_key(name: &str) -> Vec<u8> {
    format!("{NAME_PREFIX}{}", name.to_lowercase()).into_bytes()
}

pub fn type_key(type_name: &str) -> Vec<u8> {
    format!("{TYPE_PREFIX}{}", type_name.to_lowercase()).into_bytes()
}

pub fn tag_key(tag: &str) -> Vec<u8> {
    format!("{TAG_PREFIX}{}", tag.to_lowercase()).into_bytes()
}

pub fn query_key(fingerprint: u64) -> Vec<u8> {
    format!("{QUERY_PREFIX}{fingerprint:016x}").into_bytes()
}

pub fn sid_key(id: &SymbolId) -> Vec<u8> {
    format!("{SID_PREFIX}{id}").into_bytes()
}
