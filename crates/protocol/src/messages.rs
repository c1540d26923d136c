//! Message definitions exchanged between the server and browser clients.
//!
//! Requests arrive as JSON (`/rpc`), listings leave as template data. The
//! types here carry no filesystem knowledge; path arguments are untrusted
//! strings until the server resolves them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Kind label used for folder rows in a listing.
pub const FOLDER_KIND: &str = "folder";

/// Name and link of the synthetic parent row.
pub const PARENT_ENTRY: &str = "../";

// ============================================================================
// RPC Messages
// ============================================================================

/// A mutating call sent by the client as `{"call": ..., "args": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcRequest {
    /// Call name, one of `mkdirp`, `mv`, `rm`.
    pub call: String,
    /// Positional path arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl RpcRequest {
    /// Create a request from a call name and its arguments.
    pub fn new(call: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            call: call.into(),
            args,
        }
    }

    /// Parse a request from a JSON body.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The parsed call, or [`ProtocolError::UnknownCall`].
    pub fn rpc_call(&self) -> Result<RpcCall> {
        self.call.parse()
    }

    /// Positional argument `index` of `call`.
    ///
    /// Argument counts are not validated up front; a short argument list
    /// surfaces here as [`ProtocolError::MissingArgument`].
    pub fn arg(&self, call: RpcCall, index: usize) -> Result<&str> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or(ProtocolError::MissingArgument {
                call: call.as_str(),
                index,
            })
    }
}

/// The calls understood by the RPC endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCall {
    /// Create a directory and any missing ancestors.
    Mkdirp,
    /// Rename or move an entry.
    Mv,
    /// Remove a file or directory tree.
    Rm,
}

impl RpcCall {
    /// Wire name of the call.
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcCall::Mkdirp => "mkdirp",
            RpcCall::Mv => "mv",
            RpcCall::Rm => "rm",
        }
    }
}

impl FromStr for RpcCall {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mkdirp" => Ok(RpcCall::Mkdirp),
            "mv" => Ok(RpcCall::Mv),
            "rm" => Ok(RpcCall::Rm),
            other => Err(ProtocolError::UnknownCall(other.to_string())),
        }
    }
}

impl fmt::Display for RpcCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Listing Messages
// ============================================================================

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Display name; folders carry a trailing `/`.
    pub name: String,
    /// Link target relative to the listed directory, percent-encoded.
    pub href: String,
    /// Human readable size, empty for folders.
    pub size: String,
    /// File extension without the dot, or `folder`.
    pub ext: String,
}

impl ListingEntry {
    /// The synthetic row pointing at the parent directory.
    pub fn parent() -> Self {
        Self {
            name: PARENT_ENTRY.to_string(),
            href: PARENT_ENTRY.to_string(),
            size: String::new(),
            ext: FOLDER_KIND.to_string(),
        }
    }
}

/// Data handed to the page template for one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Root-relative path of the directory, with leading and trailing `/`.
    pub title: String,
    /// URL prefix the server is mounted at.
    pub extra_path: String,
    /// Whether mutating calls are disabled.
    pub read_only: bool,
    /// Folder rows, parent row first when present.
    pub folders: Vec<ListingEntry>,
    /// File rows.
    pub files: Vec<ListingEntry>,
}

impl Listing {
    /// Total number of rows, including the parent row.
    pub fn len(&self) -> usize {
        self.folders.len() + self.files.len()
    }
}
