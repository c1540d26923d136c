//! # fileshare Protocol Library
//!
//! Wire types shared between the fileshare server and its browser client.
//!
//! ## Overview
//!
//! - **RPC Requests**: the JSON body of `POST /rpc`, naming one of the
//!   mutating calls (`mkdirp`, `mv`, `rm`) and its positional path arguments
//! - **Listings**: the rows of a directory page, handed to the HTML template
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{RpcCall, RpcRequest};
//!
//! let request = RpcRequest::from_json(br#"{"call":"mkdirp","args":["/AAA"]}"#).unwrap();
//! assert_eq!(request.rpc_call().unwrap(), RpcCall::Mkdirp);
//! assert_eq!(request.arg(RpcCall::Mkdirp, 0).unwrap(), "/AAA");
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: request and listing definitions
//! - [`error`]: error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{Listing, ListingEntry, RpcCall, RpcRequest, FOLDER_KIND, PARENT_ENTRY};
