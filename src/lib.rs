//! # regf-core
//!
//! A read-only parser for the Windows Registry File (REGF) hive binary
//! format: base block, hive-bin index, cell store, key tree, subkey
//! lists, and typed value reading including big-data reassembly.
//!
//! ## Architecture
//!
//! 1. **Base Block** ([`header`]): the 4096-byte file header — signature,
//!    version, root-cell offset, checksum.
//! 2. **Hive Bins** ([`hbin`]): 4 KiB-aligned blocks holding runs of cells.
//! 3. **Cell Store** ([`store`]): bounds-checked, cached, containment-validated
//!    access to a cell by offset — every parser above this layer goes through it.
//! 4. **Key Nodes** ([`key`]) and **Value Keys** ([`value`]): the `nk`/`vk`
//!    cell payloads.
//! 5. **Subkey Lists** ([`subkey_list`]): `lf`/`lh`/`li`/`ri` traversal.
//! 6. **Big Data** ([`bigdata`]): `db` segment reassembly for values over
//!    16344 bytes.
//! 7. **Key Tree** ([`tree`]): the [`Hive`]/[`KeyHandle`]/[`ValueHandle`]
//!    navigation API most callers want.
//!
//! Corruption local to a single key, subkey list, or value is recorded as
//! a [`error::Corruption`] flag on the entity that found it rather than
//! failing the surrounding operation — see [`error`] for the full
//! fatal-vs-corruption split.
//!
//! ## Example
//!
//! ```no_run
//! use regf_core::Hive;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hive = Hive::open("SOFTWARE")?;
//! let root = hive.root()?;
//! for subkey in root.subkeys()? {
//!     println!("{}", subkey.name());
//! }
//!
//! if let Some(key) = hive.find_by_path(r"Microsoft\Windows")? {
//!     if let Some(value) = key.value_by_name("Version")? {
//!         println!("{:?}", value.resolve()?.as_string(value.data_type(), None));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abort;
pub mod bigdata;
pub mod cache;
pub mod cell;
pub mod checksum;
pub mod codepage;
pub mod config;
pub mod error;
pub mod hbin;
pub mod header;
pub mod key;
pub mod source;
pub mod store;
pub mod subkey_list;
pub mod tree;
pub mod utils;
pub mod value;

pub use abort::AbortFlag;
pub use cell::{CellType, KeyNodeFlags, ValueType};
pub use codepage::{Codepage, WindowsCodepage};
pub use config::HiveConfig;
pub use error::{Corruption, RegistryError, Result};
pub use header::BaseBlock;
pub use key::KeyNode;
pub use source::{ByteSource, MmapByteSource, SliceByteSource};
pub use tree::{Hive, KeyHandle, ValueHandle};
pub use value::{ResolvedData, ValueKey};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
