//! Merkle-DAG interpretation: DAG-PB nodes, UnixFS data, path traversal and
//! lazy file reads.

pub mod file;
pub mod node;
pub mod pb;
pub mod resolve;
pub mod unixfs;

pub use file::{UnixfsFile, open_file};
pub use node::{DirectoryNode, FileChild, FileNode, Node, Reifier, UnixfsReifier};
pub use pb::{PbLink, PbNode};
pub use resolve::{resolve_file, resolve_to_terminal_node, resolve_with};
pub use unixfs::{DataType, UnixfsData};
