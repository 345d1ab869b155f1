//! IPNS names and records.

mod name;
mod record;

pub use name::IpnsName;
pub use record::{IpnsRecord, MAX_RECORD_SIZE, RecordError};
