//! Stateful correlation engine: joins path, user, auth, token, and
//! open-file state across packets into completed file-access records.

mod correlator;
mod dirtable;
mod enrichment;
mod keys;
mod maps;
mod record;

pub use correlator::{Correlator, StateSize};
pub use dirtable::derive_dir_fields;
pub use enrichment::{derive_user_domain, looks_like_ip, parse_server_ident, resolve_user_info, UserLookup};
pub use maps::{DictEntry, StateEntry};
pub use record::{build_record, CloseFields, FileContext};
