pub mod stored_entry;

pub use stored_entry::StoredEntry;
