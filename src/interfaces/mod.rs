//! Edge adapters: the JSON-lines replay script and the CSV report writer.

pub mod csv;
pub mod script;
