//! Access-log lines rendered from a `%(token)s` template

pub mod fields;
pub mod format;

pub use fields::{human_size, status_phrase, AccessAtoms, AccessFields, MISSING};
pub use format::{is_known_token, AccessLogFormat, DEFAULT_FORMAT};
