pub mod hash;
pub mod logging;

pub use hash::{generate_hash, generate_uid};
pub use logging::truncate_text;
