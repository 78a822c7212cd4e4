pub mod crypto;
pub mod encoding;
pub mod hash;
pub(crate) mod id;
pub mod merkle;
pub mod time;
