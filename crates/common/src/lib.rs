//! Common types shared by the Zoho OAuth crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
