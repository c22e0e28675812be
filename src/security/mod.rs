//! Credential handling
//!
//! The generation API key never lives in the config file; see [`keyring`].

pub mod keyring;

pub use keyring::{get_api_key, set_api_key};
