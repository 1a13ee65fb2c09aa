//! Shared utility functions for examforge.
//!
//! Currently limited to JSON extraction from content-oracle responses.

pub mod json_extraction;

pub use json_extraction::{
    extract_from_code_block, extract_json_value, find_matching_brace, first_balanced_object,
    JsonExtractionError,
};
