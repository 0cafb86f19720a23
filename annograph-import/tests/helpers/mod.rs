//! Test Helper Utilities
//!
//! Shared fixtures for annograph-import integration tests

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::{
    cat_input, degenerate, import, import_with, phone_role, phones, syllable, utterance, words, Imported,
};
