//! Cross-module scenarios and property tests.

pub(crate) mod fixtures;
mod pipeline_tests;
mod property_tests;
