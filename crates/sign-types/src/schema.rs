//! Static field descriptions used to generate documentation for operations,
//! results and signer configuration.

use serde::Serialize;
use std::collections::BTreeMap;

/// Description of one documented field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDoc {
    pub name: &'static str,
    pub description: &'static str,
    /// Example value, written the way it appears in a configuration file or
    /// JSON document.
    pub sample: &'static str,
}

impl FieldDoc {
    pub const fn new(name: &'static str, description: &'static str, sample: &'static str) -> Self {
        Self {
            name,
            description,
            sample,
        }
    }
}

/// Types that publish a static description of their fields.
pub trait DescribeFields {
    fn field_docs() -> &'static [FieldDoc];

    /// Field descriptions keyed by field name.
    fn describe() -> BTreeMap<&'static str, &'static str> {
        Self::field_docs()
            .iter()
            .map(|doc| (doc.name, doc.description))
            .collect()
    }

    /// Sample values keyed by field name.
    fn samples() -> BTreeMap<&'static str, &'static str> {
        Self::field_docs()
            .iter()
            .map(|doc| (doc.name, doc.sample))
            .collect()
    }
}
