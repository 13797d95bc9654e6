//! Translation of user-entered search filters into C-FIND attribute values

use std::collections::BTreeMap;

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use serde::{Deserialize, Serialize};

/// Separator DICOM uses between values of a multi-valued attribute
pub const VALUE_SEPARATOR: char = '\\';

/// A filter value: free text, or a list (only meaningful for `Modalities`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    List(Vec<String>),
}

/// Filter name → value, as entered by a user. Unknown names are ignored.
pub type FilterSet = BTreeMap<String, FilterValue>;

/// The filter names understood by the translator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey {
    Name,
    Study,
    Series,
    Id,
    Modalities,
}

impl FilterKey {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "Name" => Some(FilterKey::Name),
            "Study" => Some(FilterKey::Study),
            "Series" => Some(FilterKey::Series),
            "ID" => Some(FilterKey::Id),
            "Modalities" => Some(FilterKey::Modalities),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKey::Name => "Name",
            FilterKey::Study => "Study",
            FilterKey::Series => "Series",
            FilterKey::Id => "ID",
            FilterKey::Modalities => "Modalities",
        }
    }

    /// Attribute constrained by this filter
    pub fn tag(&self) -> Tag {
        match self {
            FilterKey::Name => tags::PATIENT_NAME,
            FilterKey::Study => tags::STUDY_DESCRIPTION,
            FilterKey::Series => tags::SERIES_DESCRIPTION,
            FilterKey::Id => tags::PATIENT_ID,
            FilterKey::Modalities => tags::MODALITIES_IN_STUDY,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        FilterValue::List(values)
    }
}

/// Wrap a value in leading and trailing wildcards. An empty value becomes
/// `**`, which matches everything.
pub fn wildcard(value: &str) -> String {
    format!("*{}*", value)
}

/// Join modalities into one value with peer-side OR semantics
pub fn join_modalities<S: AsRef<str>>(modalities: &[S]) -> String {
    let mut joined = String::new();
    for (i, modality) in modalities.iter().enumerate() {
        if i > 0 {
            joined.push(VALUE_SEPARATOR);
        }
        joined.push_str(modality.as_ref());
    }
    joined
}

/// Translate a filter set into attribute values to merge into a query.
///
/// Output is ordered by filter name, so identical filter sets always yield
/// identical attribute lists.
pub fn translate(filters: &FilterSet) -> Vec<(Tag, String)> {
    let mut values = Vec::new();
    for (name, value) in filters {
        let Some(key) = FilterKey::parse(name) else {
            tracing::trace!("Ignoring unknown filter '{}'", name);
            continue;
        };
        let attribute = match (key, value) {
            (FilterKey::Modalities, FilterValue::List(list)) => join_modalities(list),
            (FilterKey::Modalities, FilterValue::Text(single)) => single.clone(),
            (_, FilterValue::Text(text)) => wildcard(text),
            (_, FilterValue::List(_)) => {
                tracing::warn!("Filter '{}' expects text, ignoring list value", key.as_str());
                continue;
            }
        };
        tracing::debug!("Filter {} -> {} = '{}'", key.as_str(), key.tag(), attribute);
        values.push((key.tag(), attribute));
    }
    values
}
