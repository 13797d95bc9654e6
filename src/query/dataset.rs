//! The C-FIND identifier built for one query run

use std::collections::BTreeMap;

use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use dimse::{DimseError, QueryLevel};

/// Attribute carrying the query level
pub const LEVEL_TAG: Tag = tags::QUERY_RETRIEVE_LEVEL;

/// Attribute linking a series query to its parent study
pub const LINK_TAG: Tag = tags::STUDY_INSTANCE_UID;

/// Return keys requested on every query. Empty values ask the peer to fill
/// the attribute in.
const RETURN_KEYS: [(Tag, VR); 19] = [
    (tags::PATIENT_ID, VR::LO),
    (tags::PATIENT_NAME, VR::PN),
    (tags::PATIENT_BIRTH_DATE, VR::DA),
    (tags::STUDY_ID, VR::SH),
    (tags::STUDY_INSTANCE_UID, VR::UI),
    (tags::STUDY_DESCRIPTION, VR::LO),
    (tags::STUDY_DATE, VR::DA),
    (tags::SERIES_NUMBER, VR::IS),
    (tags::SERIES_DESCRIPTION, VR::LO),
    (tags::SERIES_INSTANCE_UID, VR::UI),
    (tags::STUDY_TIME, VR::TM),
    (tags::SERIES_DATE, VR::DA),
    (tags::SERIES_TIME, VR::TM),
    (tags::MODALITY, VR::CS),
    (tags::MODALITIES_IN_STUDY, VR::CS),
    (tags::ACCESSION_NUMBER, VR::SH),
    (tags::NUMBER_OF_SERIES_RELATED_INSTANCES, VR::IS),
    (tags::NUMBER_OF_STUDY_RELATED_INSTANCES, VR::IS),
    (tags::NUMBER_OF_STUDY_RELATED_SERIES, VR::IS),
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Attribute {
    vr: VR,
    value: String,
}

/// Mutable query identifier, owned by a single run.
///
/// Stages apply level, then filters, then the link value. Moving from one
/// series query to the next only rewrites the link value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDataset {
    attributes: BTreeMap<Tag, Attribute>,
}

impl QueryDataset {
    /// A dataset holding only the return-key placeholders
    pub fn new() -> Self {
        let mut dataset = Self {
            attributes: BTreeMap::new(),
        };
        dataset.reset();
        dataset
    }

    /// Drop every attribute and insert the return-key placeholders
    pub fn reset(&mut self) {
        self.attributes.clear();
        for (tag, vr) in RETURN_KEYS {
            self.attributes.insert(
                tag,
                Attribute {
                    vr,
                    value: String::new(),
                },
            );
        }
    }

    pub fn set_level(&mut self, level: QueryLevel) {
        self.put(LEVEL_TAG, VR::CS, level.as_str());
        if level == QueryLevel::Study {
            // a study query is never restricted to a parent
            self.put(LINK_TAG, VR::UI, "");
        }
    }

    pub fn level(&self) -> Option<QueryLevel> {
        self.value(LEVEL_TAG).and_then(|v| v.parse().ok())
    }

    /// Merge translated filter values, replacing placeholders
    pub fn apply_filter_values(&mut self, values: &[(Tag, String)]) {
        for (tag, value) in values {
            let vr = self
                .attributes
                .get(tag)
                .map(|a| a.vr)
                .unwrap_or(VR::LO);
            self.put(*tag, vr, value);
        }
    }

    /// Restrict the query to exactly one parent study
    pub fn set_link_value(&mut self, study_instance_uid: &str) {
        self.put(LINK_TAG, VR::UI, study_instance_uid);
    }

    pub fn link_value(&self) -> Option<&str> {
        self.value(LINK_TAG).filter(|v| !v.is_empty())
    }

    pub fn value(&self, tag: Tag) -> Option<&str> {
        self.attributes.get(&tag).map(|a| a.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Tags in wire order
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.attributes.keys().copied()
    }

    /// Copy the current state into an identifier ready to send
    pub fn snapshot(&self) -> InMemDicomObject {
        InMemDicomObject::from_element_iter(self.attributes.iter().map(|(tag, attr)| {
            let value = if attr.value.is_empty() {
                PrimitiveValue::Empty
            } else {
                PrimitiveValue::from(attr.value.clone())
            };
            DataElement::new(*tag, attr.vr, value)
        }))
    }

    fn put(&mut self, tag: Tag, vr: VR, value: &str) {
        self.attributes.insert(
            tag,
            Attribute {
                vr,
                value: value.to_string(),
            },
        );
    }
}

impl Default for QueryDataset {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the linking identifier from a study-level match
pub fn link_identifier(record: &InMemDicomObject) -> Result<String, DimseError> {
    let element = record
        .element(LINK_TAG)
        .map_err(|_| DimseError::MalformedRecord("missing StudyInstanceUID".into()))?;
    let value = element
        .to_str()
        .map_err(|e| DimseError::MalformedRecord(format!("unreadable StudyInstanceUID: {}", e)))?;
    let uid = value.trim_end_matches(['\0', ' ']).trim();
    if uid.is_empty() {
        return Err(DimseError::MalformedRecord(
            "empty StudyInstanceUID".into(),
        ));
    }
    Ok(uid.to_string())
}
