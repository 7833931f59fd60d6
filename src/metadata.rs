use crate::error::UploadError;
use crate::scan::LocalFile;
use chrono::NaiveDate;
use dicom_object::DefaultDicomObject;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use tracing::{debug, warn};

/// A scalar annotation attached to an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Str(String),
    Int(i64),
    Date(NaiveDate),
}

impl Display for AnnotationValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationValue::Str(s) => write!(f, "{s}"),
            AnnotationValue::Int(i) => write!(f, "{i}"),
            AnnotationValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    Int,
    Date,
}

/// Header fields propagated into platform annotations, with the type each
/// one is coerced to. Values that fail coercion are kept as strings.
pub static DICOM_ANNOTATION_FIELDS: &[(&str, FieldKind)] = &[
    ("ContentDate", FieldKind::Date),
    ("ContentTime", FieldKind::Int),
    ("DeviceSerialNumber", FieldKind::Str),
    ("InstanceNumber", FieldKind::Int),
    ("InstitutionName", FieldKind::Str),
    ("Manufacturer", FieldKind::Str),
    ("Modality", FieldKind::Str),
    ("PatientBirthDate", FieldKind::Date),
    ("PatientID", FieldKind::Str),
    ("PerformedProcedureStepID", FieldKind::Str),
    ("PerformedProcedureStepStartDate", FieldKind::Date),
    ("PerformedProcedureStepStartTime", FieldKind::Str),
    ("SOPClassUID", FieldKind::Str),
    ("SOPInstanceUID", FieldKind::Str),
    ("SeriesDate", FieldKind::Date),
    ("SeriesInstanceUID", FieldKind::Str),
    ("SeriesNumber", FieldKind::Int),
    ("SeriesTime", FieldKind::Int),
    ("SoftwareVersions", FieldKind::Str),
    ("StudyDate", FieldKind::Date),
    ("StudyID", FieldKind::Str),
    ("StudyInstanceUID", FieldKind::Str),
    ("StudyTime", FieldKind::Int),
];

const DATE_FORMAT: &str = "%Y%m%d";

pub fn is_dicom_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".dcm")
}

/// Populate `file.annotations` from the DICOM header and rewrite the
/// calculated name to `{PatientID}_{StudyDate}_{name}`.
///
/// Non-DICOM files pass through untouched. A corrupt or unsupported header
/// leaves the file with empty annotations and its original name; the run
/// continues.
pub fn enrich(file: &mut LocalFile) {
    if !is_dicom_name(&file.name) {
        return;
    }

    let object = match read_dicom(&file.path) {
        Ok(object) => object,
        Err(err) => {
            warn!("{err}");
            return;
        }
    };

    for (field_name, kind) in DICOM_ANNOTATION_FIELDS {
        if let Some(value) = read_field(&object, field_name, *kind) {
            file.annotations.insert((*field_name).to_string(), value);
        }
    }

    if let Some(study_name) = calculated_study_name(file) {
        debug!(
            "Renaming {} -> {study_name} from header fields",
            file.calculated_name
        );
        file.calculated_name = study_name;
    }
}

fn read_dicom(path: &Path) -> Result<DefaultDicomObject, UploadError> {
    dicom_object::open_file(path).map_err(|err| UploadError::MetadataExtraction {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn read_field(
    object: &DefaultDicomObject,
    field_name: &str,
    kind: FieldKind,
) -> Option<AnnotationValue> {
    let element = match object.element_by_name(field_name) {
        Ok(element) => element,
        Err(_) => {
            warn!("Field not found: {field_name}");
            return None;
        }
    };
    let text = match element.to_str() {
        Ok(text) => text.trim().to_string(),
        Err(err) => {
            warn!("Could not parse {field_name}: {err}");
            return None;
        }
    };
    if text.is_empty() {
        return None;
    }

    let value = match kind {
        FieldKind::Str => AnnotationValue::Str(text),
        FieldKind::Int => match text.parse::<i64>() {
            Ok(int) => AnnotationValue::Int(int),
            Err(err) => {
                warn!("Could not parse {field_name} as integer ({text}): {err}");
                AnnotationValue::Str(text)
            }
        },
        FieldKind::Date => match NaiveDate::parse_from_str(&text, DATE_FORMAT) {
            Ok(date) => AnnotationValue::Date(date),
            Err(err) => {
                warn!("Could not parse {field_name} as date ({text}): {err}");
                AnnotationValue::Str(text)
            }
        },
    };
    Some(value)
}

/// `{PatientID}_{StudyDate}_{original name}` with `-` flattened to `_`,
/// matching the naming the platform's downstream tooling expects.
fn calculated_study_name(file: &LocalFile) -> Option<String> {
    let patient_id = match file.annotations.get("PatientID")? {
        AnnotationValue::Str(id) => id.clone(),
        other => other.to_string(),
    };
    let study_date = match file.annotations.get("StudyDate")? {
        AnnotationValue::Date(date) => date.format(DATE_FORMAT).to_string(),
        other => other.to_string(),
    };
    Some(format!("{patient_id}_{study_date}_{}", file.name).replace('-', "_"))
}
