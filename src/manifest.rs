use crate::error::UploadError;
use crate::metadata::DICOM_ANNOTATION_FIELDS;
use crate::plan::UploadPlan;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Default manifest file name, written into the working directory.
pub static MANIFEST_FILE: &str = "manifest.tsv";

/// Write one tab-separated row per planned upload, in the column layout the
/// platform's bulk-import tooling expects. Returns the number of data rows.
///
/// The `parent` column carries the planned remote folder path: entity ids do
/// not exist yet because manifest generation performs no remote calls.
pub fn write_manifest(plan: &UploadPlan, path: &Path) -> Result<usize, UploadError> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    let mut columns = vec!["path", "parent", "name", "forceVersion"];
    columns.extend(DICOM_ANNOTATION_FIELDS.iter().map(|(name, _)| *name));
    writeln!(out, "{}", columns.join("\t"))?;

    let mut rows = 0usize;
    for (container, file) in plan.file_tasks() {
        let mut cells = vec![
            file.path.display().to_string(),
            container.path.clone(),
            file.calculated_name.clone(),
            "true".to_string(),
        ];
        for (field_name, _) in DICOM_ANNOTATION_FIELDS {
            let cell = file
                .annotations
                .get(*field_name)
                .map(|value| value.to_string())
                .unwrap_or_default();
            cells.push(cell);
        }
        let row: Vec<String> = cells.into_iter().map(|c| escape_cell(&c)).collect();
        writeln!(out, "{}", row.join("\t"))?;
        rows += 1;
    }
    out.flush()?;

    info!("Manifest written to: {}", path.display());
    Ok(rows)
}

/// Cell values must stay on one line and free of the delimiter.
fn escape_cell(value: &str) -> String {
    if value.contains(['\t', '\n', '\r']) {
        value.replace(['\t', '\n', '\r'], " ")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::FileGroup;
    use crate::metadata::AnnotationValue;
    use crate::plan::{PlanOptions, build_plan};
    use crate::scan::LocalFile;
    use std::path::PathBuf;

    #[test]
    fn row_count_matches_planned_tasks() {
        let mut annotated = LocalFile::new(PathBuf::from("/data/a.dcm"), 1);
        annotated.annotations.insert(
            "PatientID".to_string(),
            AnnotationValue::Str("P-1".to_string()),
        );
        let groups = vec![FileGroup {
            name: "study".to_string(),
            files: vec![annotated, LocalFile::new(PathBuf::from("/data/b.dcm"), 1)],
        }];
        let plan = build_plan(
            groups,
            &PlanOptions {
                remote_path: None,
                limit: 100,
                max_depth: 5,
            },
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join(MANIFEST_FILE);
        let rows = write_manifest(&plan, &manifest_path).unwrap();
        assert_eq!(rows, plan.total_files);

        let content = std::fs::read_to_string(&manifest_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), rows + 1);

        let header: Vec<&str> = lines[0].split('\t').collect();
        assert_eq!(&header[..4], &["path", "parent", "name", "forceVersion"]);
        assert_eq!(header.len(), 4 + DICOM_ANNOTATION_FIELDS.len());

        let first: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(first[0], "/data/a.dcm");
        assert_eq!(first[1], "study");
        let patient_id_column = header.iter().position(|c| *c == "PatientID").unwrap();
        assert_eq!(first[patient_id_column], "P-1");
    }

    #[test]
    fn cells_never_carry_the_delimiter() {
        assert_eq!(escape_cell("plain"), "plain");
        assert_eq!(escape_cell("a\tb\nc"), "a b c");
    }
}
