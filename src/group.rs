use crate::metadata::AnnotationValue;
use crate::scan::LocalFile;
use clap::ValueEnum;
use std::collections::BTreeMap;

/// Policy used to bucket files into logical folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GroupBy {
    /// One folder per study, keyed on DICOM PatientID + StudyDate when
    /// available, otherwise on the filename stem with trailing counter
    /// tokens stripped.
    Study,
    /// A single linear sequence, chunked only by the folder limit.
    Flat,
}

/// An ordered set of files destined for one logical folder. The empty name
/// means the files sit directly under the upload target.
#[derive(Debug, Clone)]
pub struct FileGroup {
    pub name: String,
    pub files: Vec<LocalFile>,
}

/// Bucket files by the configured policy.
///
/// Membership depends only on the grouping key, never on arrival order:
/// groups and their members come back sorted, and duplicate remote names are
/// uniqued with a counter prefix before bucketing.
pub fn group_files(mut files: Vec<LocalFile>, policy: GroupBy) -> Vec<FileGroup> {
    files.sort_by(|a, b| a.path.cmp(&b.path));
    unique_duplicate_names(&mut files);

    let mut groups: BTreeMap<String, Vec<LocalFile>> = BTreeMap::new();
    for file in files {
        let key = match policy {
            GroupBy::Study => study_key(&file),
            GroupBy::Flat => String::new(),
        };
        groups.entry(key).or_default().push(file);
    }

    groups
        .into_iter()
        .map(|(name, mut files)| {
            files.sort_by(|a, b| a.calculated_name.cmp(&b.calculated_name));
            FileGroup { name, files }
        })
        .collect()
}

/// Files that would collide remotely get a 1-based counter prefix, so
/// `scan.dcm` twice becomes `1_scan.dcm` and `2_scan.dcm`.
fn unique_duplicate_names(files: &mut [LocalFile]) {
    let mut occurrences: BTreeMap<String, usize> = BTreeMap::new();
    for file in files.iter() {
        *occurrences.entry(file.calculated_name.clone()).or_default() += 1;
    }

    let mut counters: BTreeMap<String, usize> = BTreeMap::new();
    for file in files.iter_mut() {
        if occurrences[&file.calculated_name] <= 1 {
            continue;
        }
        let counter = counters
            .entry(file.calculated_name.clone())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        file.calculated_name = format!("{counter}_{}", file.calculated_name);
    }
}

fn study_key(file: &LocalFile) -> String {
    if let (Some(patient_id), Some(study_date)) = (
        file.annotations.get("PatientID"),
        file.annotations.get("StudyDate"),
    ) {
        let date = match study_date {
            AnnotationValue::Date(date) => date.format("%Y%m%d").to_string(),
            other => other.to_string(),
        };
        return sanitize(&format!("{patient_id}_{date}"));
    }
    sanitize(&stripped_stem(&file.name))
}

/// Drop the extension, then trailing all-numeric tokens: `study-A_003_12.dcm`
/// keys as `study-A`.
fn stripped_stem(name: &str) -> String {
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    let mut tokens: Vec<&str> = stem.split('_').collect();
    while tokens.len() > 1
        && tokens
            .last()
            .is_some_and(|t| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()))
    {
        tokens.pop();
    }
    tokens.join("_")
}

fn sanitize(key: &str) -> String {
    key.replace(['/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(name: &str) -> LocalFile {
        LocalFile::new(PathBuf::from(format!("/data/{name}")), 1)
    }

    #[test]
    fn every_file_lands_in_exactly_one_group() {
        let files: Vec<_> = (0..40)
            .map(|i| file(&format!("study-{}_{:03}.dcm", i % 4, i)))
            .collect();
        let input_count = files.len();

        let groups = group_files(files, GroupBy::Study);
        let grouped: usize = groups.iter().map(|g| g.files.len()).sum();
        assert_eq!(grouped, input_count);

        let mut seen: Vec<&str> = groups
            .iter()
            .flat_map(|g| g.files.iter().map(|f| f.name.as_str()))
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), input_count);
    }

    #[test]
    fn grouping_is_independent_of_arrival_order() {
        let files: Vec<_> = (0..10)
            .map(|i| file(&format!("series_{}_{i}.dcm", i % 2)))
            .collect();
        let mut reversed = files.clone();
        reversed.reverse();

        let a = group_files(files, GroupBy::Study);
        let b = group_files(reversed, GroupBy::Study);
        let names_a: Vec<_> = a.iter().map(|g| g.name.clone()).collect();
        let names_b: Vec<_> = b.iter().map(|g| g.name.clone()).collect();
        assert_eq!(names_a, names_b);
        for (ga, gb) in a.iter().zip(b.iter()) {
            let fa: Vec<_> = ga.files.iter().map(|f| &f.calculated_name).collect();
            let fb: Vec<_> = gb.files.iter().map(|f| &f.calculated_name).collect();
            assert_eq!(fa, fb);
        }
    }

    #[test]
    fn flat_policy_yields_one_group() {
        let files = vec![file("a.dcm"), file("b.dcm"), file("c.txt")];
        let groups = group_files(files, GroupBy::Flat);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "");
        assert_eq!(groups[0].files.len(), 3);
    }

    #[test]
    fn duplicate_names_get_counter_prefixes() {
        let mut files = vec![
            LocalFile::new(PathBuf::from("/data/one/scan.dcm"), 1),
            LocalFile::new(PathBuf::from("/data/two/scan.dcm"), 1),
            LocalFile::new(PathBuf::from("/data/unique.dcm"), 1),
        ];
        unique_duplicate_names(&mut files);
        let names: Vec<_> = files.iter().map(|f| f.calculated_name.as_str()).collect();
        assert_eq!(names, vec!["1_scan.dcm", "2_scan.dcm", "unique.dcm"]);
    }

    #[test]
    fn stem_stripping_drops_trailing_counters() {
        assert_eq!(stripped_stem("study-A_001_002.dcm"), "study-A");
        assert_eq!(stripped_stem("study_12.dcm"), "study");
        assert_eq!(stripped_stem("12345.dcm"), "12345");
        assert_eq!(stripped_stem("plain.txt"), "plain");
    }

    #[test]
    fn study_key_prefers_header_identity() {
        let mut f = file("anything_001.dcm");
        f.annotations.insert(
            "PatientID".into(),
            AnnotationValue::Str("P/01".to_string()),
        );
        f.annotations.insert(
            "StudyDate".into(),
            AnnotationValue::Date(chrono::NaiveDate::from_ymd_opt(2017, 3, 14).unwrap()),
        );
        assert_eq!(study_key(&f), "P_01_20170314");
    }
}
