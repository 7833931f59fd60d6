use crate::config::MAX_CHILDREN_PER_CONTAINER;
use crate::error::UploadError;
use crate::group::FileGroup;
use crate::scan::LocalFile;

#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Folder path inside the project that everything uploads under.
    pub remote_path: Option<String>,
    /// Maximum direct children per remote folder.
    pub limit: usize,
    /// Maximum folder nesting depth below the project root.
    pub max_depth: usize,
}

/// A remote folder to be created (or reused) during the run. The root node
/// stands for the project itself and is never created.
#[derive(Debug, Clone)]
pub struct ContainerNode {
    pub name: String,
    /// `/`-joined path relative to the project root; empty for the root.
    pub path: String,
    pub children: Vec<ContainerNode>,
    pub files: Vec<LocalFile>,
}

impl ContainerNode {
    fn root() -> Self {
        Self {
            name: String::new(),
            path: String::new(),
            children: Vec::new(),
            files: Vec::new(),
        }
    }

    fn child_of(parent_path: &str, name: &str) -> Self {
        let path = if parent_path.is_empty() {
            name.to_string()
        } else {
            format!("{parent_path}/{name}")
        };
        Self {
            name: name.to_string(),
            path,
            children: Vec::new(),
            files: Vec::new(),
        }
    }

    fn display_path(&self) -> &str {
        if self.path.is_empty() {
            "<project root>"
        } else {
            &self.path
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadPlan {
    pub root: ContainerNode,
    pub total_files: usize,
}

impl UploadPlan {
    /// Number of folders that will be created remotely.
    pub fn container_count(&self) -> usize {
        fn count(node: &ContainerNode) -> usize {
            node.children.len() + node.children.iter().map(count).sum::<usize>()
        }
        count(&self.root)
    }

    /// Every planned file upload, paired with its target folder, in
    /// depth-first creation order.
    pub fn file_tasks(&self) -> Vec<(&ContainerNode, &LocalFile)> {
        fn visit<'a>(node: &'a ContainerNode, out: &mut Vec<(&'a ContainerNode, &'a LocalFile)>) {
            for file in &node.files {
                out.push((node, file));
            }
            for child in &node.children {
                visit(child, out);
            }
        }
        let mut out = Vec::new();
        visit(&self.root, &mut out);
        out
    }
}

/// Lay the groups out as a folder tree in which no folder exceeds `limit`
/// direct children.
///
/// A group larger than the limit is split across numbered sibling folders
/// (`01`, `02`, ...) in stable lexical order. Fails when the required
/// nesting would exceed `max_depth`, or when the layout cannot satisfy the
/// limit at all (more sibling folders than the limit allows).
pub fn build_plan(groups: Vec<FileGroup>, opts: &PlanOptions) -> Result<UploadPlan, UploadError> {
    if opts.limit == 0 || opts.limit > MAX_CHILDREN_PER_CONTAINER {
        return Err(UploadError::DepthExceeded(format!(
            "children per folder must be between 1 and {MAX_CHILDREN_PER_CONTAINER}, got {}",
            opts.limit
        )));
    }

    let prefix: Vec<String> = opts
        .remote_path
        .as_deref()
        .unwrap_or_default()
        .split('/')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().to_string())
        .collect();

    let mut root = ContainerNode::root();
    let mut total_files = 0usize;

    {
        let mut attach = &mut root;
        for segment in &prefix {
            let child = ContainerNode::child_of(&attach.path, segment);
            attach.children.push(child);
            attach = attach.children.last_mut().unwrap();
        }

        for group in groups {
            total_files += group.files.len();
            place_group(attach, group, opts, prefix.len())?;
        }
    }

    check_limits(&root, opts.limit)?;

    Ok(UploadPlan { root, total_files })
}

fn place_group(
    attach: &mut ContainerNode,
    group: FileGroup,
    opts: &PlanOptions,
    prefix_depth: usize,
) -> Result<(), UploadError> {
    let group_levels = usize::from(!group.name.is_empty());
    let split = group.files.len() > opts.limit;
    let required_depth = prefix_depth + group_levels + usize::from(split);
    if required_depth > opts.max_depth {
        let shown = if group.name.is_empty() {
            attach.display_path()
        } else {
            group.name.as_str()
        };
        return Err(UploadError::DepthExceeded(format!(
            "placing `{shown}` needs folders {required_depth} levels deep, max depth is {}",
            opts.max_depth
        )));
    }

    let target = if group.name.is_empty() {
        attach
    } else {
        let child = ContainerNode::child_of(&attach.path, &group.name);
        attach.children.push(child);
        attach.children.last_mut().unwrap()
    };

    if !split {
        target.files.extend(group.files);
        return Ok(());
    }

    let chunks: Vec<&[LocalFile]> = group.files.chunks(opts.limit).collect();
    let padding = chunks.len().to_string().len().max(2);
    for (index, chunk) in chunks.iter().enumerate() {
        let name = format!("{:0padding$}", index + 1);
        let mut child = ContainerNode::child_of(&target.path, &name);
        child.files.extend(chunk.iter().cloned());
        target.children.push(child);
    }
    Ok(())
}

fn check_limits(node: &ContainerNode, limit: usize) -> Result<(), UploadError> {
    let direct = node.children.len() + node.files.len();
    if direct > limit {
        return Err(UploadError::DepthExceeded(format!(
            "folder `{}` would hold {direct} children, limit is {limit}",
            node.display_path()
        )));
    }
    for child in &node.children {
        check_limits(child, limit)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn files(prefix: &str, count: usize) -> Vec<LocalFile> {
        (0..count)
            .map(|i| LocalFile::new(PathBuf::from(format!("/data/{prefix}_{i:05}.dcm")), 1))
            .collect()
    }

    fn opts(limit: usize) -> PlanOptions {
        PlanOptions {
            remote_path: None,
            limit,
            max_depth: 10,
        }
    }

    fn assert_limit_holds(node: &ContainerNode, limit: usize) {
        assert!(node.children.len() + node.files.len() <= limit);
        for child in &node.children {
            assert_limit_holds(child, limit);
        }
    }

    #[test]
    fn oversized_group_splits_into_numbered_siblings() {
        let groups = vec![FileGroup {
            name: "study-A".to_string(),
            files: files("img", 25_000),
        }];
        let plan = build_plan(groups, &opts(10_000)).unwrap();

        assert_eq!(plan.total_files, 25_000);
        let study = &plan.root.children[0];
        assert_eq!(study.name, "study-A");
        let names: Vec<_> = study.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["01", "02", "03"]);
        assert_limit_holds(&plan.root, 10_000);

        let mut seen = BTreeSet::new();
        for (_, file) in plan.file_tasks() {
            assert!(seen.insert(file.path.clone()), "file planned twice");
        }
        assert_eq!(seen.len(), 25_000);
    }

    #[test]
    fn small_group_becomes_one_folder() {
        let groups = vec![FileGroup {
            name: "study-B".to_string(),
            files: files("img", 5),
        }];
        let plan = build_plan(groups, &opts(10)).unwrap();
        assert_eq!(plan.container_count(), 1);
        assert_eq!(plan.root.children[0].files.len(), 5);
    }

    #[test]
    fn flat_single_chunk_stays_at_the_attach_point() {
        let groups = vec![FileGroup {
            name: String::new(),
            files: files("img", 7),
        }];
        let plan = build_plan(groups, &opts(100)).unwrap();
        assert_eq!(plan.container_count(), 0);
        assert_eq!(plan.root.files.len(), 7);
    }

    #[test]
    fn remote_path_becomes_a_folder_chain() {
        let groups = vec![FileGroup {
            name: String::new(),
            files: files("img", 3),
        }];
        let plan = build_plan(
            groups,
            &PlanOptions {
                remote_path: Some("/raw/site-1/".to_string()),
                limit: 100,
                max_depth: 10,
            },
        )
        .unwrap();

        let raw = &plan.root.children[0];
        assert_eq!(raw.path, "raw");
        let site = &raw.children[0];
        assert_eq!(site.path, "raw/site-1");
        assert_eq!(site.files.len(), 3);
    }

    #[test]
    fn limit_above_platform_maximum_is_rejected() {
        let err = build_plan(Vec::new(), &opts(10_001)).unwrap_err();
        assert!(matches!(err, UploadError::DepthExceeded(_)));
    }

    #[test]
    fn nesting_past_max_depth_is_rejected() {
        let groups = vec![FileGroup {
            name: "study-C".to_string(),
            files: files("img", 30),
        }];
        let err = build_plan(
            groups,
            &PlanOptions {
                remote_path: Some("a/b".to_string()),
                limit: 10,
                max_depth: 3,
            },
        )
        .unwrap_err();
        assert!(matches!(err, UploadError::DepthExceeded(_)));
    }

    #[test]
    fn too_many_sibling_folders_cannot_satisfy_the_limit() {
        let groups = (0..5)
            .map(|i| FileGroup {
                name: format!("study-{i}"),
                files: files(&format!("g{i}"), 1),
            })
            .collect();
        let err = build_plan(groups, &opts(3)).unwrap_err();
        assert!(matches!(err, UploadError::DepthExceeded(_)));
    }

    #[test]
    fn file_task_count_matches_total() {
        let groups = vec![
            FileGroup {
                name: "s1".to_string(),
                files: files("a", 12),
            },
            FileGroup {
                name: "s2".to_string(),
                files: files("b", 4),
            },
        ];
        let plan = build_plan(groups, &opts(10)).unwrap();
        assert_eq!(plan.file_tasks().len(), 16);
        assert_eq!(plan.total_files, 16);
    }
}
