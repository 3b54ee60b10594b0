/// Driver-independent directory tree

/// A named node: a file, or a directory with children
///
/// Drivers rebuild the whole tree every time they parse their catalogue,
/// so a tree never outlives the listing it describes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryEntry {
    /// Entry name, without any path
    pub name: String,
    /// Directory rather than file
    pub is_directory: bool,
    /// Child entries in catalogue order
    pub children: Vec<DirectoryEntry>,
}

impl DirectoryEntry {
    /// The top of a volume
    pub fn root(name: impl Into<String>) -> Self {
        Self::directory(name)
    }

    /// A file leaf
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            children: Vec::new(),
        }
    }

    /// An empty directory
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            children: Vec::new(),
        }
    }

    /// Append a child
    pub fn add_child(&mut self, child: DirectoryEntry) {
        self.children.push(child);
    }

    /// Walk `path` token by token on '/', ignoring case
    pub fn find(&self, path: &str) -> Option<&DirectoryEntry> {
        path.split('/')
            .filter(|t| !t.is_empty())
            .try_fold(self, |node, token| {
                node.children
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(token))
            })
    }

    /// Every file below this node as a '/'-joined path
    pub fn file_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths("", &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: &str, paths: &mut Vec<String>) {
        for child in &self.children {
            let path = if prefix.is_empty() {
                child.name.clone()
            } else {
                format!("{}/{}", prefix, child.name)
            };
            if child.is_directory {
                child.collect_paths(&path, paths);
            } else {
                paths.push(path);
            }
        }
    }

    /// Number of files below this node
    pub fn count_files(&self) -> usize {
        self.children
            .iter()
            .map(|c| if c.is_directory { c.count_files() } else { 1 })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DirectoryEntry {
        let mut cmds = DirectoryEntry::directory("CMDS");
        cmds.add_child(DirectoryEntry::file("dir"));
        cmds.add_child(DirectoryEntry::file("list"));
        let mut root = DirectoryEntry::root("OS9 Disk");
        root.add_child(DirectoryEntry::file("startup"));
        root.add_child(cmds);
        root.add_child(DirectoryEntry::directory("SYS"));
        root
    }

    #[test]
    fn test_find() {
        let root = sample();
        assert_eq!(root.find("cmds/DIR").map(|e| e.name.as_str()), Some("dir"));
        assert_eq!(root.find("/CMDS/list").map(|e| e.is_directory), Some(false));
        assert!(root.find("CMDS").unwrap().is_directory);
        assert!(root.find("CMDS/missing").is_none());
        assert_eq!(root.find(""), Some(&root));
    }

    #[test]
    fn test_file_paths_and_count() {
        let root = sample();
        assert_eq!(root.file_paths(), vec!["startup", "CMDS/dir", "CMDS/list"]);
        assert_eq!(root.count_files(), 3);
        assert_eq!(DirectoryEntry::root("empty").count_files(), 0);
    }
}
