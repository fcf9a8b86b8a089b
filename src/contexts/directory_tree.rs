use std::fs;
use std::io;
use std::path::Path;

/// Renders an indented listing of a directory for the opening prompt
#[derive(Debug, Clone)]
pub struct DirectoryTree {
    pub indent: String,
    pub max_depth: usize,
    /// Entry names that are never descended into or listed
    pub skip: Vec<String>,
}

impl Default for DirectoryTree {
    fn default() -> Self {
        Self {
            indent: "    ".to_string(),
            max_depth: 10,
            skip: [".git", "node_modules", "vendor", "target", ".editloop"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl DirectoryTree {
    pub fn render(&self, root: &Path) -> io::Result<String> {
        let mut out = String::from("DIRECTORY TREE:\n");
        self.walk(root, 0, &mut out)?;
        Ok(out)
    }

    fn walk(&self, dir: &Path, depth: usize, out: &mut String) -> io::Result<()> {
        if depth >= self.max_depth {
            return Ok(());
        }

        let mut entries: Vec<(bool, String)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if self.skip.iter().any(|s| s == &name) {
                continue;
            }
            entries.push((entry.file_type()?.is_dir(), name));
        }
        // Directories first, then by name
        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        for (is_dir, name) in entries {
            out.push_str(&self.indent.repeat(depth));
            if is_dir {
                out.push_str(&format!("{}/\n", name));
                self.walk(&dir.join(&name), depth + 1, out)?;
            } else {
                out.push_str(&format!("{}\n", name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src/bin")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("Cargo.toml"), "").unwrap();
        fs::write(root.join("src/lib.rs"), "").unwrap();
        fs::write(root.join("src/bin/tool.rs"), "").unwrap();

        let tree = DirectoryTree {
            indent: "  ".to_string(),
            ..DirectoryTree::default()
        }
        .render(root)
        .unwrap();

        assert_eq!(
            tree,
            "DIRECTORY TREE:\nsrc/\n  bin/\n    tool.rs\n  lib.rs\nCargo.toml\n"
        );
    }

    #[test]
    fn test_render_respects_depth() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();

        let tree = DirectoryTree {
            max_depth: 1,
            ..DirectoryTree::default()
        }
        .render(temp_dir.path())
        .unwrap();
        assert_eq!(tree, "DIRECTORY TREE:\na/\n");
    }
}
