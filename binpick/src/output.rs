use std::fmt;
use std::path::PathBuf;

/// One file (or directory) produced by an install.
///
/// `content` is only held between extraction and the write step, which takes
/// it; after [`crate::planner::write_files`] it is always empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputFile {
    pub mode: u32,
    pub size: u64,
    pub install_path: PathBuf,
    pub origin_path: String,
    pub is_dir: bool,
    pub content: Vec<u8>,
}

impl OutputFile {
    pub fn is_executable(&self) -> bool {
        !self.is_dir && self.mode & 0o111 != 0
    }
}

impl fmt::Display for OutputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>9} {} -> {}",
            mode_string(self.mode, self.is_dir),
            human_size(self.size),
            self.origin_path,
            self.install_path.display()
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallItem {
    pub install_dir: PathBuf,
    /// Directory that should be on `PATH` for this install.
    pub bin_dir: PathBuf,
    pub files: Vec<OutputFile>,
}

/// Download URL (or local path) -> what was installed from it, in install order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOutput {
    items: Vec<(String, InstallItem)>,
}

impl InstallOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an install; a second install from the same URL replaces the first.
    pub fn insert(&mut self, url: impl Into<String>, item: InstallItem) {
        let url = url.into();
        match self.items.iter_mut().find(|(u, _)| *u == url) {
            Some(slot) => slot.1 = item,
            None => self.items.push((url, item)),
        }
    }

    pub fn extend(&mut self, other: InstallOutput) {
        for (url, item) in other.items {
            self.insert(url, item);
        }
    }

    pub fn get(&self, url: &str) -> Option<&InstallItem> {
        self.items.iter().find(|(u, _)| u == url).map(|(_, i)| i)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InstallItem)> {
        self.items.iter().map(|(u, i)| (u.as_str(), i))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Display for InstallOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (url, item) in self.iter() {
            writeln!(f, "{url}")?;
            for file in item.files.iter().filter(|f| !f.is_dir) {
                writeln!(f, "  {file}")?;
            }
        }
        Ok(())
    }
}

/// `ls -l` style permission string.
pub fn mode_string(mode: u32, is_dir: bool) -> String {
    let mut s = String::with_capacity(10);
    s.push(if is_dir { 'd' } else { '-' });
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    s
}

pub fn human_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if size < 1024 {
        return format!("{size} B");
    }
    let mut value = size as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_string() {
        assert_eq!(mode_string(0o755, false), "-rwxr-xr-x");
        assert_eq!(mode_string(0o644, false), "-rw-r--r--");
        assert_eq!(mode_string(0o755, true), "drwxr-xr-x");
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_display_line() {
        let file = OutputFile {
            mode: 0o755,
            size: 2048,
            install_path: PathBuf::from("/home/u/.binpick/mujs"),
            origin_path: "mujs".to_string(),
            ..Default::default()
        };
        assert_eq!(
            file.to_string(),
            "-rwxr-xr-x    2.0 KB mujs -> /home/u/.binpick/mujs"
        );
    }

    #[test]
    fn test_insert_replaces_same_url() {
        let mut output = InstallOutput::new();
        output.insert("a", InstallItem::default());
        output.insert("b", InstallItem::default());
        output.insert(
            "a",
            InstallItem {
                install_dir: PathBuf::from("/x"),
                ..Default::default()
            },
        );
        assert_eq!(output.len(), 2);
        assert_eq!(output.get("a").unwrap().install_dir, PathBuf::from("/x"));
        assert_eq!(output.iter().next().unwrap().0, "a");
    }
}
