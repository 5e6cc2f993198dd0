//! Storage discovery for hookscript installation.

use serde::Deserialize;

/// Content kind a storage must accept to hold hookscripts.
pub const SNIPPETS_CONTENT: &str = "snippets";

/// One entry of `pvesh get /storage --output-format json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageEntry {
    /// Storage identifier, used in volume references (`<name>:snippets/...`)
    #[serde(rename = "storage")]
    pub name: String,

    /// Comma-separated content kinds, e.g. `iso,vztmpl,snippets`
    #[serde(default)]
    pub content: String,

    /// Mount path for file based storages; absent for block storages
    #[serde(default)]
    pub path: Option<String>,
}

impl StorageEntry {
    /// Check if the storage accepts the given content kind.
    pub fn accepts(&self, kind: &str) -> bool {
        self.content.split(',').any(|c| c.trim() == kind)
    }

    /// Filesystem path, if the storage has a non-empty one.
    pub fn dir(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.is_empty())
    }
}

/// First storage with a filesystem path that accepts snippets.
pub fn find_snippet_store(entries: &[StorageEntry]) -> Option<&StorageEntry> {
    entries
        .iter()
        .find(|entry| entry.dir().is_some() && entry.accepts(SNIPPETS_CONTENT))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PVESH_OUTPUT: &str = r#"[
        {"storage": "local-lvm", "content": "rootdir,images", "type": "lvmthin", "digest": "abc"},
        {"storage": "iso", "content": "iso,vztmpl", "path": "/mnt/iso", "type": "dir"},
        {"storage": "broken", "content": "snippets", "path": ""},
        {"storage": "local", "content": "iso,snippets,backup", "path": "/var/lib/vz", "type": "dir"},
        {"storage": "later", "content": "snippets", "path": "/mnt/later"}
    ]"#;

    #[test]
    fn test_decode_pvesh_output() {
        let entries: Vec<StorageEntry> = serde_json::from_str(PVESH_OUTPUT).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].name, "local-lvm");
        assert!(entries[0].path.is_none());
        assert_eq!(entries[1].dir(), Some("/mnt/iso"));
        assert_eq!(entries[2].dir(), None);
    }

    #[test]
    fn test_accepts() {
        let entry = StorageEntry {
            name: "local".to_string(),
            content: "iso, snippets".to_string(),
            path: Some("/var/lib/vz".to_string()),
        };
        assert!(entry.accepts("snippets"));
        assert!(entry.accepts("iso"));
        assert!(!entry.accepts("snip"));
    }

    #[test]
    fn test_find_snippet_store_picks_first_usable() {
        let entries: Vec<StorageEntry> = serde_json::from_str(PVESH_OUTPUT).unwrap();
        let store = find_snippet_store(&entries).expect("local accepts snippets");
        assert_eq!(store.name, "local");
        assert_eq!(store.dir(), Some("/var/lib/vz"));
    }

    #[test]
    fn test_find_snippet_store_none() {
        let entries: Vec<StorageEntry> =
            serde_json::from_str(r#"[{"storage": "iso", "content": "iso", "path": "/mnt"}]"#)
                .unwrap();
        assert!(find_snippet_store(&entries).is_none());
        assert!(find_snippet_store(&[]).is_none());
    }
}
