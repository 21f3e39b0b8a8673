/// Identifier for source files used when formatting diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileId(pub usize);

impl FileId {
    pub const UNKNOWN: Self = FileId(usize::MAX);
}

impl Default for FileId {
    fn default() -> Self {
        FileId::UNKNOWN
    }
}

/// Registry of compiled file names, indexed by [`FileId`].
///
/// Spans carry line/column coordinates directly, so the cache only needs to
/// remember names; registration order determines the ids.
#[derive(Clone, Debug, Default)]
pub struct FileCache {
    names: Vec<String>,
}

impl FileCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: impl Into<String>) -> FileId {
        let name = name.into();
        if let Some(index) = self.names.iter().position(|existing| *existing == name) {
            return FileId(index);
        }
        self.names.push(name);
        FileId(self.names.len() - 1)
    }

    #[must_use]
    pub fn name(&self, id: FileId) -> Option<&str> {
        self.names.get(id.0).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_reuses_existing_entries() {
        let mut files = FileCache::new();
        let first = files.intern("main.loam");
        let second = files.intern("util.loam");
        let again = files.intern("main.loam");

        assert_eq!(first, again);
        assert_ne!(first, second);
        assert_eq!(files.name(first), Some("main.loam"));
    }

    #[test]
    fn unknown_id_has_no_name() {
        let files = FileCache::new();
        assert_eq!(files.name(FileId::UNKNOWN), None);
    }
}
