use std::fs;
use std::path::Path;

// Some integration-test crates only need one of these helpers; keep both
// available without per-crate dead-code warnings.
#[allow(dead_code)]
pub fn write_source(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap_or_else(|err| panic!("write source: {err}"));
}

#[allow(dead_code)]
pub fn write_sources(root: &Path, sources: &[(&str, &str)]) {
    for (relative, contents) in sources {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .unwrap_or_else(|err| panic!("create dir {}: {err}", parent.display()));
        }
        write_source(&path, contents);
    }
}
