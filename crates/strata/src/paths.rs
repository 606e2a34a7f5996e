//! Persisted layout of generated intermediates.
//!
//! Each stage owns its own root directory. The executor's orphan cleanup is
//! scoped per `builddir`, so the trees must never overlap.

/// Root of everything built for the bootstrap and primary stages
pub const BOOTSTRAP_DIR: &str = "$buildDir/.bootstrap";

/// `builddir` while the mini builder's own manifest is current
pub const MINI_BOOTSTRAP_DIR: &str = "$buildDir/.minibootstrap";

/// Shared output directory of every linked builder binary
pub const BIN_DIR: &str = "$BinDir";

/// Join path components with `/`, dropping empty and `.` components and
/// folding `..` where possible.
///
/// Components may contain Ninja variable references such as `$buildDir`; they
/// are treated as opaque path segments.
pub fn join_path<S: AsRef<str>>(parts: &[S]) -> String {
    let absolute = parts
        .iter()
        .map(AsRef::as_ref)
        .find(|p| !p.is_empty())
        .is_some_and(|p| p.starts_with('/'));

    let mut segments: Vec<&str> = Vec::new();
    for segment in parts.iter().flat_map(|p| p.as_ref().split('/')) {
        match segment {
            "" | "." => {}
            ".." if segments.last().is_some_and(|last| *last != "..") => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_owned(),
        (false, false) => joined,
    }
}

/// Parent directory of a path, `.` when there is none
pub fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_owned(),
        Some(idx) => path[..idx].to_owned(),
        None => ".".to_owned(),
    }
}

/// Prefix every path with `prefix`
pub fn prefix_paths(paths: &[String], prefix: &str) -> Vec<String> {
    paths.iter().map(|p| join_path(&[prefix, p.as_str()])).collect()
}

/// Module-specific package root. Final package archives are written here and
/// dependents find them through `-I` flags.
pub fn package_root(module_name: &str) -> String {
    join_path(&[BOOTSTRAP_DIR, module_name, "pkg"])
}

/// Module-specific root for test builds. Archives here contain everything
/// from [`package_root`] plus the test-only code.
pub fn test_root(module_name: &str) -> String {
    join_path(&[BOOTSTRAP_DIR, module_name, "test"])
}

/// Directory all of a module's source paths are relative to
pub fn module_src_dir(module_dir: &str) -> String {
    join_path(&["$srcDir", module_dir])
}

/// Module-specific object directory
pub fn module_obj_dir(module_name: &str) -> String {
    join_path(&[BOOTSTRAP_DIR, module_name, "obj"])
}

/// Location of a linked builder binary
pub fn binary_path(module_name: &str) -> String {
    join_path(&[BIN_DIR, module_name])
}

pub fn docs_dir() -> String {
    join_path(&[BOOTSTRAP_DIR, "docs"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path_cleans_components() {
        assert_eq!(join_path(&["$srcDir", "."]), "$srcDir");
        assert_eq!(join_path(&["$srcDir", ""]), "$srcDir");
        assert_eq!(join_path(&["$srcDir", "a/./b", "c.go"]), "$srcDir/a/b/c.go");
        assert_eq!(join_path(&["a/b", "../c"]), "a/c");
        assert_eq!(join_path(&["/", "tmp", "x"]), "/tmp/x");
        assert_eq!(join_path::<&str>(&[]), ".");
    }

    #[test]
    fn test_module_roots() {
        assert_eq!(package_root("lib"), "$buildDir/.bootstrap/lib/pkg");
        assert_eq!(test_root("lib"), "$buildDir/.bootstrap/lib/test");
        assert_eq!(module_obj_dir("tool"), "$buildDir/.bootstrap/tool/obj");
        assert_eq!(binary_path("tool"), "$BinDir/tool");
        assert_eq!(module_src_dir("pkg/lib"), "$srcDir/pkg/lib");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("$srcDir/lib/a_test.go"), "$srcDir/lib");
        assert_eq!(parent_dir("file.go"), ".");
    }
}
