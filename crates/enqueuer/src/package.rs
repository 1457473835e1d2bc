//! Maps dependency package coordinates to the repository that hosts them

use autoindex_core::Package;

const GO_MODULE_SCHEME: &str = "gomod";

/// Length of the abbreviated commit at the end of a Go pseudo-version
const PSEUDO_VERSION_COMMIT_LEN: usize = 12;

/// Trailing commit of a Go pseudo-version, e.g. `v0.0.0-20210101000000-abcdef123456`
fn pseudo_version_commit(version: &str) -> Option<&str> {
    let (_, commit) = version.rsplit_once('-')?;
    let is_commit = commit.len() == PSEUDO_VERSION_COMMIT_LEN
        && commit
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    is_commit.then_some(commit)
}

/// Work out the repository name and revision for a package
///
/// Only Go modules fetched over HTTPS are understood. The repository is the
/// first three path segments of the module path and the revision is the
/// commit embedded in a pseudo-version, or the version itself when it is a
/// plain tag.
pub fn infer_repository_and_revision(package: &Package) -> Option<(String, String)> {
    if package.scheme != GO_MODULE_SCHEME {
        return None;
    }
    let module_path = package.name.strip_prefix("https://")?;

    let segments: Vec<&str> = module_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .take(3)
        .collect();
    if segments.is_empty() || package.version.is_empty() {
        return None;
    }

    let version = package
        .version
        .strip_suffix("+incompatible")
        .unwrap_or(&package.version);
    let revision = pseudo_version_commit(version).unwrap_or(version);

    Some((segments.join("/"), revision.to_string()))
}
