//! # Archive Path Resolver
//!
//! Maps resource identifiers to paths inside an archive and moves deposited
//! files into place.
//!
//! ## Layout
//!
//! ```text
//! <root>/resources/<shard>/<identifier>[.ext]
//! ```
//!
//! `<shard>` is the first `shard_length` characters of the identifier. An
//! identifier owns exactly one entry in its shard directory: either a file
//! or directory named exactly `<identifier>`, or one named `<identifier>.<ext>`.
//!
//! ## Concurrency
//!
//! The archive assumes a single writer. [`store`] checks for an existing
//! entry and then moves the source; two processes depositing the same
//! identifier at once can race between those steps.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::config::{directory_mode, ArchiveConfig, RESOURCE_SUBDIR};
use crate::error::ArchiveError;
use crate::identifier::ResourceId;
use crate::unix;

/// The shard directory name for `id`: its first `len` characters, or the
/// whole identifier when it is shorter.
pub fn shard_key(id: &str, len: usize) -> &str {
    match id.char_indices().nth(len) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// The exact-name path for `id` under the archive at `root`. The entry may
/// not exist, and a stored resource may carry an extension.
pub fn resource_path(root: &Path, id: &str, shard_length: usize) -> PathBuf {
    root.join(RESOURCE_SUBDIR)
        .join(shard_key(id, shard_length))
        .join(id)
}

/// Find the stored entry for `id`, if any.
///
/// An entry named exactly `id` wins. Otherwise entries named `id.<ext>` are
/// considered in sorted order, regular files ahead of directories.
pub fn resolve(root: &Path, id: &str, shard_length: usize) -> Option<PathBuf> {
    let exact = resource_path(root, id, shard_length);
    if fs::symlink_metadata(&exact).is_ok() {
        return Some(exact);
    }
    let shard = exact.parent()?;
    let prefix = format!("{id}.");
    let mut candidates: Vec<(bool, PathBuf)> = fs::read_dir(shard)
        .ok()?
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .map(|e| {
            let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
            (is_dir, e.path())
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next().map(|(_, path)| path)
}

/// The extension part of a file name: everything after the first `.` that
/// is not a leading dot (`a.tar.gz` → `.tar.gz`).
pub fn full_extension(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    let idx = name.get(1..)?.find('.')? + 1;
    Some(name[idx..].to_string())
}

/// Verify that the archive's resource directory accepts new entries.
pub fn check_writable(config: &ArchiveConfig) -> Result<(), ArchiveError> {
    let dir = config.resources_dir();
    if dir.is_dir() && unix::is_writable(&dir) {
        Ok(())
    } else {
        Err(ArchiveError::NotWritable(dir))
    }
}

/// Move `src` into the archive under `id` and apply the archive's access
/// policy.
///
/// On success the stored path is returned and `src` no longer exists. A
/// [`ArchiveError::PermissionsNotApplied`] error also means the resource was
/// moved; every other error leaves `src` where it was.
pub fn store(config: &ArchiveConfig, src: &Path, id: &ResourceId) -> Result<PathBuf, ArchiveError> {
    let policy = &config.policy;
    let meta = fs::metadata(src)?;
    if meta.is_dir() && !policy.allow_directories {
        return Err(ArchiveError::PolicyViolation(format!(
            "{} is a directory and this archive does not allow directories",
            src.display()
        )));
    }
    if let Some(existing) = resolve(&config.path, id.as_str(), policy.shard_length) {
        return Err(ArchiveError::Conflict {
            id: id.to_string(),
            existing,
        });
    }

    let mut target = resource_path(&config.path, id.as_str(), policy.shard_length);
    if policy.keep_extensions {
        if let Some(ext) = full_extension(src) {
            target.set_file_name(format!("{id}{ext}"));
        }
    }
    if let Some(shard) = target.parent() {
        fs::create_dir_all(shard).map_err(|e| ArchiveError::CreateDir {
            path: shard.to_path_buf(),
            source: e,
        })?;
    }

    move_entry(src, &target).map_err(|e| ArchiveError::Move {
        from: src.to_path_buf(),
        to: target.clone(),
        source: e,
    })?;
    tracing::debug!(src = %src.display(), target = %target.display(), "moved resource");

    apply_permissions(config, &target).map_err(|reason| ArchiveError::PermissionsNotApplied {
        path: target.clone(),
        reason,
    })?;
    Ok(target)
}

/// Every stored resource in the archive at `root`, sorted by path.
pub fn iter_resources(root: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let resources = root.join(RESOURCE_SUBDIR);
    let mut out = Vec::new();
    for shard in fs::read_dir(&resources)? {
        let shard = shard?;
        if !shard.file_type()?.is_dir() {
            continue;
        }
        for entry in fs::read_dir(shard.path())? {
            out.push(entry?.path());
        }
    }
    out.sort();
    Ok(out)
}

fn move_entry(src: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(src, target) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            tracing::debug!(src = %src.display(), "cross-device move, copying");
            if let Err(e) = copy_recursive(src, target) {
                let _ = remove_any(target);
                return Err(e);
            }
            remove_any(src)
        }
        Err(e) => Err(e),
    }
}

fn copy_recursive(src: &Path, target: &Path) -> io::Result<()> {
    if fs::symlink_metadata(src)?.is_dir() {
        fs::create_dir(target)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &target.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(src, target).map(|_| ())
    }
}

fn remove_any(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(m) if m.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn apply_permissions(config: &ArchiveConfig, target: &Path) -> Result<(), String> {
    let access = &config.policy.access;
    let gid = match access.group.as_deref() {
        Some(group) => Some(unix::group_id(group).ok_or_else(|| format!("unknown group {group:?}"))?),
        None => None,
    };
    set_modes(target, access.file_mode(), gid).map_err(|e| e.to_string())
}

fn set_modes(path: &Path, file_mode: u32, gid: Option<u32>) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    if let Some(gid) = gid {
        std::os::unix::fs::chown(path, None, Some(gid))?;
    }
    if meta.is_dir() {
        fs::set_permissions(path, fs::Permissions::from_mode(directory_mode(file_mode)))?;
        for entry in fs::read_dir(path)? {
            set_modes(&entry?.path(), file_mode, gid)?;
        }
    } else {
        fs::set_permissions(path, fs::Permissions::from_mode(file_mode))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{create_archive, ArchiveOptions};
    use proptest::prelude::*;

    fn archive(tmp: &Path) -> ArchiveConfig {
        let mut cfg = create_archive(
            &tmp.join("archive"),
            "https://registry.test/neurobank/",
            &ArchiveOptions::default(),
        )
        .unwrap();
        // The test user may not belong to the recorded group on every host.
        cfg.policy.access.group = None;
        cfg
    }

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    #[test]
    fn shard_is_id_prefix() {
        assert_eq!(shard_key("st11_1", 2), "st");
        assert_eq!(shard_key("a", 2), "a");
        assert_eq!(shard_key("abcdef", 3), "abc");
    }

    #[test]
    fn resource_path_layout() {
        assert_eq!(
            resource_path(Path::new("/home/data/archive"), "dummy_1", 2),
            PathBuf::from("/home/data/archive/resources/du/dummy_1")
        );
    }

    #[test]
    fn resolve_missing_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = archive(tmp.path());
        assert_eq!(resolve(&cfg.path, "nothing", 2), None);
    }

    #[test]
    fn store_then_resolve_finds_stored_path() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = archive(tmp.path());
        let src = tmp.path().join("dummy_1.wav");
        fs::write(&src, b"sound").unwrap();

        let stored = store(&cfg, &src, &id("dummy_1")).unwrap();
        assert_eq!(stored, cfg.path.join("resources/du/dummy_1.wav"));
        assert!(!src.exists());
        assert_eq!(resolve(&cfg.path, "dummy_1", 2), Some(stored.clone()));
        assert_eq!(fs::read(&stored).unwrap(), b"sound");
    }

    #[test]
    fn store_without_keep_extensions_uses_bare_id() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = archive(tmp.path());
        cfg.policy.keep_extensions = false;
        let src = tmp.path().join("dummy_2.tar.gz");
        fs::write(&src, b"x").unwrap();

        let stored = store(&cfg, &src, &id("dummy_2")).unwrap();
        assert_eq!(stored, cfg.path.join("resources/du/dummy_2"));
    }

    #[test]
    fn store_conflict_leaves_both_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = archive(tmp.path());
        let first = tmp.path().join("dup.txt");
        fs::write(&first, b"first").unwrap();
        let stored = store(&cfg, &first, &id("dup")).unwrap();

        let second = tmp.path().join("dup.dat");
        fs::write(&second, b"second").unwrap();
        let err = store(&cfg, &second, &id("dup")).unwrap_err();
        match err {
            ArchiveError::Conflict { id, existing } => {
                assert_eq!(id, "dup");
                assert_eq!(existing, stored);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(fs::read(&stored).unwrap(), b"first");
        assert_eq!(fs::read(&second).unwrap(), b"second");
    }

    #[test]
    fn store_directory_rejected_by_policy() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = archive(tmp.path());
        let dir = tmp.path().join("session");
        fs::create_dir(&dir).unwrap();
        let err = store(&cfg, &dir, &id("session")).unwrap_err();
        assert!(matches!(err, ArchiveError::PolicyViolation(_)));
        assert!(dir.is_dir());
    }

    #[test]
    fn store_directory_applies_modes_recursively() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = archive(tmp.path());
        cfg.policy.allow_directories = true;
        cfg.policy.access.umask = 0o027;
        let dir = tmp.path().join("session");
        fs::create_dir_all(dir.join("inner")).unwrap();
        fs::write(dir.join("inner/a.txt"), b"a").unwrap();

        let stored = store(&cfg, &dir, &id("session")).unwrap();
        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&stored), 0o750);
        assert_eq!(mode(&stored.join("inner")), 0o750);
        assert_eq!(mode(&stored.join("inner/a.txt")), 0o640);
    }

    #[test]
    fn stored_file_gets_file_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = archive(tmp.path());
        let src = tmp.path().join("m.bin");
        fs::write(&src, b"m").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o600)).unwrap();
        let stored = store(&cfg, &src, &id("m")).unwrap();
        assert_eq!(fs::metadata(stored).unwrap().permissions().mode() & 0o777, 0o664);
    }

    #[test]
    fn unknown_group_reports_permissions_not_applied() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = archive(tmp.path());
        cfg.policy.access.group = Some("no-such-group-nbank-test".into());
        let src = tmp.path().join("g.txt");
        fs::write(&src, b"g").unwrap();
        let err = store(&cfg, &src, &id("g")).unwrap_err();
        match err {
            ArchiveError::PermissionsNotApplied { path, .. } => assert!(path.exists()),
            other => panic!("expected permissions error, got {other:?}"),
        }
    }

    #[test]
    fn resolve_prefers_exact_then_files() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = archive(tmp.path());
        let shard = cfg.path.join("resources/ab");
        fs::create_dir_all(shard.join("abc.d")).unwrap();
        fs::write(shard.join("abc.z"), b"").unwrap();
        fs::write(shard.join("abcd.txt"), b"").unwrap();
        assert_eq!(resolve(&cfg.path, "abc", 2), Some(shard.join("abc.z")));

        fs::write(shard.join("abc"), b"").unwrap();
        assert_eq!(resolve(&cfg.path, "abc", 2), Some(shard.join("abc")));
    }

    #[test]
    fn iter_resources_lists_sorted_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = archive(tmp.path());
        for name in ["zz_1.txt", "aa_2", "ab_3.wav"] {
            let src = tmp.path().join(name);
            fs::write(&src, b"").unwrap();
            store(&cfg, &src, &ResourceId::from_path(&src).unwrap()).unwrap();
        }
        let all = iter_resources(&cfg.path).unwrap();
        let names: Vec<_> = all
            .iter()
            .map(|p| p.strip_prefix(&cfg.path).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["resources/aa/aa_2", "resources/ab/ab_3.wav", "resources/zz/zz_1.txt"]
        );
    }

    #[test]
    fn check_writable_fails_without_resources_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = archive(tmp.path());
        check_writable(&cfg).unwrap();
        fs::remove_dir(cfg.resources_dir()).unwrap();
        assert!(matches!(check_writable(&cfg), Err(ArchiveError::NotWritable(_))));
    }

    #[test]
    fn full_extension_examples() {
        assert_eq!(full_extension(Path::new("/a/b.tar.gz")).as_deref(), Some(".tar.gz"));
        assert_eq!(full_extension(Path::new("b")), None);
        assert_eq!(full_extension(Path::new(".hidden")), None);
    }

    proptest! {
        #[test]
        fn shard_is_prefix_of_id(s in "[-_~0-9a-zA-Z]{1,20}", len in 1usize..6) {
            let shard = shard_key(&s, len);
            prop_assert!(s.starts_with(shard));
            prop_assert_eq!(shard.len(), len.min(s.len()));
        }
    }
}
