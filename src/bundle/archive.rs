//! Bundle archive codec
//!
//! Archives are gzip tarballs with exactly one top-level directory. The name of that
//! directory is arbitrary and is stripped when unpacking, so `xyz123/SKILL.md` lands at
//! `{dest}/SKILL.md`.

use eyre::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, EntryType, HeaderMode};
use walkdir::{DirEntry, WalkDir};

use super::manifest::MANIFEST_FILE;

/// Names never packed into a bundle
const EXCLUDED: &[&str] = &[".git", "__pycache__", "node_modules", ".DS_Store"];

/// What an archive holds, read without unpacking it
#[derive(Debug, Clone)]
pub struct ArchiveContents {
    /// The single top-level directory name
    pub root: String,
    /// Entries relative to the root, in archive order
    pub payload: Vec<PathBuf>,
    /// Raw SKILL.md from the payload root, if present
    pub manifest: Option<String>,
}

fn open(archive: &Path) -> Result<Archive<GzDecoder<File>>> {
    let file = File::open(archive).with_context(|| format!("Failed to open archive: {}", archive.display()))?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// Split an entry path into its top-level directory and the remainder.
///
/// Rejects absolute paths and `..` anywhere in the path.
fn split_root(path: &Path) -> Result<(String, PathBuf)> {
    let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));

    let root = match components.next() {
        Some(Component::Normal(root)) => root.to_string_lossy().to_string(),
        _ => eyre::bail!("Unsafe archive entry path: {}", path.display()),
    };

    let mut rest = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => rest.push(part),
            _ => eyre::bail!("Unsafe archive entry path: {}", path.display()),
        }
    }

    Ok((root, rest))
}

fn check_single_root(expected: &mut Option<String>, root: String) -> Result<()> {
    match expected {
        Some(existing) if *existing != root => {
            eyre::bail!(
                "Archive must have a single top-level directory, found '{}' and '{}'",
                existing,
                root
            )
        }
        Some(_) => Ok(()),
        None => {
            *expected = Some(root);
            Ok(())
        }
    }
}

fn is_metadata_entry(entry_type: EntryType) -> bool {
    matches!(
        entry_type,
        EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName | EntryType::GNULongLink
    )
}

/// List an archive's payload and read its manifest
pub fn inspect(archive: &Path) -> Result<ArchiveContents> {
    let mut tar = open(archive)?;
    let mut root = None;
    let mut payload = Vec::new();
    let mut manifest = None;

    for entry in tar.entries().context("Failed to read archive entries")? {
        let mut entry = entry.context("Corrupt archive entry")?;
        let entry_type = entry.header().entry_type();
        if is_metadata_entry(entry_type) {
            continue;
        }

        let path = entry.path().context("Invalid entry path")?.into_owned();
        let (entry_root, rest) = split_root(&path)?;
        check_single_root(&mut root, entry_root)?;

        if rest.as_os_str().is_empty() {
            continue;
        }

        if rest == Path::new(MANIFEST_FILE) && entry_type.is_file() {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .with_context(|| format!("Failed to read {} from archive", MANIFEST_FILE))?;
            manifest = Some(content);
        }

        payload.push(rest);
    }

    let root = root.ok_or_else(|| eyre::eyre!("Archive is empty: {}", archive.display()))?;

    Ok(ArchiveContents {
        root,
        payload,
        manifest,
    })
}

/// Unpack an archive into `dest`, dropping its top-level directory.
///
/// Returns the number of files written. Links are skipped.
pub fn unpack_stripped(archive: &Path, dest: &Path) -> Result<usize> {
    let mut tar = open(archive)?;
    let mut root = None;
    let mut files = 0;

    fs::create_dir_all(dest).with_context(|| format!("Failed to create {}", dest.display()))?;

    for entry in tar.entries().context("Failed to read archive entries")? {
        let mut entry = entry.context("Corrupt archive entry")?;
        let entry_type = entry.header().entry_type();
        if is_metadata_entry(entry_type) {
            continue;
        }

        let path = entry.path().context("Invalid entry path")?.into_owned();
        let (entry_root, rest) = split_root(&path)?;
        check_single_root(&mut root, entry_root)?;

        if rest.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(&rest);
        match entry_type {
            EntryType::Directory => {
                fs::create_dir_all(&target).with_context(|| format!("Failed to create {}", target.display()))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                entry
                    .unpack(&target)
                    .with_context(|| format!("Failed to write {}", target.display()))?;
                files += 1;
            }
            EntryType::Symlink | EntryType::Link => {
                log::warn!("Skipping link entry in {}: {}", archive.display(), path.display());
            }
            other => {
                log::debug!("Skipping {:?} entry: {}", other, path.display());
            }
        }
    }

    if root.is_none() {
        eyre::bail!("Archive is empty: {}", archive.display());
    }

    Ok(files)
}

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    EXCLUDED.contains(&name.as_ref()) || name.ends_with(".pyc")
}

/// Pack `src_dir` into a gzip tarball at `out_file` with top-level directory `root`.
///
/// The archive is written to a temp file next to `out_file` and renamed into place.
/// Returns the number of files packed.
pub fn pack(src_dir: &Path, root: &str, out_file: &Path) -> Result<usize> {
    let out_dir = out_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(out_dir).with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let temp = tempfile::NamedTempFile::new_in(out_dir).context("Failed to create temp archive")?;
    let file = temp.as_file().try_clone().context("Failed to open temp archive")?;

    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    builder.mode(HeaderMode::Deterministic);
    builder
        .append_dir(root, src_dir)
        .with_context(|| format!("Failed to add {}", src_dir.display()))?;

    let mut files = 0;
    let walker = WalkDir::new(src_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e));

    for entry in walker {
        let entry = entry.context("Failed to walk bundle directory")?;
        let rel = entry.path().strip_prefix(src_dir).context("Entry outside bundle directory")?;
        let name_in_archive = Path::new(root).join(rel);

        if entry.file_type().is_dir() {
            builder
                .append_dir(&name_in_archive, entry.path())
                .with_context(|| format!("Failed to add {}", entry.path().display()))?;
        } else if entry.file_type().is_file() {
            builder
                .append_path_with_name(entry.path(), &name_in_archive)
                .with_context(|| format!("Failed to add {}", entry.path().display()))?;
            files += 1;
        } else {
            log::warn!("Not packing non-regular file: {}", entry.path().display());
        }
    }

    let encoder = builder.into_inner().context("Failed to finish tar stream")?;
    encoder.finish().context("Failed to finish gzip stream")?;

    temp.persist(out_file)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write {}", out_file.display()))?;

    Ok(files)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Build a tar.gz from (path, contents) pairs; `None` contents means a directory
    pub(crate) fn write_archive(path: &Path, entries: &[(&str, Option<&str>)]) {
        let file = File::create(path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            match contents {
                Some(body) => {
                    header.set_entry_type(EntryType::Regular);
                    header.set_size(body.len() as u64);
                    header.set_mode(0o644);
                    header.set_cksum();
                    builder.append_data(&mut header, name, body.as_bytes()).unwrap();
                }
                None => {
                    header.set_entry_type(EntryType::Directory);
                    header.set_size(0);
                    header.set_mode(0o755);
                    header.set_cksum();
                    builder.append_data(&mut header, name, std::io::empty()).unwrap();
                }
            }
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    const SKILL: &str = "---\nname: alpha\n---\n# Alpha\n";

    #[test]
    fn test_split_root() {
        let (root, rest) = split_root(Path::new("./xyz123/scripts/run.py")).unwrap();
        assert_eq!(root, "xyz123");
        assert_eq!(rest, PathBuf::from("scripts/run.py"));

        assert!(split_root(Path::new("/etc/passwd")).is_err());
        assert!(split_root(Path::new("root/../../escape")).is_err());
    }

    #[test]
    fn test_inspect_reads_manifest_and_payload() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("alpha-v1.0.0.tar.gz");
        write_archive(
            &archive,
            &[
                ("xyz123/", None),
                ("xyz123/SKILL.md", Some(SKILL)),
                ("xyz123/scripts/run.py", Some("print('hi')\n")),
            ],
        );

        let contents = inspect(&archive).unwrap();
        assert_eq!(contents.root, "xyz123");
        assert_eq!(contents.manifest.as_deref(), Some(SKILL));
        assert_eq!(
            contents.payload,
            vec![PathBuf::from("SKILL.md"), PathBuf::from("scripts/run.py")]
        );
    }

    #[test]
    fn test_inspect_rejects_multiple_roots() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bad.tar.gz");
        write_archive(&archive, &[("one/SKILL.md", Some(SKILL)), ("two/extra.txt", Some("x"))]);

        let err = inspect(&archive).unwrap_err();
        assert!(err.to_string().contains("single top-level directory"));
    }

    #[test]
    fn test_unpack_strips_root() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("alpha.tar.gz");
        write_archive(
            &archive,
            &[
                ("xyz123/SKILL.md", Some(SKILL)),
                ("xyz123/scripts/run.py", Some("print('hi')\n")),
            ],
        );

        let dest = temp.path().join("out");
        let files = unpack_stripped(&archive, &dest).unwrap();

        assert_eq!(files, 2);
        assert_eq!(fs::read_to_string(dest.join("SKILL.md")).unwrap(), SKILL);
        assert!(dest.join("scripts/run.py").is_file());
        assert!(!dest.join("xyz123").exists());
    }

    #[test]
    fn test_unpack_garbage_fails() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("garbage.tar.gz");
        fs::write(&archive, b"this is not gzip").unwrap();

        assert!(unpack_stripped(&archive, &temp.path().join("out")).is_err());
    }

    #[test]
    fn test_pack_then_inspect() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("my-skill-src");
        fs::create_dir_all(src.join("scripts")).unwrap();
        fs::create_dir_all(src.join("__pycache__")).unwrap();
        fs::write(src.join("SKILL.md"), SKILL).unwrap();
        fs::write(src.join("scripts/run.py"), "print('hi')\n").unwrap();
        fs::write(src.join("scripts/run.pyc"), "bytecode").unwrap();
        fs::write(src.join("__pycache__/cached.pyc"), "bytecode").unwrap();

        let out = temp.path().join("dist/alpha-v1.0.0.tar.gz");
        let files = pack(&src, "alpha", &out).unwrap();
        assert_eq!(files, 2);

        let contents = inspect(&out).unwrap();
        assert_eq!(contents.root, "alpha");
        assert!(contents.payload.contains(&PathBuf::from("scripts/run.py")));
        assert!(!contents.payload.iter().any(|p| p.to_string_lossy().contains("pycache")));
        assert!(!contents.payload.contains(&PathBuf::from("scripts/run.pyc")));
    }
}
