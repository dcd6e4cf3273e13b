use anyhow::{Context, Result};
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Bundle every caption file in a job workspace into a single ZIP.
///
/// Entries are named by their source shortcode (the on-disk file name).
/// Returns `None` when the workspace holds no caption files, so callers
/// can report "no transcripts available" instead of shipping an empty
/// archive.
pub fn pack_workspace(workspace: &Path) -> Result<Option<Vec<u8>>> {
    if !workspace.is_dir() {
        return Ok(None);
    }

    let mut files: Vec<_> = fs_err::read_dir(workspace)
        .context("Failed to read job workspace")?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("srt"))
        .collect();
    files.sort();

    if files.is_empty() {
        return Ok(None);
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("Caption file has a non-UTF8 name")?;
        let content = fs_err::read(path).context("Failed to read caption file")?;

        writer
            .start_file(name, options)
            .context("Failed to add archive entry")?;
        writer
            .write_all(&content)
            .context("Failed to write archive entry")?;
    }

    let cursor = writer.finish().context("Failed to finalize archive")?;
    Ok(Some(cursor.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn test_empty_workspace_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(pack_workspace(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_missing_workspace_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(pack_workspace(&dir.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn test_non_caption_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("notes.txt"), "scratch").unwrap();
        assert!(pack_workspace(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_archive_contains_one_entry_per_caption_file() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(
            dir.path().join("abc123.srt"),
            "1\n00:00:00,000 --> 00:00:01,000\nhello\n\n",
        )
        .unwrap();
        fs_err::write(
            dir.path().join("def456.srt"),
            "1\n00:00:00,000 --> 00:00:01,000\nworld\n\n",
        )
        .unwrap();

        let bytes = pack_workspace(dir.path()).unwrap().unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        assert_eq!(archive.len(), 2);
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["abc123.srt", "def456.srt"]);

        let mut content = String::new();
        archive
            .by_name("abc123.srt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert!(content.contains("hello"));
    }
}
