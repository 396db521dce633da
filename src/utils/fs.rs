use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use anyhow::{Result, Context};

pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent()
        .ok_or_else(|| anyhow::anyhow!("Invalid path: no parent directory"))?;
    
    if !parent.exists() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
    }
    
    let tmp_path = path.with_extension("tmp");
    
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", tmp_path))?;
    
    file.write_all(content)
        .with_context(|| format!("Failed to write to temp file: {:?}", tmp_path))?;
    
    file.sync_all()
        .with_context(|| format!("Failed to sync temp file: {:?}", tmp_path))?;
    
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", tmp_path, path))?;
    
    Ok(())
}

/// Trimmed, non-empty lines of a text file.
pub fn read_lines<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Like `read_lines` but a missing or unreadable file counts as empty.
pub fn read_lines_lossy<P: AsRef<Path>>(path: P) -> Vec<String> {
    read_lines(path).unwrap_or_default()
}

/// Writes the set sorted, one entry per line.
pub fn write_sorted_lines<P: AsRef<Path>>(path: P, lines: &BTreeSet<String>) -> Result<()> {
    let mut content = String::new();
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    atomic_write(path, content.as_bytes())
}

pub fn has_content<P: AsRef<Path>>(path: P) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}
