use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::types::*;

const SINGLE_FILE_EXTENSION: &str = "txt";
const SINGLE_FILE_MONTAGE: char = 'a';
const SINGLE_FILE_BLOCK: &str = "001";

// `<anything><montage letter>.<block number>`
fn block_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\w)\.(\d+)$").expect("block file pattern is valid"))
}

/// Lists the files that make up a recording, sorted by path.
///
/// In single-file mode `path` is either the `.txt` file itself or a folder
/// holding exactly one `.txt` file. In multi-file mode every file in the
/// folder named `<prefix><montage>.<block>` is returned.
///
/// # Errors
///
/// Returns [`BoxyError::Configuration`] when single-file mode finds zero or
/// several `.txt` files, or multi-file mode finds no block files.
pub fn discover_files<P: AsRef<Path>>(path: P, multi_file: bool) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();

    if !multi_file && path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let entries = fs::read_dir(path).map_err(|e| BoxyError::io(path, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| BoxyError::io(path, e))?;
        let file_path = entry.path();
        if !file_path.is_file() {
            continue;
        }
        let keep = if multi_file {
            block_parts(&file_path).is_some()
        } else {
            file_path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(SINGLE_FILE_EXTENSION))
                .unwrap_or(false)
        };
        if keep {
            files.push(file_path);
        }
    }
    files.sort();

    if multi_file {
        if files.is_empty() {
            return Err(BoxyError::Configuration(format!(
                "Expect files named <prefix><montage>.<block> in {}, found none",
                path.display()
            )));
        }
    } else if files.len() != 1 {
        return Err(BoxyError::Configuration(format!(
            "Expect one *.txt file in {}, got {}",
            path.display(),
            files.len()
        )));
    }

    log::debug!("Found {} BOXY file(s) in {}", files.len(), path.display());
    Ok(files)
}

/// Groups sorted block files into montages.
///
/// Montages appear in order of their first file; blocks keep file order.
/// Files whose names do not match the block pattern are skipped.
pub fn group_montages(files: &[PathBuf]) -> Vec<Montage> {
    let mut montages: Vec<Montage> = Vec::new();
    for file in files {
        let Some((name, block)) = block_parts(file) else {
            continue;
        };
        let block = Block {
            name: block,
            path: file.clone(),
        };
        match montages.iter_mut().find(|m| m.name == name) {
            Some(montage) => montage.blocks.push(block),
            None => montages.push(Montage {
                name,
                blocks: vec![block],
            }),
        }
    }
    montages
}

/// The montage layout of a single-file recording.
pub fn single_montage(file: &Path) -> Vec<Montage> {
    vec![Montage {
        name: SINGLE_FILE_MONTAGE,
        blocks: vec![Block {
            name: SINGLE_FILE_BLOCK.to_string(),
            path: file.to_path_buf(),
        }],
    }]
}

// Montage letter and block number from a file name
fn block_parts(path: &Path) -> Option<(char, String)> {
    let name = path.file_name()?.to_str()?;
    let caps = block_file_pattern().captures(name)?;
    let montage = caps.get(1)?.as_str().chars().next()?;
    Some((montage, caps.get(2)?.as_str().to_string()))
}
