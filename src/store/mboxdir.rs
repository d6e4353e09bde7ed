//! Directory-of-mbox store in the Thunderbird layout.
//!
//! A file `X` holds the messages of folder `X`; a sibling directory `X.sbd`
//! holds its subfolders. Plain directories are folders without messages.
//! Index files (`*.msf`) and dotfiles are skipped, and entries are visited in
//! name order.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PackError, Result};
use crate::parser::mbox::is_mbox_separator;

use super::eml::file_stem;
use super::mbox::MboxFolder;
use super::{NativeElement, NativeFolder, StoreReader, StoreSource};

const SUBFOLDER_SUFFIX: &str = ".sbd";

/// Reader for a local mail directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct MboxDirReader;

impl StoreReader for MboxDirReader {
    fn open(&self, source: &StoreSource) -> Result<Box<dyn NativeFolder>> {
        let path = source
            .path
            .as_ref()
            .ok_or_else(|| PackError::access(source.describe(), "mail directories need a path"))?;
        if !path.is_dir() {
            return Err(PackError::access(path.display(), "not a directory"));
        }
        Ok(Box::new(DirFolder::new(file_stem(path), None, Some(path.clone()))?))
    }
}

/// One folder: an optional mbox file plus an optional directory of subfolders.
pub struct DirFolder {
    name: String,
    mbox: Option<MboxFolder>,
    children: Vec<ChildSpec>,
}

#[derive(Debug, Default)]
struct ChildSpec {
    mbox: Option<PathBuf>,
    dir: Option<PathBuf>,
}

impl DirFolder {
    fn new(name: String, mbox: Option<PathBuf>, dir: Option<PathBuf>) -> Result<Self> {
        let mbox = match mbox {
            Some(path) => Some(MboxFolder::open(path)?.with_name(name.clone())),
            None => None,
        };
        let children = match dir {
            Some(dir) => scan_children(&dir)?,
            None => Vec::new(),
        };
        Ok(Self {
            name,
            mbox,
            children,
        })
    }
}

/// Group the entries of `dir` into folders, keyed and ordered by name.
fn scan_children(dir: &Path) -> Result<Vec<ChildSpec>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PackError::access(dir.display(), e))?;
    let mut folders: BTreeMap<String, ChildSpec> = BTreeMap::new();

    for entry in entries {
        let entry = entry.map_err(|e| PackError::access(dir.display(), e))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.starts_with('.') || file_name.ends_with(".msf") {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            let name = file_name
                .strip_suffix(SUBFOLDER_SUFFIX)
                .unwrap_or(&file_name)
                .to_string();
            folders.entry(name).or_default().dir = Some(path);
        } else if path.is_file() && is_mbox_file(&path) {
            let name = file_name
                .strip_suffix(".mbox")
                .or_else(|| file_name.strip_suffix(".mbx"))
                .unwrap_or(&file_name)
                .to_string();
            folders.entry(name).or_default().mbox = Some(path);
        } else {
            debug!(path = %path.display(), "Skipping non-mbox entry");
        }
    }

    Ok(folders.into_values().collect())
}

/// Empty files without extension (fresh Thunderbird folders) or files starting
/// with a `From ` line.
fn is_mbox_file(path: &Path) -> bool {
    let mut head = [0u8; 5];
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    match file.read(&mut head) {
        Ok(0) => path.extension().is_none(),
        Ok(n) => is_mbox_separator(&head[..n]),
        Err(_) => false,
    }
}

impl NativeFolder for DirFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_elements(&self) -> bool {
        self.mbox.as_ref().is_some_and(|m| m.has_elements())
    }

    fn has_subfolders(&self) -> bool {
        !self.children.is_empty()
    }

    fn for_each_subfolder(
        &mut self,
        visit: &mut dyn FnMut(Result<&mut dyn NativeFolder>) -> Result<()>,
    ) -> Result<()> {
        for spec in &self.children {
            let name = spec
                .mbox
                .as_deref()
                .or(spec.dir.as_deref())
                .map(child_name)
                .unwrap_or_default();
            match DirFolder::new(name, spec.mbox.clone(), spec.dir.clone()) {
                Ok(mut child) => visit(Ok(&mut child))?,
                Err(e) => visit(Err(e))?,
            }
        }
        Ok(())
    }

    fn for_each_element(
        &mut self,
        visit: &mut dyn FnMut(&dyn NativeElement) -> Result<()>,
    ) -> Result<()> {
        match &mut self.mbox {
            Some(mbox) => mbox.for_each_element(visit),
            None => Ok(()),
        }
    }
}

fn child_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for suffix in [SUBFOLDER_SUFFIX, ".mbox", ".mbx"] {
        if let Some(stem) = file_name.strip_suffix(suffix) {
            return stem.to_string();
        }
    }
    file_name
}
