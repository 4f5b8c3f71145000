// src/graph/paths.rs

//! Identity tables for installed directories and files

use super::PackageId;
use crate::arena::{Arena, Id};
use std::collections::HashMap;

pub type DirId = Id<Dir>;
pub type FileId = Id<File>;

/// An installed directory, shared by every package owning files below it
#[derive(Debug)]
pub struct Dir {
    pub name: String,
    /// Number of packages currently owning entries in this directory
    pub refs: u32,
}

/// An installed file
#[derive(Debug)]
pub struct File {
    pub dir: DirId,
    pub name: String,
    pub owner: Option<PackageId>,
}

/// Split `path` into its directory and file name, dropping a leading `/`
pub fn split_path(path: &str) -> (&str, &str) {
    let path = path.strip_prefix('/').unwrap_or(path);
    match path.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", path),
    }
}

/// Hash-indexed directories and files keyed by their path bytes
#[derive(Default)]
pub struct PathTable {
    dirs: Arena<Dir>,
    dir_index: HashMap<String, DirId>,
    files: Arena<File>,
    file_index: HashMap<(DirId, String), FileId>,
}

impl PathTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical directory record, created on first use
    pub fn get_dir(&mut self, name: &str) -> DirId {
        if let Some(id) = self.dir_index.get(name) {
            return *id;
        }
        let id = self.dirs.alloc(Dir {
            name: name.to_string(),
            refs: 0,
        });
        self.dir_index.insert(name.to_string(), id);
        id
    }

    /// Canonical file record for `path`, created on first use
    pub fn get_file(&mut self, path: &str) -> FileId {
        let (dir, name) = split_path(path);
        let dir = self.get_dir(dir);
        let key = (dir, name.to_string());
        if let Some(id) = self.file_index.get(&key) {
            return *id;
        }
        let id = self.files.alloc(File {
            dir,
            name: name.to_string(),
            owner: None,
        });
        self.file_index.insert(key, id);
        id
    }

    /// Find a file without creating it
    pub fn lookup_file(&self, path: &str) -> Option<FileId> {
        let (dir, name) = split_path(path);
        let dir = self.dir_index.get(dir)?;
        self.file_index.get(&(*dir, name.to_string())).copied()
    }

    pub fn dir(&self, id: DirId) -> &Dir {
        &self.dirs[id]
    }

    pub fn dir_mut(&mut self, id: DirId) -> &mut Dir {
        &mut self.dirs[id]
    }

    pub fn file(&self, id: FileId) -> &File {
        &self.files[id]
    }

    pub fn file_mut(&mut self, id: FileId) -> &mut File {
        &mut self.files[id]
    }

    /// Full path of a file record
    pub fn file_path(&self, id: FileId) -> String {
        let file = &self.files[id];
        let dir = &self.dirs[file.dir];
        if dir.name.is_empty() {
            file.name.clone()
        } else {
            format!("{}/{}", dir.name, file.name)
        }
    }
}
