/*!
 * Client-side copy of the SD card listing
 *
 * [`SdTreeStore`] owns the one [`Listing`] known to the client and keeps it
 * consistent with the card through small local mutations, so a confirmed
 * delete, mkdir or write never needs a full re-fetch.
 *
 * Mutations are not guarded against each other. Each one is applied from the
 * success path of the matching backend call, and callers must not issue a
 * second mutation on the same file or folder before the first response has
 * been observed.
 */

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::error::{MasterSdError, Result};
use crate::transport::RawListing;
use crate::types::{Crumb, FileRecord, FolderEntry, FolderView, Listing, Space, ROOT};
use crate::utils::{base_name, is_within, parent_path, split_file_path};
use crate::{bail, ensure, error};

/// Owner of the current SD card listing
#[derive(Debug, Clone)]
pub struct SdTreeStore {
    listing: Option<Listing>,
    active_folder: String,
}

impl Default for SdTreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SdTreeStore {
    /// Create a store with no card known
    pub fn new() -> Self {
        Self {
            listing: None,
            active_folder: ROOT.to_string(),
        }
    }

    /// Current listing, if one is loaded
    pub fn listing(&self) -> Option<&Listing> {
        self.listing.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.listing.is_some()
    }

    /// Forget the listing, e.g. when control is released or the link drops
    pub fn clear(&mut self) {
        if self.listing.take().is_some() {
            debug!("SD card listing discarded");
        }
        self.active_folder = ROOT.to_string();
    }

    /// Folder currently being browsed
    pub fn active_folder(&self) -> &str {
        &self.active_folder
    }

    /// Browse into another folder
    pub fn enter(&mut self, path: &str) -> Result<()> {
        self.folder_index(path)?;
        self.active_folder = path.to_string();
        Ok(())
    }

    /// Replace the listing with a fresh snapshot from the device
    ///
    /// A snapshot with a file pointing outside `folders` or with a repeated
    /// folder is rejected as a whole, and the previous listing is discarded
    /// rather than kept around stale.
    pub fn replace_listing(&mut self, raw: RawListing) -> Result<&Listing> {
        let listing = match Self::validate(raw) {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Rejecting SD card snapshot: {}", e);
                self.clear();
                return Err(e);
            }
        };

        info!(
            folders = listing.folders.len(),
            files = listing.files.len(),
            free = listing.free_bytes,
            used = listing.used_bytes,
            "SD card listing loaded"
        );

        self.active_folder = ROOT.to_string();
        Ok(self.listing.insert(listing))
    }

    fn validate(raw: RawListing) -> Result<Listing> {
        let mut seen = HashSet::with_capacity(raw.folders.len());
        for folder in &raw.folders {
            ensure!(
                seen.insert(folder.as_str()),
                MalformedListing,
                "folder {} listed twice",
                folder
            );
        }

        let folder_count = raw.folders.len();
        let files = raw
            .files
            .into_iter()
            .map(|file| -> Result<FileRecord> {
                let folder_index = usize::try_from(file.folder)
                    .ok()
                    .filter(|index| *index < folder_count)
                    .ok_or_else(|| {
                        error!(
                            MalformedListing,
                            "file {} references folder {} of {}",
                            file.name,
                            file.folder,
                            folder_count
                        )
                    })?;
                Ok(FileRecord {
                    name: file.name,
                    size: file.size,
                    folder_index,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut folders = raw.folders;
        // Appending keeps every index the files already point at
        if !folders.iter().any(|folder| folder == ROOT) {
            folders.push(ROOT.to_string());
        }

        Ok(Listing {
            folders,
            files,
            free_bytes: raw.free_size,
            used_bytes: raw.taken_size,
        })
    }

    fn folder_index(&self, path: &str) -> Result<usize> {
        self.listing
            .as_ref()
            .and_then(|listing| listing.folder_index(path))
            .ok_or_else(|| error!(FolderNotFound, "{}", path))
    }

    /// Look up a file by its absolute path
    pub fn file(&self, path: &str) -> Result<&FileRecord> {
        let (folder, name) =
            split_file_path(path).ok_or_else(|| error!(FileNotFound, "{}", path))?;
        let folder_index = self.folder_index(folder)?;
        self.listing
            .as_ref()
            .and_then(|listing| {
                listing
                    .file_position(folder_index, name)
                    .map(|position| &listing.files[position])
            })
            .ok_or_else(|| error!(FileNotFound, "{}", path))
    }

    /// Immediate sub-folders and files of `path`
    pub fn children_of(&self, path: &str) -> Result<FolderView> {
        let index = self.folder_index(path)?;
        let Some(listing) = self.listing.as_ref() else {
            bail!(FolderNotFound, "{}", path);
        };

        let folders = listing
            .folders
            .iter()
            .enumerate()
            .filter(|(_, folder)| parent_path(folder) == Some(path))
            .map(|(index, folder)| FolderEntry {
                index,
                name: base_name(folder).to_string(),
                path: folder.clone(),
            })
            .collect();

        let files = listing
            .files
            .iter()
            .filter(|file| file.folder_index == index)
            .cloned()
            .collect();

        Ok(FolderView {
            path: path.to_string(),
            folders,
            files,
        })
    }

    /// Contents of the active folder
    pub fn active_view(&self) -> Result<FolderView> {
        self.children_of(&self.active_folder)
    }

    /// Remove one file and credit its size back to free space
    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        let (folder, name) =
            split_file_path(path).ok_or_else(|| error!(FileNotFound, "{}", path))?;
        let folder_index = self.folder_index(folder)?;
        let Some(listing) = self.listing.as_mut() else {
            bail!(FolderNotFound, "{}", folder);
        };
        let position = listing
            .file_position(folder_index, name)
            .ok_or_else(|| error!(FileNotFound, "{}", path))?;

        let size = listing.files[position].size;
        let Some(space) = adjust_space(listing.space(), size, 0) else {
            return Err(self.desync(format!("deleting {} ({} bytes)", path, size)));
        };

        listing.files.remove(position);
        set_space(listing, space);
        debug!(path, size, "File removed from listing");
        Ok(())
    }

    /// Remove a folder, every folder below it and all of their files
    ///
    /// Folders are matched by path prefix. Files in surviving folders are
    /// renumbered so they keep pointing at the same path after the removed
    /// folders stop taking up positions.
    pub fn delete_folder(&mut self, path: &str) -> Result<()> {
        self.validate_folder_removal(path)?;
        let Some(listing) = self.listing.as_mut() else {
            bail!(FolderNotFound, "{}", path);
        };

        // Ascending, so partition_point below counts removed positions
        let removed: Vec<usize> = listing
            .folders
            .iter()
            .enumerate()
            .filter(|(_, folder)| is_within(folder, path))
            .map(|(index, _)| index)
            .collect();

        let reclaimed = listing
            .files
            .iter()
            .filter(|file| removed.binary_search(&file.folder_index).is_ok())
            .try_fold(0u64, |acc, file| acc.checked_add(file.size));
        let Some(space) = reclaimed.and_then(|bytes| adjust_space(listing.space(), bytes, 0))
        else {
            return Err(self.desync(format!("deleting folder {}", path)));
        };

        listing
            .files
            .retain(|file| removed.binary_search(&file.folder_index).is_err());
        for file in &mut listing.files {
            let shift = removed.partition_point(|&index| index < file.folder_index);
            file.folder_index -= shift;
        }

        let mut position = 0;
        listing.folders.retain(|_| {
            let keep = removed.binary_search(&position).is_err();
            position += 1;
            keep
        });
        set_space(listing, space);

        if is_within(&self.active_folder, path) {
            let parent = parent_path(path).unwrap_or(ROOT);
            self.active_folder = match listing.folder_index(parent) {
                Some(_) => parent.to_string(),
                None => ROOT.to_string(),
            };
        }

        debug!(path, folders = removed.len(), "Folder removed from listing");
        Ok(())
    }

    /// Whether `path` is a folder of the current listing
    pub fn has_folder(&self, path: &str) -> bool {
        self.folder_index(path).is_ok()
    }

    /// Check that `path` names a folder other than the root
    pub fn validate_folder_removal(&self, path: &str) -> Result<()> {
        self.folder_index(path)?;
        ensure!(path != ROOT, InvalidName, "the root folder cannot be deleted");
        Ok(())
    }

    /// Check that `name` can be created under `parent`, returning the new path
    pub fn validate_new_folder(&self, parent: &str, name: &str) -> Result<String> {
        self.folder_index(parent)?;
        ensure!(!name.is_empty(), InvalidName, "folder name is empty");
        ensure!(
            !name.contains('/'),
            InvalidName,
            "folder name {:?} contains a separator",
            name
        );

        let child = format!("{}/{}", parent, name);
        let view = self.children_of(parent)?;
        let taken = view.folders.iter().any(|folder| folder.name == name)
            || self
                .listing
                .as_ref()
                .is_some_and(|listing| listing.folder_index(&child).is_some());
        ensure!(!taken, InvalidName, "{} already exists", child);

        Ok(child)
    }

    /// Append a new empty folder under `parent`
    pub fn create_folder(&mut self, parent: &str, name: &str) -> Result<String> {
        let child = self.validate_new_folder(parent, name)?;
        let Some(listing) = self.listing.as_mut() else {
            bail!(FolderNotFound, "{}", parent);
        };

        listing.folders.push(child.clone());
        debug!(path = %child, index = listing.folders.len() - 1, "Folder added to listing");
        Ok(child)
    }

    /// Record a file the device has just written
    ///
    /// When the device ran the file right away it has released the card, so
    /// the listing is dropped instead. Writing over an existing name replaces
    /// that record.
    pub fn write_file(
        &mut self,
        folder: &str,
        name: &str,
        size: u64,
        autorun_triggered: bool,
    ) -> Result<()> {
        if autorun_triggered {
            info!(folder, name, "File started on the device, SD card released");
            self.clear();
            return Ok(());
        }

        let folder_index = self.folder_index(folder)?;
        let Some(listing) = self.listing.as_mut() else {
            bail!(FolderNotFound, "{}", folder);
        };

        let existing = listing.file_position(folder_index, name);
        let previous = existing.map_or(0, |position| listing.files[position].size);
        let Some(space) = adjust_space(listing.space(), previous, size) else {
            return Err(self.desync(format!("writing {}/{} ({} bytes)", folder, name, size)));
        };

        match existing {
            Some(position) => listing.files[position].size = size,
            None => listing.files.push(FileRecord {
                name: name.to_string(),
                size,
                folder_index,
            }),
        }
        set_space(listing, space);
        debug!(folder, name, size, "File added to listing");
        Ok(())
    }

    /// Free and used space, zero when nothing is loaded
    pub fn current_space(&self) -> Space {
        self.listing
            .as_ref()
            .map(Listing::space)
            .unwrap_or_default()
    }

    /// Root-first trail of folders leading to `path`
    pub fn breadcrumb(&self, path: &str) -> Vec<Crumb> {
        if self.listing.is_none() || !is_within(path, ROOT) {
            return Vec::new();
        }

        let mut current = ROOT.to_string();
        let mut crumbs = vec![Crumb {
            name: base_name(ROOT).to_string(),
            path: current.clone(),
        }];

        for segment in path[ROOT.len()..].split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            crumbs.push(Crumb {
                name: segment.to_string(),
                path: current.clone(),
            });
        }

        crumbs
    }

    /// Drop a listing whose counters no longer match the device
    fn desync(&mut self, context: String) -> MasterSdError {
        warn!("Space counters would go negative while {}, discarding listing", context);
        self.clear();
        MasterSdError::SpaceDesync(context)
    }
}

/// Move `freed` bytes to free space and `taken` bytes to used space
fn adjust_space(space: Space, freed: u64, taken: u64) -> Option<Space> {
    Some(Space {
        free_bytes: space.free_bytes.checked_add(freed)?.checked_sub(taken)?,
        used_bytes: space.used_bytes.checked_sub(freed)?.checked_add(taken)?,
    })
}

fn set_space(listing: &mut Listing, space: Space) {
    listing.free_bytes = space.free_bytes;
    listing.used_bytes = space.used_bytes;
}
