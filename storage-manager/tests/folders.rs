// Copyright (C) 2015-2021 Vaultos Systems Inc.
// This file is part of the vaultos library.

// The vaultos library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The vaultos library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the vaultos library. If not, see <https://www.gnu.org/licenses/>.

use tempfile::TempDir;
use vaultos_objects::{Hash, Params, SECTOR_SIZE};
use vaultos_storage_manager::{sector_root, StorageManager, StorageManagerError};

fn sector(fill: u8) -> Vec<u8> {
    vec![fill; SECTOR_SIZE as usize]
}

#[test]
fn folder_size_is_range_checked() {
    let params = Params::testing();
    let persist = TempDir::new().unwrap();
    let folder = TempDir::new().unwrap();
    let sm = StorageManager::open(params.clone(), persist.path()).unwrap();

    assert!(matches!(
        sm.add_storage_folder(
            folder.path().to_path_buf(),
            params.min_storage_folder_size - 1
        ),
        Err(StorageManagerError::InvalidFolderSize(_))
    ));
    assert!(matches!(
        sm.add_storage_folder(
            folder.path().to_path_buf(),
            params.max_storage_folder_size + 1
        ),
        Err(StorageManagerError::InvalidFolderSize(_))
    ));
}

#[test]
fn folder_path_must_be_a_directory_and_unique() {
    let params = Params::testing();
    let persist = TempDir::new().unwrap();
    let folder = TempDir::new().unwrap();
    let sm = StorageManager::open(params.clone(), persist.path()).unwrap();

    assert!(matches!(
        sm.add_storage_folder(
            folder.path().join("does-not-exist"),
            params.min_storage_folder_size
        ),
        Err(StorageManagerError::NotADirectory(_))
    ));

    sm.add_storage_folder(folder.path().to_path_buf(), params.min_storage_folder_size)
        .unwrap();
    assert!(matches!(
        sm.add_storage_folder(folder.path().to_path_buf(), params.min_storage_folder_size),
        Err(StorageManagerError::DuplicateFolder(_))
    ));
}

#[test]
fn folder_uids_are_unique_and_linked() {
    let params = Params::testing();
    let persist = TempDir::new().unwrap();
    let sm = StorageManager::open(params.clone(), persist.path()).unwrap();

    let mut dirs = vec![];
    for _ in 0..4 {
        let dir = TempDir::new().unwrap();
        sm.add_storage_folder(dir.path().to_path_buf(), params.min_storage_folder_size)
            .unwrap();
        dirs.push(dir);
    }

    let infos = sm.storage_folders();
    assert_eq!(infos.len(), 4);
    for (i, a) in infos.iter().enumerate() {
        assert_eq!(a.uid.len(), params.storage_folder_uid_size);
        for b in infos.iter().skip(i + 1) {
            assert_ne!(a.uid, b.uid);
        }
        // Each folder is addressed through a symlink named by its uid.
        let link = persist.path().join(hex::encode(&a.uid));
        assert_eq!(std::fs::read_link(link).unwrap(), a.path);
    }
}

#[test]
fn remove_offloads_sectors_to_remaining_folder() {
    let params = Params::testing();
    let persist = TempDir::new().unwrap();
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let sm = StorageManager::open(params.clone(), persist.path()).unwrap();
    sm.add_storage_folder(dir_a.path().to_path_buf(), params.min_storage_folder_size)
        .unwrap();

    // Fill folder A with three sectors before B exists.
    let mut ids: Vec<Hash> = vec![];
    let mut payloads = vec![];
    for i in 0..3u8 {
        let data = sector(i);
        let id = sector_root(&data);
        sm.add_sector(&id, 0, &data).unwrap();
        ids.push(id);
        payloads.push(data);
    }

    sm.add_storage_folder(dir_b.path().to_path_buf(), params.min_storage_folder_size)
        .unwrap();
    let uid_a = sm.storage_folders()[0].uid.clone();

    sm.remove_storage_folder(0, false).unwrap();

    // One folder left, holding everything; the old symlink is gone.
    let infos = sm.storage_folders();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].path, dir_b.path());
    assert_eq!(infos[0].size - infos[0].size_remaining, 3 * SECTOR_SIZE);
    assert!(!persist.path().join(hex::encode(&uid_a)).exists());

    for (id, data) in ids.iter().zip(&payloads) {
        assert_eq!(&sm.read_sector(id).unwrap(), data);
        assert_eq!(
            sm.sector_usage(id).unwrap().unwrap().folder_uid,
            infos[0].uid
        );
    }
}

#[test]
fn remove_without_room_reports_incomplete_offload() {
    let params = Params::testing();
    let persist = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let sm = StorageManager::open(params.clone(), persist.path()).unwrap();
    sm.add_storage_folder(dir.path().to_path_buf(), params.min_storage_folder_size)
        .unwrap();

    let data = sector(1);
    sm.add_sector(&sector_root(&data), 0, &data).unwrap();

    // Nowhere to offload to.
    let err = sm.remove_storage_folder(0, false).unwrap_err();
    assert!(matches!(
        err,
        StorageManagerError::IncompleteOffload { offloaded: 0, .. }
    ));
    assert_eq!(sm.storage_folders().len(), 1);

    // Force removal abandons the stranded sector.
    sm.remove_storage_folder(0, true).unwrap();
    assert_eq!(sm.storage_folders().len(), 0);
    assert!(sm.sector_usage(&sector_root(&data)).unwrap().is_none());
}

#[test]
fn shrinking_a_folder_offloads_the_excess() {
    let params = Params::testing();
    let persist = TempDir::new().unwrap();
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let sm = StorageManager::open(params.clone(), persist.path()).unwrap();
    // A is twice the minimum so it can shrink to the minimum later.
    sm.add_storage_folder(
        dir_a.path().to_path_buf(),
        2 * params.min_storage_folder_size,
    )
    .unwrap();

    // 10 sectors in A: more than fits in the minimum size (8 sectors).
    for i in 0..10u8 {
        let data = sector(i);
        sm.add_sector(&sector_root(&data), 0, &data).unwrap();
    }
    sm.add_storage_folder(dir_b.path().to_path_buf(), params.min_storage_folder_size)
        .unwrap();

    sm.resize_storage_folder(0, params.min_storage_folder_size)
        .unwrap();

    let infos = sm.storage_folders();
    assert_eq!(infos[0].size, params.min_storage_folder_size);
    // At least two sectors moved to B.
    let used_b = infos[1].size - infos[1].size_remaining;
    assert!(used_b >= 2 * SECTOR_SIZE);
    // A's contents now fit its new size.
    let used_a = infos[0].size - infos[0].size_remaining;
    assert!(used_a <= params.min_storage_folder_size);
}

#[test]
fn growing_a_folder_frees_capacity() {
    let params = Params::testing();
    let persist = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let sm = StorageManager::open(params.clone(), persist.path()).unwrap();
    sm.add_storage_folder(dir.path().to_path_buf(), params.min_storage_folder_size)
        .unwrap();

    let data = sector(1);
    sm.add_sector(&sector_root(&data), 0, &data).unwrap();

    sm.resize_storage_folder(0, 2 * params.min_storage_folder_size)
        .unwrap();
    let info = &sm.storage_folders()[0];
    assert_eq!(info.size, 2 * params.min_storage_folder_size);
    assert_eq!(info.size_remaining, info.size - SECTOR_SIZE);
}

#[test]
fn folder_count_is_capped() {
    let mut params = Params::testing();
    params.max_storage_folders = 2;
    let persist = TempDir::new().unwrap();
    let sm = StorageManager::open(params.clone(), persist.path()).unwrap();

    let keep: Vec<TempDir> = (0..2)
        .map(|_| {
            let dir = TempDir::new().unwrap();
            sm.add_storage_folder(dir.path().to_path_buf(), params.min_storage_folder_size)
                .unwrap();
            dir
        })
        .collect();

    let extra = TempDir::new().unwrap();
    assert!(matches!(
        sm.add_storage_folder(extra.path().to_path_buf(), params.min_storage_folder_size),
        Err(StorageManagerError::MaxStorageFolders)
    ));
    drop(keep);
}
