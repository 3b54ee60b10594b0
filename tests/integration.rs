/// Integration tests for retrodisk

use retrodisk::filesystem::binary_header;
use retrodisk::io::{codec_for, EdskCodec};
use retrodisk::mmb::{DISK_SIZE, SLOTS_PER_CHUNK};
use retrodisk::*;
use tempfile::TempDir;

fn formatted(fs_type: FileSystemType, format: DiskImageFormat, geometry: Geometry) -> Box<dyn FileSystem> {
    let mut image = DiskImage::create(format, geometry).expect("Failed to create image");
    fs_type.init(&mut image).expect("Failed to format image");
    fs_type.mount(image).map_err(|e| e.into_parts().0).expect("Failed to mount")
}

#[test]
fn test_dragondos_test_bin() {
    let mut fs = formatted(FileSystemType::DragonDos, DiskImageFormat::Vdk, Geometry::dragon_ss40());
    let free = fs.free_size();
    let data: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();

    fs.insert_file("TEST.BIN", &data, true).expect("Failed to insert");
    assert_eq!(fs.files_num(), 1);
    assert_eq!(fs.file_name(0).as_deref(), Some("TEST.BIN"));
    assert_eq!(fs.extract_file("TEST.BIN", false).unwrap(), data);

    let with_header = fs.extract_file("TEST.BIN", true).unwrap();
    assert_eq!(with_header.len(), 609);
    let header = binary_header(&with_header).expect("Missing binary header");
    assert_eq!(header.length, 600);
    assert_eq!(&with_header[9..], data.as_slice());

    fs.delete_file("TEST.BIN").unwrap();
    assert_eq!(fs.free_size(), free);
    assert_eq!(fs.files_num(), 0);
}

#[test]
fn test_save_and_reopen_through_registries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("disk.vdk");

    let mut fs = formatted(FileSystemType::DragonDos, DiskImageFormat::Vdk, Geometry::dragon_ds40());
    fs.insert_file("HELLO.TXT", b"Hello, Dragon", false).unwrap();
    fs.save(&path).expect("Failed to save");

    let image = DiskImage::open(&path).expect("Failed to reopen");
    assert_eq!(image.format(), DiskImageFormat::Vdk);
    assert_eq!(image.geometry().sides, 2);
    let fs = FileSystemRegistry::default()
        .mount(image)
        .map_err(|e| e.into_parts().0)
        .unwrap();
    assert_eq!(fs.fs_type(), FileSystemType::DragonDos);
    assert_eq!(fs.extract_file("hello.txt", false).unwrap(), b"Hello, Dragon");
}

#[test]
fn test_edsk_unformatted_last_track() {
    let mut image = DiskImage::builder()
        .format(DiskImageFormat::Edsk)
        .geometry(Geometry::dragon_ss40())
        .build()
        .expect("Failed to build image");
    image.disks_mut()[0].set_track(Track::unformatted(39, 0));

    let bytes = codec_for(DiskImageFormat::Edsk).encode(&image).unwrap();
    assert!(bytes.starts_with(b"EXTENDED"));
    assert_eq!(bytes[0x34 + 39], 0);

    let decoded = DiskImage::from_bytes(&bytes).unwrap();
    assert_eq!(decoded.format(), DiskImageFormat::Edsk);
    let info = decoded.track_info(39, 0).unwrap();
    assert!(!info.formatted);
    assert_eq!(info.sectors_num, 0);
    assert!(decoded.track_info(38, 0).unwrap().formatted);
}

#[test]
fn test_codec_round_trips() {
    let cases = [
        (DiskImageFormat::Raw, Geometry::acorn_ssd80()),
        (DiskImageFormat::Edsk, Geometry::dragon_ds40()),
        (DiskImageFormat::Imd, Geometry::pc_360k()),
        (DiskImageFormat::Jvc, Geometry::dragon_ss40()),
        (DiskImageFormat::Vdk, Geometry::dragon_ds80()),
    ];
    for (format, geometry) in cases {
        let mut image = DiskImage::create(format, geometry).unwrap();
        let last = geometry.total_sectors() - 1;
        image.write_lsn(1, b"first").unwrap();
        image.write_lsn(last, b"last").unwrap();

        let codec = codec_for(format);
        let bytes = codec.encode(&image).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.geometry().total_sectors(), geometry.total_sectors(), "{}", format);
        assert_eq!(&decoded.read_lsn(1).unwrap()[..5], b"first", "{}", format);
        assert_eq!(&decoded.read_lsn(last).unwrap()[..4], b"last", "{}", format);
        assert_eq!(codec.encode(&decoded).unwrap(), bytes, "{}", format);
    }
}

#[test]
fn test_convert_between_containers() {
    let mut fs = formatted(FileSystemType::Os9Rbf, DiskImageFormat::Jvc, Geometry::dragon_ds40());
    fs.insert_file("STARTUP", b"echo hello\n", false).unwrap();
    let mut image = fs.into_image();

    image.set_format(DiskImageFormat::Imd);
    let bytes = image.to_bytes().unwrap();
    assert!(bytes.starts_with(b"IMD "));

    let decoded = DiskImage::from_bytes(&bytes).unwrap();
    assert_eq!(decoded.format(), DiskImageFormat::Imd);
    let fs = FileSystemRegistry::default()
        .mount(decoded)
        .map_err(|e| e.into_parts().0)
        .unwrap();
    assert_eq!(fs.fs_type(), FileSystemType::Os9Rbf);
    assert_eq!(fs.extract_file("STARTUP", false).unwrap(), b"echo hello\n");
}

#[test]
fn test_fat12_files() {
    let mut fs = formatted(FileSystemType::Fat12, DiskImageFormat::Raw, Geometry::pc_720k());
    let free = fs.free_size();
    let data = vec![0x5A; 5000];
    fs.insert_file("readme.txt", &data, false).unwrap();
    assert_eq!(fs.file_name(0).as_deref(), Some("README.TXT"));
    assert_eq!(fs.extract_file("README.TXT", false).unwrap(), data);
    assert!(fs.root().find("README.TXT").is_some());

    fs.delete_file("README.TXT").unwrap();
    assert_eq!(fs.free_size(), free);
}

#[test]
fn test_os9_and_dos68_and_dfs() {
    let cases = [
        (FileSystemType::Os9Rbf, Geometry::dragon_ss80()),
        (FileSystemType::Dos68, Geometry::dos68_40()),
        (FileSystemType::AcornDfs, Geometry::acorn_ssd80()),
    ];
    for (fs_type, geometry) in cases {
        let mut fs = formatted(fs_type, DiskImageFormat::Raw, geometry);
        let free = fs.free_size();
        let data: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        fs.insert_file("PROG", &data, true).unwrap();
        assert_eq!(fs.files_num(), 1, "{}", fs_type);
        assert!(fs.free_size() < free, "{}", fs_type);

        let back = fs.extract_file("PROG", false).unwrap();
        assert_eq!(&back[..1000], data.as_slice(), "{}", fs_type);

        fs.delete_file("PROG").unwrap();
        assert_eq!(fs.files_num(), 0, "{}", fs_type);
        assert_eq!(fs.free_size(), free, "{}", fs_type);
    }
}

#[test]
fn test_mmb_slots_across_chunks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("beeb.mmb");
    let mut mmb = MmbFile::create(&path, 2 * SLOTS_PER_CHUNK).expect("Failed to create MMB");
    assert_eq!(mmb.slots(), 1022);

    for slot in [0usize, 510, 511, 1021] {
        let mut disk = vec![0u8; DISK_SIZE as usize];
        disk[..8].copy_from_slice(format!("SLOT{:04}", slot).as_bytes());
        disk[1000..1008].copy_from_slice(&(slot as u64).to_le_bytes());
        disk[DISK_SIZE as usize - 1] = 0xEE;
        mmb.insert_image(slot, &disk).unwrap();
    }

    let mut mmb = MmbFile::open(&path).expect("Failed to reopen MMB");
    for slot in [0usize, 510, 511, 1021] {
        let disk = mmb.extract_image(slot).unwrap();
        assert_eq!(disk.len(), DISK_SIZE as usize);
        assert_eq!(&disk[1000..1008], &(slot as u64).to_le_bytes());
        assert_eq!(disk[DISK_SIZE as usize - 1], 0xEE);
        assert_eq!(mmb.entry(slot).unwrap().name, format!("SLOT{:04}", slot));
        assert_eq!(mmb.entry(slot).unwrap().attribute, SlotAttribute::Unlocked);
    }
    assert_eq!(mmb.entry(512).unwrap().attribute, SlotAttribute::Unformatted);
    assert!(matches!(
        mmb.extract_image(1022),
        Err(DiskError::SlotOutOfRange { slot: 1022, max: 1021 })
    ));
}

#[test]
fn test_mmb_holds_dfs_disks() {
    let dir = TempDir::new().unwrap();
    let mut mmb = MmbFile::create(dir.path().join("games.mmb"), 10).unwrap();

    let mut fs = formatted(FileSystemType::AcornDfs, DiskImageFormat::Raw, Geometry::acorn_ssd80());
    fs.insert_file("$.!BOOT", b"CHAIN \"MENU\"\r", false).unwrap();
    let image = fs.into_image();
    mmb.insert_image(3, &image.linear_bytes()).unwrap();

    let fs = AcornDfsFileSystem::load(mmb.disk_image(3).unwrap())
        .map_err(|e| e.into_parts().0)
        .unwrap();
    assert_eq!(fs.files_num(), 1);
    assert_eq!(fs.file_name(0).as_deref(), Some("$.!BOOT"));
    assert_eq!(mmb.catalog(3).unwrap().entries.len(), 1);
}

#[test]
fn test_error_handling() {
    assert!(DiskImage::open("/nonexistent/disk.vdk").is_err());
    assert!(matches!(
        DiskImage::from_bytes(&[]),
        Err(DiskError::NoMatchingFormat(_))
    ));

    let image = DiskImage::create(DiskImageFormat::Raw, Geometry::dragon_ss40()).unwrap();
    assert!(image.read_lsn(40 * 18).is_err());
    assert!(matches!(
        image.logical_sector(40, 0, 0),
        Err(DiskError::InvalidTrack { .. })
    ));
}

#[test]
fn test_edsk_codec_is_reachable() {
    let image = DiskImage::create(DiskImageFormat::Edsk, Geometry::dragon_ss40()).unwrap();
    let bytes = EdskCodec.encode(&image).unwrap();
    assert_eq!(DiskImage::from_bytes(&bytes).unwrap().format(), DiskImageFormat::Edsk);
}
