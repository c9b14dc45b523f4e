use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use ThinVol::consts::BLOCK_SIZE;
use ThinVol::{
    clone_snapshot, create_snapshot, create_volume, delete_snapshot, get_device_info,
    get_snapshot_info, get_volume_info, init_device, open_volume, StoreError,
};

const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

#[test]
fn snapshot_isolates_old_data() -> Result<()> {
    let dev = new_device("sio-iso")?;
    create_volume(&dev, "vol1", GIB)?;

    let mut vc = open_volume(&dev, "vol1")?;
    vc.write_block(&pattern(0xA5), 0, true)?;
    vc.close_volume()?;

    create_snapshot(&dev, "vol1")?;
    let initial = root_snapshot(&dev, "vol1")?;

    // перезапись после снапшота идёт в COW-копию
    let mut vc = open_volume(&dev, "vol1")?;
    vc.write_block(&pattern(0x5A), 0, true)?;
    let mut buf = vec![0u8; BLOCK_SIZE];
    vc.read_block(&mut buf, 0)?;
    assert_eq!(buf, pattern(0x5A));
    vc.close_volume()?;

    // клон данных до снапшота видит старый блок
    clone_snapshot(&dev, "clone_of_initial", initial)?;
    let vc = open_volume(&dev, "clone_of_initial")?;
    let mut buf = vec![0u8; BLOCK_SIZE];
    vc.read_block(&mut buf, 0)?;
    assert_eq!(buf, pattern(0xA5));
    vc.close_volume()?;
    Ok(())
}

#[test]
fn delete_middle_snapshot_merges_into_child() -> Result<()> {
    let dev = new_device("sio-merge")?;
    create_volume(&dev, "vol1", GIB)?;
    let root = root_snapshot(&dev, "vol1")?;

    // root: блок 0
    let mut vc = open_volume(&dev, "vol1")?;
    vc.write_block(&pattern(0xA1), 0, true)?;
    vc.close_volume()?;

    // средний снапшот: блок 100 (COW extent'а 0) и блок 300 (extent 1)
    create_snapshot(&dev, "vol1")?;
    let mut vc = open_volume(&dev, "vol1")?;
    vc.write_block(&pattern(0xB2), 100, true)?;
    vc.write_block(&pattern(0xD4), 300, true)?;
    vc.close_volume()?;
    let middle = tip_snapshot(&dev, "vol1")?;

    // tip: затеняем extent 1 новой записью блока 300
    create_snapshot(&dev, "vol1")?;
    let mut vc = open_volume(&dev, "vol1")?;
    vc.write_block(&pattern(0xE5), 300, true)?;
    vc.close_volume()?;

    delete_snapshot(&dev, middle)?;
    assert_eq!(get_snapshot_info(&dev, "vol1")?.len(), 2);

    // с tip'а видно: блок 0 исходный, блок 100 из среднего, блок 300 новый
    let vc = open_volume(&dev, "vol1")?;
    let mut buf = vec![0u8; BLOCK_SIZE];
    vc.read_block(&mut buf, 0)?;
    assert_eq!(buf, pattern(0xA1));
    vc.read_block(&mut buf, 100)?;
    assert_eq!(buf, pattern(0xB2));
    vc.read_block(&mut buf, 300)?;
    assert_eq!(buf, pattern(0xE5));
    vc.close_volume()?;

    // клон корня: только то, что было до первого снапшота
    clone_snapshot(&dev, "clone_root", root)?;
    let vc = open_volume(&dev, "clone_root")?;
    vc.read_block(&mut buf, 0)?;
    assert_eq!(buf, pattern(0xA1));
    vc.read_block(&mut buf, 100)?;
    assert!(buf.iter().all(|&b| b == 0));
    vc.read_block(&mut buf, 300)?;
    assert!(buf.iter().all(|&b| b == 0));
    vc.close_volume()?;
    Ok(())
}

#[test]
fn clone_copies_extents_physically() -> Result<()> {
    let dev = new_device("sio-copy")?;
    create_volume(&dev, "vol1", GIB)?;

    let mut vc = open_volume(&dev, "vol1")?;
    vc.write_block(&pattern(0x3C), 0, true)?;
    vc.close_volume()?;
    let before = get_device_info(&dev)?.allocated_device_extents;

    let tip = tip_snapshot(&dev, "vol1")?;
    clone_snapshot(&dev, "vol2", tip)?;
    // физическая копия: появился новый слот устройства
    assert_eq!(get_device_info(&dev)?.allocated_device_extents, before + 1);

    // запись в клон не видна оригиналу
    let mut vc = open_volume(&dev, "vol2")?;
    vc.write_block(&pattern(0x42), 0, true)?;
    vc.close_volume()?;
    let vc = open_volume(&dev, "vol1")?;
    let mut buf = vec![0u8; BLOCK_SIZE];
    vc.read_block(&mut buf, 0)?;
    assert_eq!(buf, pattern(0x3C));
    vc.close_volume()?;
    Ok(())
}

#[test]
fn clone_without_space_leaves_device_unchanged() -> Result<()> {
    // 100 MiB: всего 99 слотов устройства
    let dev = new_device("sio-nospace")?;
    create_volume(&dev, "vol1", 60 * MIB)?;

    let mut vc = open_volume(&dev, "vol1")?;
    for e in 0..60u64 {
        vc.write_block(&pattern(0x66), e * 256, true)?;
    }
    vc.close_volume()?;
    assert_eq!(get_device_info(&dev)?.allocated_device_extents, 60);

    let tip = tip_snapshot(&dev, "vol1")?;
    let err = clone_snapshot(&dev, "vol2", tip).unwrap_err();
    assert_eq!(err.downcast_ref::<StoreError>(), Some(&StoreError::NoSpace));

    // на диске ничего не изменилось
    let di = get_device_info(&dev)?;
    assert_eq!(di.allocated_device_extents, 60);
    assert_eq!(di.volume_count, 1);
    assert_eq!(get_volume_info(&dev)?.len(), 1);
    Ok(())
}

#[test]
fn write_past_device_capacity_fails_no_space() -> Result<()> {
    let dev = new_device("sio-full")?;
    // том шире устройства: thin-аллокация упрётся в 99 слотов
    create_volume(&dev, "vol1", GIB)?;

    let mut vc = open_volume(&dev, "vol1")?;
    for e in 0..99u64 {
        vc.write_block(&pattern(0x10), e * 256, true)?;
    }
    let err = vc.write_block(&pattern(0x10), 99 * 256, true).unwrap_err();
    assert_eq!(err.downcast_ref::<StoreError>(), Some(&StoreError::NoSpace));
    vc.close_volume()?;
    Ok(())
}

fn tip_snapshot(dev: &PathBuf, name: &str) -> Result<u16> {
    Ok(get_volume_info(dev)?
        .iter()
        .find(|v| v.volume_name == name)
        .expect("volume")
        .snapshot_id)
}

fn root_snapshot(dev: &PathBuf, name: &str) -> Result<u16> {
    let si = get_snapshot_info(dev, name)?;
    Ok(si.last().expect("chain").snapshot_id)
}

fn pattern(byte: u8) -> Vec<u8> {
    vec![byte; BLOCK_SIZE]
}

fn new_device(prefix: &str) -> Result<PathBuf> {
    let path = std::env::temp_dir().join(format!(
        "thinvol-{}-{}-{}",
        prefix,
        std::process::id(),
        nanos()
    ));
    let f = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&path)?;
    f.set_len(100 * MIB)?;
    drop(f);
    init_device(&path)?;
    Ok(path)
}

fn nanos() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}
