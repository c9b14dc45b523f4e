use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use ThinVol::{
    clone_snapshot, create_snapshot, create_volume, delete_snapshot, delete_volume,
    get_snapshot_info, get_volume_info, init_device, StoreError,
};

const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

#[test]
fn snapshot_chain_mutations() -> Result<()> {
    let dev = new_device("snap-chain")?;
    create_volume(&dev, "vol1", GIB)?;

    let si = get_snapshot_info(&dev, "vol1")?;
    assert_eq!(si.len(), 1);
    let initial = si[0].snapshot_id;
    assert!(initial != 0);
    assert_eq!(si[0].parent_snapshot_id, 0);
    assert_eq!(tip_of(&dev, "vol1")?, initial);

    // один снапшот: tip сдвигается, цепочка tip -> root
    create_snapshot(&dev, "vol1")?;
    let tip = tip_of(&dev, "vol1")?;
    assert_ne!(tip, initial);
    let si = get_snapshot_info(&dev, "vol1")?;
    assert_eq!(si.len(), 2);
    assert_eq!(si[0].snapshot_id, tip);
    assert_eq!(si[0].parent_snapshot_id, initial);
    assert_eq!(si[1].snapshot_id, initial);
    assert_eq!(si[1].parent_snapshot_id, 0);

    // ещё три
    create_snapshot(&dev, "vol1")?;
    create_snapshot(&dev, "vol1")?;
    create_snapshot(&dev, "vol1")?;
    let si = get_snapshot_info(&dev, "vol1")?;
    assert_eq!(si.len(), 5);
    assert_eq!(si.last().unwrap().snapshot_id, initial);
    let vi = get_volume_info(&dev)?;
    assert_eq!(vi[0].snapshot_count, 5);

    // tip удалять нельзя
    let tip = tip_of(&dev, "vol1")?;
    let err = delete_snapshot(&dev, tip).unwrap_err();
    assert_eq!(
        err.downcast_ref::<StoreError>(),
        Some(&StoreError::CannotDeleteCurrent)
    );
    assert_eq!(get_snapshot_info(&dev, "vol1")?.len(), 5);

    // удалить корень (не-tip) — можно
    delete_snapshot(&dev, initial)?;
    let si = get_snapshot_info(&dev, "vol1")?;
    assert_eq!(si.len(), 4);
    assert_eq!(si.last().unwrap().parent_snapshot_id, 0);

    // свежий снапшот занимает освободившийся слот
    create_snapshot(&dev, "vol1")?;
    assert_eq!(get_snapshot_info(&dev, "vol1")?.len(), 5);

    // удалить все, кроме tip'а
    let tip = tip_of(&dev, "vol1")?;
    for s in get_snapshot_info(&dev, "vol1")? {
        if s.snapshot_id != tip {
            delete_snapshot(&dev, s.snapshot_id)?;
        }
    }
    let si = get_snapshot_info(&dev, "vol1")?;
    assert_eq!(si.len(), 1);
    assert_eq!(si[0].snapshot_id, tip);
    assert_eq!(si[0].parent_snapshot_id, 0);
    Ok(())
}

#[test]
fn clone_creates_independent_volume() -> Result<()> {
    let dev = new_device("snap-clone")?;
    create_volume(&dev, "vol1", GIB)?;
    let tip = tip_of(&dev, "vol1")?;

    clone_snapshot(&dev, "vol2cloned", tip)?;
    let vi = get_volume_info(&dev)?;
    assert_eq!(vi.len(), 2);
    assert_eq!(vi[1].volume_name, "vol2cloned");
    assert_eq!(vi[1].volume_size, GIB);
    assert_eq!(vi[1].snapshot_count, 1);
    // клон получает собственный корневой снапшот
    assert_ne!(vi[1].snapshot_id, tip);

    delete_volume(&dev, "vol2cloned")?;
    assert_eq!(get_volume_info(&dev)?.len(), 1);

    // клонировать можно и предка, и tip
    create_snapshot(&dev, "vol1")?;
    for (i, s) in get_snapshot_info(&dev, "vol1")?.iter().enumerate() {
        clone_snapshot(&dev, &format!("clone{}", i + 1), s.snapshot_id)?;
    }
    assert_eq!(get_volume_info(&dev)?.len(), 3);
    Ok(())
}

#[test]
fn snapshot_lookup_failures() -> Result<()> {
    let dev = new_device("snap-miss")?;
    create_volume(&dev, "vol1", GIB)?;

    let err = delete_snapshot(&dev, 999).unwrap_err();
    assert_eq!(
        err.downcast_ref::<StoreError>(),
        Some(&StoreError::SnapshotNotFound(999))
    );
    let err = clone_snapshot(&dev, "c", 999).unwrap_err();
    assert_eq!(
        err.downcast_ref::<StoreError>(),
        Some(&StoreError::SnapshotNotFound(999))
    );
    let err = get_snapshot_info(&dev, "nope").unwrap_err();
    assert_eq!(
        err.downcast_ref::<StoreError>(),
        Some(&StoreError::VolumeNotFound("nope".into()))
    );
    Ok(())
}

#[test]
fn delete_volume_frees_snapshot_slots() -> Result<()> {
    let dev = new_device("snap-free")?;
    create_volume(&dev, "vol1", GIB)?;
    create_snapshot(&dev, "vol1")?;
    create_snapshot(&dev, "vol1")?;
    delete_volume(&dev, "vol1")?;

    // слоты снапшотов вернулись: новый том получает наименьший
    create_volume(&dev, "vol2", GIB)?;
    let si = get_snapshot_info(&dev, "vol2")?;
    assert_eq!(si.len(), 1);
    assert_eq!(si[0].snapshot_id, 1);
    Ok(())
}

fn tip_of(dev: &PathBuf, name: &str) -> Result<u16> {
    let vi = get_volume_info(dev)?;
    let v = vi.iter().find(|v| v.volume_name == name).expect("volume");
    Ok(v.snapshot_id)
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
