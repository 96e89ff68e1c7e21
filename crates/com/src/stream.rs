//! Memory-backed streams and storages used to move persisted bytes in and
//! out of objects.

use std::ffi::c_void;

use windows::Win32::System::Com::StructuredStorage::{
    CreateILockBytesOnHGlobal, ILockBytes, IStorage, StgCreateDocfileOnILockBytes,
    StgOpenStorageOnILockBytes,
};
use windows::Win32::System::Com::{
    IStream, STATFLAG_NONAME, STATSTG, STGM_CREATE, STGM_READWRITE, STGM_SHARE_EXCLUSIVE,
    STREAM_SEEK_END, STREAM_SEEK_SET,
};
use windows::Win32::UI::Shell::SHCreateMemStream;

pub unsafe fn stream_from_bytes(data: &[u8]) -> windows::core::Result<IStream> {
    SHCreateMemStream(Some(data)).ok_or_else(|| windows::core::Error::from_win32())
}

pub unsafe fn empty_stream() -> windows::core::Result<IStream> {
    SHCreateMemStream(None).ok_or_else(|| windows::core::Error::from_win32())
}

pub unsafe fn stream_to_bytes(stream: &IStream) -> windows::core::Result<Vec<u8>> {
    let mut size = 0u64;
    stream.Seek(0, STREAM_SEEK_END, Some(&mut size))?;
    stream.Seek(0, STREAM_SEEK_SET, None)?;
    let mut data = vec![0u8; size as usize];
    let mut read = 0u32;
    stream
        .Read(data.as_mut_ptr() as *mut c_void, data.len() as u32, Some(&mut read))
        .ok()?;
    data.truncate(read as usize);
    Ok(data)
}

/// A fresh compound file living in memory.
pub unsafe fn new_storage() -> windows::core::Result<(ILockBytes, IStorage)> {
    let bytes = CreateILockBytesOnHGlobal(None, true)?;
    let storage = StgCreateDocfileOnILockBytes(
        &bytes,
        STGM_CREATE | STGM_READWRITE | STGM_SHARE_EXCLUSIVE,
        0,
    )?;
    Ok((bytes, storage))
}

pub unsafe fn storage_from_bytes(data: &[u8]) -> windows::core::Result<(ILockBytes, IStorage)> {
    let bytes = CreateILockBytesOnHGlobal(None, true)?;
    bytes.WriteAt(0, data.as_ptr() as *const c_void, data.len() as u32, None)?;
    let storage = StgOpenStorageOnILockBytes(
        &bytes,
        None,
        STGM_READWRITE | STGM_SHARE_EXCLUSIVE,
        None,
        0,
    )?;
    Ok((bytes, storage))
}

pub unsafe fn storage_to_bytes(bytes: &ILockBytes) -> windows::core::Result<Vec<u8>> {
    let mut stat = STATSTG::default();
    bytes.Stat(&mut stat, STATFLAG_NONAME)?;
    let mut data = vec![0u8; stat.cbSize as usize];
    let mut read = 0u32;
    bytes.ReadAt(0, data.as_mut_ptr() as *mut c_void, data.len() as u32, Some(&mut read))?;
    data.truncate(read as usize);
    Ok(data)
}
