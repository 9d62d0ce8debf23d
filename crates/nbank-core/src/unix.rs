//! Thin wrappers over the libc user/group database and access checks.

use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Login name of the current real user, if the passwd database has one.
pub fn current_user_name() -> Option<String> {
    // SAFETY: getpwuid returns either null or a pointer to static storage that
    // stays valid until the next passwd lookup; the name is copied out at once.
    unsafe {
        let pw = libc::getpwuid(libc::getuid());
        if pw.is_null() || (*pw).pw_name.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*pw).pw_name).to_string_lossy().into_owned())
    }
}

/// Name of the current real group, if the group database has one.
pub fn current_group_name() -> Option<String> {
    // SAFETY: see current_user_name; getgrgid has the same contract.
    unsafe {
        let gr = libc::getgrgid(libc::getgid());
        if gr.is_null() || (*gr).gr_name.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*gr).gr_name).to_string_lossy().into_owned())
    }
}

/// Numeric id of the named group. Numeric strings are accepted as-is.
pub fn group_id(name: &str) -> Option<u32> {
    if let Ok(gid) = name.parse::<u32>() {
        return Some(gid);
    }
    let cname = CString::new(name).ok()?;
    // SAFETY: cname is a valid NUL-terminated string; the returned record is
    // read immediately.
    unsafe {
        let gr = libc::getgrnam(cname.as_ptr());
        if gr.is_null() {
            None
        } else {
            Some((*gr).gr_gid)
        }
    }
}

/// Whether the current user may create entries in `dir`.
pub fn is_writable(dir: &Path) -> bool {
    let Ok(cpath) = CString::new(dir.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: cpath is a valid NUL-terminated path.
    unsafe { libc::access(cpath.as_ptr(), libc::W_OK | libc::X_OK) == 0 }
}
