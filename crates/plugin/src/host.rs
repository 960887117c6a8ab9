//! The host side of the plugin ABI

use std::path::PathBuf;

/// Severity accepted by the host log
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error = 1,
    Warning = 2,
    Notice = 3,
    Debug = 4,
}

/// Services the host application offers to a measure
pub trait HostApi: Send + Sync {
    /// Option value from the measure's section, `default` when unset
    fn read_string(&self, option: &str, default: &str) -> String;

    /// Option value resolved to an absolute path
    fn read_path(&self, option: &str, default: &str) -> String;

    /// Location of the host's own settings file
    fn settings_file(&self) -> Option<PathBuf>;

    fn log(&self, level: LogLevel, message: &str);
}

/// NUL-terminated UTF-16 copy of `text`
pub fn to_wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Read a NUL-terminated UTF-16 string. Null reads as empty.
///
/// # Safety
///
/// `ptr` must be null or point to a readable NUL-terminated UTF-16 string.
pub unsafe fn from_wide(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
}

#[cfg(windows)]
pub use rainmeter::Rainmeter;

#[cfg(windows)]
mod rainmeter {
    use super::{from_wide, to_wide, HostApi, LogLevel};
    use std::ffi::c_void;
    use std::path::PathBuf;

    /// `RmGet` selector for the settings file path
    const RMG_SETTINGSFILE: i32 = 2;

    #[link(name = "Rainmeter", kind = "raw-dylib")]
    extern "system" {
        fn RmReadString(
            rm: *mut c_void,
            option: *const u16,
            def_value: *const u16,
            replace_measures: i32,
        ) -> *const u16;
        fn RmPathToAbsolute(rm: *mut c_void, relative_path: *const u16) -> *const u16;
        fn RmGet(rm: *mut c_void, kind: i32) -> *mut c_void;
        fn RmLog(rm: *mut c_void, level: i32, message: *const u16);
    }

    /// Host API of the measure that owns `rm`
    ///
    /// The handle is kept as an address so the measure can live in the
    /// shared registry; Rainmeter keeps it valid until `Finalize`.
    pub struct Rainmeter {
        rm: usize,
    }

    impl Rainmeter {
        pub fn new(rm: *mut c_void) -> Self {
            Self { rm: rm as usize }
        }

        fn handle(&self) -> *mut c_void {
            self.rm as *mut c_void
        }
    }

    impl HostApi for Rainmeter {
        fn read_string(&self, option: &str, default: &str) -> String {
            let option = to_wide(option);
            let default = to_wide(default);
            unsafe { from_wide(RmReadString(self.handle(), option.as_ptr(), default.as_ptr(), 1)) }
        }

        fn read_path(&self, option: &str, default: &str) -> String {
            let option = to_wide(option);
            let default = to_wide(default);
            unsafe {
                let relative = RmReadString(self.handle(), option.as_ptr(), default.as_ptr(), 1);
                if relative.is_null() || *relative == 0 {
                    return String::new();
                }
                from_wide(RmPathToAbsolute(self.handle(), relative))
            }
        }

        fn settings_file(&self) -> Option<PathBuf> {
            let path = unsafe { from_wide(RmGet(self.handle(), RMG_SETTINGSFILE) as *const u16) };
            (!path.is_empty()).then(|| PathBuf::from(path))
        }

        fn log(&self, level: LogLevel, message: &str) {
            let message = to_wide(message);
            unsafe { RmLog(self.handle(), level as i32, message.as_ptr()) }
        }
    }
}
