/// Windows camera probe.
///
/// The CapabilityAccessManager keeps per-app usage counters for the webcam
/// under `HKCU\...\ConsentStore\webcam`. An app is using the camera right now
/// when its `LastUsedTimeStart` is later than its `LastUsedTimeStop` (both are
/// FILETIME values, 0 meaning never). Packaged apps are direct subkeys;
/// desktop apps live one level deeper under `NonPackaged`.
use async_trait::async_trait;

use super::{CameraProbe, Reading};
use crate::error::ProbeError;

const CONSENT_STORE: &str =
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\CapabilityAccessManager\ConsentStore";
const CAPABILITY: &str = "webcam";

pub struct ConsentStoreProbe;

impl ConsentStoreProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CameraProbe for ConsentStoreProbe {
    async fn is_camera_active(&mut self) -> Result<Reading, ProbeError> {
        super::run_blocking(query_consent_store).await
    }
}

/// Checks packaged apps first, then desktop apps.
fn query_consent_store() -> Result<Reading, ProbeError> {
    let root = format!(r"{CONSENT_STORE}\{CAPABILITY}");
    if let Some(app) = imp::find_app_in_use(&root)? {
        return Ok(Reading::active(display_name(&app)));
    }
    match imp::find_app_in_use(&format!(r"{root}\NonPackaged"))? {
        Some(app) => Ok(Reading::active(display_name(&app))),
        None => Ok(Reading::inactive()),
    }
}

fn is_in_use(last_start: u64, last_stop: u64) -> bool {
    last_start > last_stop
}

/// NonPackaged subkeys are executable paths with `\` encoded as `#`.
fn display_name(subkey: &str) -> String {
    subkey.replace('#', "\\")
}

mod imp {
    use std::ffi::c_void;

    use windows::core::{w, PCWSTR, PWSTR};
    use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_NO_MORE_ITEMS, ERROR_SUCCESS};
    use windows::Win32::System::Registry::{
        RegCloseKey, RegEnumKeyExW, RegGetValueW, RegOpenKeyExW, HKEY, HKEY_CURRENT_USER,
        KEY_READ, RRF_RT_REG_QWORD,
    };

    use crate::error::ProbeError;

    /// Longest registry key name plus terminator.
    const MAX_KEY_LEN: usize = 256;

    /// Closes the wrapped key when dropped.
    struct KeyGuard(HKEY);

    impl Drop for KeyGuard {
        fn drop(&mut self) {
            unsafe {
                let _ = RegCloseKey(self.0);
            }
        }
    }

    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Returns the name of the first subkey of `path` whose usage counters say
    /// the camera is in use. A missing `path` means the camera was never used.
    pub fn find_app_in_use(path: &str) -> Result<Option<String>, ProbeError> {
        let path_w = to_wide(path);
        let mut hkey = HKEY::default();
        let err = unsafe {
            RegOpenKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR::from_raw(path_w.as_ptr()),
                0,
                KEY_READ,
                &mut hkey,
            )
        };
        if err == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        if err != ERROR_SUCCESS {
            return Err(ProbeError::Os(format!("RegOpenKeyExW({path}) failed: {err:?}")));
        }
        let key = KeyGuard(hkey);

        let mut index = 0u32;
        loop {
            let mut name = [0u16; MAX_KEY_LEN];
            let mut len = MAX_KEY_LEN as u32;
            let err = unsafe {
                RegEnumKeyExW(
                    key.0,
                    index,
                    PWSTR::from_raw(name.as_mut_ptr()),
                    &mut len,
                    None,
                    PWSTR::null(),
                    None,
                    None,
                )
            };
            if err == ERROR_NO_MORE_ITEMS {
                return Ok(None);
            }
            if err != ERROR_SUCCESS {
                return Err(ProbeError::Os(format!("RegEnumKeyExW({path}) failed: {err:?}")));
            }
            index += 1;

            let subkey = &name[..len as usize];
            let start = read_qword(&key, subkey, w!("LastUsedTimeStart"));
            let stop = read_qword(&key, subkey, w!("LastUsedTimeStop"));
            if let (Some(start), Some(stop)) = (start, stop) {
                if super::is_in_use(start, stop) {
                    return Ok(Some(String::from_utf16_lossy(subkey)));
                }
            }
        }
    }

    /// Reads a REG_QWORD value from `subkey`. Absent values read as `None`.
    fn read_qword(key: &KeyGuard, subkey: &[u16], value: PCWSTR) -> Option<u64> {
        let mut subkey_w = subkey.to_vec();
        subkey_w.push(0);
        let mut data = 0u64;
        let mut size = std::mem::size_of::<u64>() as u32;
        let err = unsafe {
            RegGetValueW(
                key.0,
                PCWSTR::from_raw(subkey_w.as_ptr()),
                value,
                RRF_RT_REG_QWORD,
                None,
                Some(&mut data as *mut u64 as *mut c_void),
                Some(&mut size as *mut u32),
            )
        };
        (err == ERROR_SUCCESS).then_some(data)
    }
}
