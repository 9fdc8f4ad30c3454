//! Windows implementations of the environment store.
//!
//! Machine-wide variables live under
//! `HKLM\System\CurrentControlSet\Control\Session Manager\Environment`.
//! Two stores reach them:
//!
//! - [`RegistryStore`] talks to the registry API through `winreg`
//! - [`ShellStore`] shells out to `reg.exe` and parses its text output
//!
//! Both keep the existing value type on write, so `Path` stays `REG_EXPAND_SZ`
//! and `%SystemRoot%`-style entries keep expanding. After a change,
//! `WM_SETTINGCHANGE` is broadcast so Explorer and new shells pick it up.

#![cfg_attr(not(windows), allow(dead_code))]

use regex::Regex;
use std::process::Command;
use std::sync::LazyLock;

use super::store::{EnvironmentStore, PATH};
use crate::config::StoreKind;
use crate::errors::{GvsError, GvsResult};

/// Registry key holding machine-wide environment variables.
pub const ENVIRONMENT_KEY: &str = r"System\CurrentControlSet\Control\Session Manager\Environment";

/// The same key in the form `reg.exe` expects.
const REG_EXE_KEY: &str = r"HKEY_LOCAL_MACHINE\System\CurrentControlSet\Control\Session Manager\Environment";

/// Broadcasts `WM_SETTINGCHANGE` / `"Environment"` with a 5 second timeout.
const BROADCAST_SCRIPT: &str = r#"
$source = @'
using System;
using System.Runtime.InteropServices;
public class GvsNative {
    [DllImport("user32.dll", SetLastError = true, CharSet = CharSet.Auto)]
    public static extern IntPtr SendMessageTimeout(
        IntPtr hWnd, uint Msg, UIntPtr wParam, string lParam,
        uint fuFlags, uint uTimeout, out UIntPtr lpdwResult);
}
'@
Add-Type -TypeDefinition $source -Language CSharp
$result = [UIntPtr]::Zero
[void][GvsNative]::SendMessageTimeout([IntPtr]0xffff, 0x1a, [UIntPtr]::Zero, "Environment", 2, 5000, [ref]$result)
"#;

static QUERY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(REG_(?:EXPAND_)?SZ)\s+(.+)").expect("static regex is valid")
});

static QUERY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+(\S+)\s+(REG_(?:EXPAND_)?SZ)\s+(.*)$").expect("static regex is valid")
});

/// Opens the store selected in settings.
///
/// # Errors
///
/// Returns an error on hosts without a Windows registry.
pub fn open_store(kind: StoreKind) -> GvsResult<Box<dyn EnvironmentStore>> {
    #[cfg(windows)]
    {
        Ok(match kind {
            StoreKind::Native => Box::new(RegistryStore::new()),
            StoreKind::Shell => Box::new(ShellStore::new()),
        })
    }
    #[cfg(not(windows))]
    {
        Err(GvsError::store(format!(
            "the {kind:?} environment store needs Windows; {} is not supported",
            std::env::consts::OS
        )))
    }
}

/// Returns true when the process runs elevated.
///
/// `net session` only succeeds for administrators.
#[must_use]
pub fn is_elevated() -> bool {
    Command::new("net")
        .arg("session")
        .output()
        .is_ok_and(|output| output.status.success())
}

/// Sends the environment-changed broadcast through PowerShell.
///
/// # Errors
///
/// Returns an error if PowerShell is missing or the script fails.
pub fn broadcast_environment_change() -> GvsResult<()> {
    let powershell = which::which("powershell")
        .or_else(|_| which::which("pwsh"))
        .map_err(|e| GvsError::store(format!("PowerShell not found: {e}")))?;
    let output = Command::new(powershell)
        .args(["-NoProfile", "-NonInteractive", "-Command", BROADCAST_SCRIPT])
        .output()
        .map_err(|e| GvsError::io("Failed to run PowerShell", e))?;
    if !output.status.success() {
        return Err(GvsError::store(format!(
            "environment broadcast failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Value type for a variable that does not exist yet.
fn default_value_type(name: &str) -> &'static str {
    if name.eq_ignore_ascii_case(PATH) {
        "REG_EXPAND_SZ"
    } else {
        "REG_SZ"
    }
}

/// Extracts `(type, value)` from `reg query /v <name>` output.
#[must_use]
pub fn parse_query_value(output: &str) -> Option<(String, String)> {
    let captures = QUERY_VALUE.captures(output)?;
    Some((
        captures[1].to_string(),
        captures[2].trim_end_matches(['\r', '\n']).to_string(),
    ))
}

/// Extracts every `(name, value)` string pair from `reg query <key>` output.
#[must_use]
pub fn parse_query_listing(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let captures = QUERY_LINE.captures(line.trim_end_matches('\r'))?;
            Some((captures[1].to_string(), captures[3].to_string()))
        })
        .collect()
}

/// Store that drives `reg.exe`.
#[derive(Debug, Default)]
pub struct ShellStore;

impl ShellStore {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn reg(args: &[&str]) -> GvsResult<std::process::Output> {
        Command::new("reg")
            .args(args)
            .output()
            .map_err(|e| GvsError::io("Failed to run reg.exe", e))
    }

    fn query(name: &str) -> GvsResult<Option<(String, String)>> {
        let output = Self::reg(&["query", REG_EXE_KEY, "/v", name])?;
        if !output.status.success() {
            // reg.exe exits 1 for a missing value.
            return Ok(None);
        }
        Ok(parse_query_value(&String::from_utf8_lossy(&output.stdout)))
    }

    fn check(output: &std::process::Output, action: &str) -> GvsResult<()> {
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.to_ascii_lowercase().contains("access is denied") {
            return Err(GvsError::permission_denied(format!("{action}: {stderr}")));
        }
        Err(GvsError::store(format!("{action}: {stderr}")))
    }
}

impl EnvironmentStore for ShellStore {
    fn read(&self, name: &str) -> GvsResult<Option<String>> {
        Ok(Self::query(name)?.map(|(_, value)| value))
    }

    fn write(&self, name: &str, value: &str) -> GvsResult<()> {
        let value_type = match Self::query(name)? {
            Some((value_type, _)) => value_type,
            None => default_value_type(name).to_string(),
        };
        let output = Self::reg(&[
            "add", REG_EXE_KEY, "/v", name, "/t", &value_type, "/d", value, "/f",
        ])?;
        Self::check(&output, &format!("reg add {name}"))
    }

    fn remove(&self, name: &str) -> GvsResult<()> {
        if Self::query(name)?.is_none() {
            return Ok(());
        }
        let output = Self::reg(&["delete", REG_EXE_KEY, "/v", name, "/f"])?;
        Self::check(&output, &format!("reg delete {name}"))
    }

    fn list(&self) -> GvsResult<Vec<(String, String)>> {
        let output = Self::reg(&["query", REG_EXE_KEY])?;
        Self::check(&output, "reg query")?;
        Ok(parse_query_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    fn ensure_writable(&self) -> GvsResult<()> {
        if is_elevated() {
            Ok(())
        } else {
            Err(GvsError::permission_denied(
                "administrator rights are required to change machine environment variables",
            ))
        }
    }

    fn broadcast(&self) -> GvsResult<()> {
        broadcast_environment_change()
    }
}

#[cfg(windows)]
pub use native::RegistryStore;

#[cfg(windows)]
mod native {
    use std::io;
    use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ, KEY_WRITE, RegType};
    use winreg::types::FromRegValue;
    use winreg::{RegKey, RegValue};

    use super::{ENVIRONMENT_KEY, broadcast_environment_change};
    use crate::env::store::{EnvironmentStore, PATH};
    use crate::errors::{GvsError, GvsResult};

    /// Store backed by the registry API.
    #[derive(Debug, Default)]
    pub struct RegistryStore;

    impl RegistryStore {
        #[must_use]
        pub fn new() -> Self {
            Self
        }

        fn open(access: u32) -> GvsResult<RegKey> {
            RegKey::predef(HKEY_LOCAL_MACHINE)
                .open_subkey_with_flags(ENVIRONMENT_KEY, access)
                .map_err(|e| map_error(e, "open the environment key"))
        }
    }

    fn map_error(e: io::Error, action: &str) -> GvsError {
        if e.kind() == io::ErrorKind::PermissionDenied {
            GvsError::permission_denied(format!("cannot {action}: {e}"))
        } else {
            GvsError::store(format!("cannot {action}: {e}"))
        }
    }

    fn encode_utf16(value: &str) -> Vec<u8> {
        value
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect()
    }

    impl EnvironmentStore for RegistryStore {
        fn read(&self, name: &str) -> GvsResult<Option<String>> {
            let key = Self::open(KEY_READ)?;
            match key.get_value::<String, _>(name) {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(map_error(e, &format!("read {name}"))),
            }
        }

        fn write(&self, name: &str, value: &str) -> GvsResult<()> {
            let key = Self::open(KEY_READ | KEY_WRITE)?;
            let vtype = match key.get_raw_value(name) {
                Ok(existing) => existing.vtype,
                Err(_) if name.eq_ignore_ascii_case(PATH) => RegType::REG_EXPAND_SZ,
                Err(_) => RegType::REG_SZ,
            };
            let raw = RegValue {
                bytes: encode_utf16(value).into(),
                vtype,
            };
            key.set_raw_value(name, &raw)
                .map_err(|e| map_error(e, &format!("write {name}")))
        }

        fn remove(&self, name: &str) -> GvsResult<()> {
            let key = Self::open(KEY_READ | KEY_WRITE)?;
            match key.delete_value(name) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(map_error(e, &format!("delete {name}"))),
            }
        }

        fn list(&self) -> GvsResult<Vec<(String, String)>> {
            let key = Self::open(KEY_READ)?;
            let mut values = Vec::new();
            for entry in key.enum_values() {
                let (name, raw) = entry.map_err(|e| map_error(e, "enumerate values"))?;
                if let Ok(value) = String::from_reg_value(&raw) {
                    values.push((name, value));
                }
            }
            Ok(values)
        }

        fn ensure_writable(&self) -> GvsResult<()> {
            Self::open(KEY_READ | KEY_WRITE).map(|_| ())
        }

        fn broadcast(&self) -> GvsResult<()> {
            broadcast_environment_change()
        }
    }
}
