//! Target architecture handling.
//!
//! Go publishes Windows archives for four CPU architectures. Users type them
//! in many spellings (`x64`, `amd64`, `x86-64`, `386`, `32`, ...), so every
//! input is normalised into [`Architecture`] once at the edge. The registry
//! stores the normalised value, which means nothing downstream has to guess
//! an architecture from a directory name.
//!
//! | Variant | Display | Go name (`GOARCH`, archive suffix) |
//! |---------|---------|-------------------------------------|
//! | `X86`   | `x86`   | `386`                               |
//! | `X64`   | `x64`   | `amd64`                             |
//! | `Arm`   | `arm`   | `arm`                               |
//! | `Arm64` | `arm64` | `arm64`                             |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{GvsError, GvsResult};

/// CPU architecture of a Go toolchain build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// 32-bit x86
    X86,
    /// 64-bit x86
    X64,
    /// 32-bit ARM
    Arm,
    /// 64-bit ARM
    Arm64,
}

impl Architecture {
    /// Returns the architecture of the running host.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedArchitecture` when the binary was built for a CPU
    /// that Go does not ship Windows archives for.
    pub fn host() -> GvsResult<Self> {
        match std::env::consts::ARCH {
            "x86" => Ok(Self::X86),
            "x86_64" => Ok(Self::X64),
            "arm" => Ok(Self::Arm),
            "aarch64" => Ok(Self::Arm64),
            other => Err(GvsError::UnsupportedArchitecture {
                value: other.to_string(),
            }),
        }
    }

    /// Short name shown to users and used in install directory names.
    #[must_use = "returns the name without side effects"]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
        }
    }

    /// Name the Go toolchain itself uses for this architecture.
    #[must_use = "returns the name without side effects"]
    pub fn go_name(self) -> &'static str {
        match self {
            Self::X86 => "386",
            Self::X64 => "amd64",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
        }
    }
}

impl FromStr for Architecture {
    type Err = GvsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x86" | "386" | "86" | "32" | "i386" => Ok(Self::X86),
            "x64" | "amd64" | "x86-64" | "x86_64" | "64" => Ok(Self::X64),
            "arm" | "armv6l" => Ok(Self::Arm),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            _ => Err(GvsError::UnsupportedArchitecture {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
