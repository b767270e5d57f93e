// Classification of source descriptor strings.

use crate::error::{Result, VideoError};
use std::fmt;
use std::path::{Path, PathBuf};

/// File extensions (lower case, no dot) recognised as video files.
pub const KNOWN_VIDEO_EXTENSIONS: &[&str] =
    &["avi", "mp4", "mpg", "mpeg", "mov", "mkv", "webm", "wmv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    File,
    NetworkStream,
    Device,
    Unknown,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::NetworkStream => "network-stream",
            Self::Device => "device",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A source descriptor together with the kind it was classified as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    raw: String,
    kind: SourceKind,
}

impl MediaDescriptor {
    pub fn classify(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let kind = if scheme_of(&raw).is_some() {
            SourceKind::NetworkStream
        } else if raw.trim().parse::<u32>().is_ok() {
            SourceKind::Device
        } else if has_known_extension(Path::new(&raw)) {
            SourceKind::File
        } else {
            SourceKind::Unknown
        };
        Self { raw, kind }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == SourceKind::File
    }

    pub fn path(&self) -> Option<&Path> {
        match self.kind {
            SourceKind::File | SourceKind::Unknown => Some(Path::new(&self.raw)),
            _ => None,
        }
    }

    pub fn device_index(&self) -> Option<u32> {
        match self.kind {
            SourceKind::Device => self.raw.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn network_info(&self) -> Result<NetworkStreamInfo> {
        NetworkStreamInfo::parse(&self.raw)
    }

    /// Name used for reporting and output naming (`clip.mp4`, `RTSP.stream`,
    /// `Webcam.0`).
    pub fn display_name(&self) -> String {
        match self.kind {
            SourceKind::NetworkStream => {
                let scheme = scheme_of(&self.raw).unwrap_or("stream");
                format!("{}.stream", scheme.to_uppercase())
            }
            SourceKind::Device => format!("Webcam.{}", self.raw.trim()),
            SourceKind::File | SourceKind::Unknown => Path::new(&self.raw)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.raw.clone()),
        }
    }

    /// Display name without its extension.
    pub fn stem(&self) -> String {
        let name = self.display_name();
        Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(name)
    }

    /// Folder the source lives in, for file sources.
    pub fn parent_dir(&self) -> Option<PathBuf> {
        self.path()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}

impl fmt::Display for MediaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SourceKind::NetworkStream => match self.network_info() {
                Ok(info) => write!(f, "{}", info),
                Err(_) => f.write_str(&self.raw),
            },
            _ => f.write_str(&self.raw),
        }
    }
}

pub fn has_known_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| KNOWN_VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn scheme_of(raw: &str) -> Option<&str> {
    let (scheme, _) = raw.trim().split_once("://")?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let valid = first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

/// Parts of a `protocol://[user[:password]@]host[:port][/command]` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStreamInfo {
    pub protocol: String,
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub command: String,
}

impl NetworkStreamInfo {
    pub fn parse(raw: &str) -> Result<Self> {
        let unsupported = |reason: &str| VideoError::UnsupportedDescriptor {
            descriptor: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        let protocol = scheme_of(trimmed).ok_or_else(|| unsupported("missing protocol:// prefix"))?;
        let rest = &trimmed[protocol.len() + 3..];

        // Credentials live in the authority only; the command may contain '@'
        let (authority, command) = rest.split_once('/').unwrap_or((rest, ""));
        let (credentials, host_port) = match authority.rfind('@') {
            Some(at) => (&authority[..at], &authority[at + 1..]),
            None => ("", authority),
        };
        let (user, password) = credentials.split_once(':').unwrap_or((credentials, ""));

        let (host, port) = split_host_port(host_port).ok_or_else(|| unsupported("invalid port"))?;
        if host.is_empty() {
            return Err(unsupported("missing host"));
        }

        Ok(Self {
            protocol: protocol.to_lowercase(),
            host: host.to_string(),
            port,
            user: user.to_string(),
            password: password.to_string(),
            command: command.to_string(),
        })
    }
}

fn split_host_port(host_port: &str) -> Option<(&str, Option<u16>)> {
    // Bracketed IPv6 literal: [::1]:554
    if let Some(inner) = host_port.strip_prefix('[') {
        let (host, tail) = inner.split_once(']')?;
        return match tail.strip_prefix(':') {
            Some(port) => Some((host, Some(port.parse().ok()?))),
            None if tail.is_empty() => Some((host, None)),
            None => None,
        };
    }
    match host_port.rsplit_once(':') {
        Some((host, port)) => Some((host, Some(port.parse().ok()?))),
        None => Some((host_port, None)),
    }
}

impl fmt::Display for NetworkStreamInfo {
    /// Credentials are never printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.protocol)?;
        if !self.user.is_empty() {
            write!(f, "{}:***@", self.user)?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if !self.command.is_empty() {
            write!(f, "/{}", self.command)?;
        }
        Ok(())
    }
}
