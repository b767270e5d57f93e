use super::{Frame, WindowBackend, WindowFactory};
use crate::error::Result;

/// Hands out window names. One registry per run, passed to whoever opens
/// windows.
#[derive(Debug, Default)]
pub struct WindowRegistry {
    opened: u32,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next default name: `Frame - 1`, `Frame - 2`, ...
    pub fn next_name(&mut self) -> String {
        self.opened += 1;
        format!("Frame - {}", self.opened)
    }

    pub fn opened(&self) -> u32 {
        self.opened
    }
}

/// Live preview. A user-closed window just stops showing frames.
pub enum DisplayWindow {
    Enabled {
        name: String,
        backend: Box<dyn WindowBackend>,
    },
    Disabled,
}

impl DisplayWindow {
    pub fn open(
        factory: &dyn WindowFactory,
        registry: &mut WindowRegistry,
        name: Option<&str>,
    ) -> Result<Self> {
        let name = match name {
            Some(name) => name.to_string(),
            None => registry.next_name(),
        };
        let backend = factory.create(&name)?;
        tracing::debug!("DisplayWindow: opened '{}'", name);
        Ok(Self::Enabled { name, backend })
    }

    pub fn disabled() -> Self {
        Self::Disabled
    }

    /// Show a frame; returns whether the window still exists.
    pub fn show(&mut self, frame: &Frame) -> Result<bool> {
        match self {
            Self::Enabled { backend, .. } => {
                if !backend.exists() {
                    return Ok(false);
                }
                backend.show(frame)?;
                Ok(true)
            }
            Self::Disabled => Ok(false),
        }
    }

    pub fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        match self {
            Self::Enabled { backend, .. } => backend.move_to(x, y),
            Self::Disabled => Ok(()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Enabled { name, .. } => Some(name.as_str()),
            Self::Disabled => None,
        }
    }

    pub fn exists(&self) -> bool {
        match self {
            Self::Enabled { backend, .. } => backend.exists(),
            Self::Disabled => false,
        }
    }

    /// Close the window if it is still up.
    pub fn close(&mut self) {
        if let Self::Enabled { name, backend } = self {
            if !backend.exists() {
                return;
            }
            if let Err(e) = backend.close() {
                tracing::warn!("DisplayWindow: error closing '{}': {}", name, e);
            }
        }
    }
}

impl Drop for DisplayWindow {
    fn drop(&mut self) {
        self.close();
    }
}
