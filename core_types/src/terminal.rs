//! Terminal geometry shared by processes and sessions

use serde::{Deserialize, Serialize};

/// Width and height of a terminal, in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSize {
    pub width: u16,
    pub height: u16,
}

impl TermSize {
    /// Smallest geometry a client may negotiate
    pub const MIN: TermSize = TermSize {
        width: 80,
        height: 24,
    };

    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Clamps a negotiated size so it is never smaller than [`TermSize::MIN`]
    pub fn clamped(width: u16, height: u16) -> Self {
        Self {
            width: width.max(Self::MIN.width),
            height: height.max(Self::MIN.height),
        }
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self::MIN
    }
}
