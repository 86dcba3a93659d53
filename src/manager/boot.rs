//! Boot stages of the module host.

use std::fmt;

/// Linear boot progression; `Error` is reachable from every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootStage {
    Booting,
    DirReady,
    Reconciled,
    CoreEnsured,
    PendingInstalled,
    Ready,
    Error(String),
}

impl BootStage {
    /// The stage that follows this one, `None` for terminal stages.
    pub fn successor(&self) -> Option<BootStage> {
        match self {
            BootStage::Booting => Some(BootStage::DirReady),
            BootStage::DirReady => Some(BootStage::Reconciled),
            BootStage::Reconciled => Some(BootStage::CoreEnsured),
            BootStage::CoreEnsured => Some(BootStage::PendingInstalled),
            BootStage::PendingInstalled => Some(BootStage::Ready),
            BootStage::Ready | BootStage::Error(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.successor().is_none()
    }

    /// Whether `next` is a legal transition from this stage.
    pub fn can_advance_to(&self, next: &BootStage) -> bool {
        match next {
            BootStage::Error(_) => !self.is_terminal(),
            _ => self.successor().as_ref() == Some(next),
        }
    }
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootStage::Booting => write!(f, "booting"),
            BootStage::DirReady => write!(f, "dir-ready"),
            BootStage::Reconciled => write!(f, "reconciled"),
            BootStage::CoreEnsured => write!(f, "core-ensured"),
            BootStage::PendingInstalled => write!(f, "pending-installed"),
            BootStage::Ready => write!(f, "ready"),
            BootStage::Error(cause) => write!(f, "error: {}", cause),
        }
    }
}
