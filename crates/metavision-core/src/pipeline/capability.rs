//! Optional third-party capabilities.
//!
//! Every extractor that depends on an optional engine holds a
//! [`Capability`]. The extractor matches on it internally and returns the
//! documented default section for [`Capability::Unavailable`], so the
//! orchestrator never checks whether an engine is loaded.

/// An engine that may or may not be present at runtime.
#[derive(Debug, Clone)]
pub enum Capability<T> {
    Available(T),
    Unavailable,
}

impl<T> Capability<T> {
    /// `Available(value)` when `enabled`, otherwise `Unavailable`.
    pub fn when(enabled: bool, value: impl FnOnce() -> T) -> Self {
        if enabled {
            Capability::Available(value())
        } else {
            Capability::Unavailable
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    pub fn as_ref(&self) -> Capability<&T> {
        match self {
            Capability::Available(v) => Capability::Available(v),
            Capability::Unavailable => Capability::Unavailable,
        }
    }
}

impl<T> From<Option<T>> for Capability<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Capability::Available(v),
            None => Capability::Unavailable,
        }
    }
}
