use serde::{Deserialize, Serialize};

/// Optimization status of a degree of freedom.
///
/// Passive DOFs contribute to the forward mapping but receive no
/// parametric gradient unless a caller asks for it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DofStatus {
    #[default]
    Active,
    Passive,
}

impl DofStatus {
    pub fn is_active(self) -> bool {
        self == DofStatus::Active
    }
}
