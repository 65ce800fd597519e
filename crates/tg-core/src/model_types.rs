use serde::{Deserialize, Serialize};

/// What kind of scene object a generation job should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Splat,
    Mesh,
}

impl ObjectKind {
    /// Name for display
    pub fn name(&self) -> &str {
        match self {
            Self::Splat => "Gaussian Splat",
            Self::Mesh => "Mesh",
        }
    }

    /// Identifier sent to the generation service
    pub fn id(&self) -> &str {
        match self {
            Self::Splat => "splat",
            Self::Mesh => "mesh",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Splat => "Gaussian splat point cloud, imported as-is",
            Self::Mesh => "Splat converted to a textured mesh after import",
        }
    }

    /// Whether the imported splat has to go through mesh conversion
    pub fn needs_conversion(&self) -> bool {
        matches!(self, Self::Mesh)
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::all().into_iter().find(|kind| kind.id() == id)
    }

    /// All available kinds
    pub fn all() -> [ObjectKind; 2] {
        [Self::Splat, Self::Mesh]
    }
}

impl Default for ObjectKind {
    fn default() -> Self {
        Self::Splat
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ids() {
        assert_eq!(ObjectKind::Splat.id(), "splat");
        assert_eq!(ObjectKind::Mesh.id(), "mesh");
    }

    #[test]
    fn test_from_id() {
        assert_eq!(ObjectKind::from_id("mesh"), Some(ObjectKind::Mesh));
        assert_eq!(ObjectKind::from_id("voxels"), None);
    }

    #[test]
    fn test_conversion() {
        assert!(ObjectKind::Mesh.needs_conversion());
        assert!(!ObjectKind::Splat.needs_conversion());
    }
}
