//! EC2 types

/// Name, description and source of an image to create or copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// Instance the image is built from
    pub instance_id: String,
    pub name: String,
    pub description: String,
}

impl ImageRequest {
    pub fn new(
        instance_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A specific version of a launch template
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LaunchTemplateRef {
    pub id: String,
    /// Version number, or `$Latest` / `$Default`
    pub version: String,
}

impl LaunchTemplateRef {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for LaunchTemplateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.version)
    }
}
