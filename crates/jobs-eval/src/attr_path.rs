use std::fmt;

/// Position of a node inside the release tree. The empty path is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrPath {
    segments: Vec<String>,
}

impl AttrPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Splits a dotted path. Only meant for paths whose attribute names
    /// contain no dots themselves.
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }
        Self {
            segments: dotted.split('.').map(str::to_string).collect(),
        }
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for AttrPath {
    fn from(dotted: &str) -> Self {
        Self::parse(dotted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_of_root_has_no_leading_dot() {
        let path = AttrPath::root().child("hello");
        assert_eq!(path.to_string(), "hello");
        assert_eq!(path.child("x86_64-linux").to_string(), "hello.x86_64-linux");
    }

    #[test]
    fn root_displays_as_empty_string() {
        assert_eq!(AttrPath::root().to_string(), "");
        assert!(AttrPath::parse("").is_root());
    }

    #[test]
    fn dotted_names_stay_one_segment() {
        let path = AttrPath::root().child("python3.11");
        assert_eq!(path.segments().len(), 1);
        assert_eq!(path.to_string(), "python3.11");
    }
}
