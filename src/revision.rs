use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

/// The provenance of an artifact: which version of the file it comes from.
///
/// Beyond the three input revisions and the target, two sentinel revisions
/// mark pseudo-nodes synthesized during merging. Arbitrary revision names
/// are supported for n-way settings; two revisions are equal exactly when
/// their names are equal.
#[derive(Debug, Clone, Eq)]
pub enum Revision {
    Left,
    Base,
    Right,
    Target,
    Choice,
    Conflict,
    Named(String),
}

impl Revision {
    pub fn name(&self) -> &str {
        match self {
            Self::Left => "left",
            Self::Base => "base",
            Self::Right => "right",
            Self::Target => "target",
            Self::Choice => "choice",
            Self::Conflict => "conflict",
            Self::Named(name) => name,
        }
    }

    /// Is this one of the sentinel revisions reserved for pseudo-nodes?
    pub fn is_virtual(&self) -> bool {
        self.name() == "choice" || self.name() == "conflict"
    }
}

impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Hash for Revision {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_name() {
        assert_eq!(Revision::Left, Revision::Named("left".to_owned()));
        assert_ne!(Revision::Left, Revision::Right);
        assert_eq!(
            Revision::Named("feature".to_owned()),
            Revision::Named("feature".to_owned())
        );
    }

    #[test]
    fn sentinels_are_virtual() {
        assert!(Revision::Conflict.is_virtual());
        assert!(Revision::Choice.is_virtual());
        assert!(!Revision::Base.is_virtual());
        assert!(!Revision::Named("other".to_owned()).is_virtual());
    }
}
