use std::fmt;

/// One unit of work: the identifier of the target a fetch should be run against.
///
/// Tasks are inert values. Each worker thread receives its own [`Task`] by value, so duplicate
/// targets are simply independent tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Task {
    target: String,
}

impl Task {
    pub fn new<T: Into<String>>(target: T) -> Self {
        Self {
            target: target.into(),
        }
    }

    #[inline]
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl From<&str> for Task {
    fn from(target: &str) -> Self {
        Self::new(target)
    }
}

impl From<String> for Task {
    fn from(target: String) -> Self {
        Self::new(target)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target)
    }
}
