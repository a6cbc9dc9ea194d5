use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{Error, Result};

/// The three lifecycle operations every instance gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Start,
    Stop,
    Clean,
}

impl Verb {
    pub const ALL: [Verb; 3] = [Verb::Start, Verb::Stop, Verb::Clean];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Start => "start",
            Verb::Stop => "stop",
            Verb::Clean => "clean",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node's lifecycle scope: a data directory plus the suffix that keeps
/// its operation names apart from other instances in the same run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    data_dir: PathBuf,
    suffix: String,
    label: String,
}

impl Instance {
    /// An empty suffix denotes the default instance.
    ///
    /// # Errors
    /// `Validation` if `data_dir` is empty.
    pub fn new(data_dir: impl AsRef<Path>, suffix: &str) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        if data_dir.as_os_str().is_empty() {
            return Err(Error::Validation(
                "Instance data directory cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            suffix: suffix.to_string(),
            label: String::new(),
        })
    }

    /// Insert `label` between the verb and the suffix, e.g. `startBitcoindA`.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_default(&self) -> bool {
        self.suffix.is_empty()
    }

    pub fn operation_name(&self, verb: Verb) -> String {
        format!("{}{}{}", verb.as_str(), self.label, self.suffix)
    }

    /// Names for start, stop and clean, in that order.
    pub fn operation_names(&self) -> [String; 3] {
        Verb::ALL.map(|verb| self.operation_name(verb))
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "{} (default)", self.data_dir.display())
        } else {
            write!(f, "{} ({})", self.data_dir.display(), self.suffix)
        }
    }
}

/// Parses `DIR` or `DIR=SUFFIX`; the last `=` separates the suffix.
impl FromStr for Instance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.rsplit_once('=') {
            Some((dir, suffix)) => Self::new(dir, suffix),
            None => Self::new(s, ""),
        }
    }
}
