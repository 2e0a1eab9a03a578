//! Version descriptor ("model string") parsing.
//!
//! Cabinets identify themselves with `GAME:DEST:SPEC:REV:EXT`, for example
//! `LDJ:J:A:A:2020092900`. Only the three-character game code is required.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Empty model string")]
    Empty,
    #[error("Invalid game code: {0}")]
    InvalidGame(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Model {
    /// Three-character game code.
    pub game: String,
    /// Region/destination.
    pub dest: Option<String>,
    pub spec: Option<String>,
    pub rev: Option<String>,
    /// Date-like build number used to pick a version.
    pub ext: Option<u64>,
}

impl Model {
    pub fn new(game: impl Into<String>) -> Self {
        Self {
            game: game.into(),
            dest: None,
            spec: None,
            rev: None,
            ext: None,
        }
    }

    pub fn with_ext(mut self, ext: u64) -> Self {
        self.ext = Some(ext);
        self
    }
}

impl FromStr for Model {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ModelError::Empty);
        }

        let mut parts = s.split(':');
        let game = parts.next().unwrap_or_default();
        if game.chars().count() != 3 {
            return Err(ModelError::InvalidGame(game.to_string()));
        }

        let mut token = || parts.next().filter(|t| !t.is_empty()).map(str::to_string);
        let dest = token();
        let spec = token();
        let rev = token();
        let ext = token().and_then(|t| t.parse().ok());

        Ok(Self {
            game: game.to_string(),
            dest,
            spec,
            rev,
            ext,
        })
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ext = self.ext.map(|e| e.to_string());
        let fields = [&self.dest, &self.spec, &self.rev, &ext];
        let used = fields.iter().rposition(|field| field.is_some()).map_or(0, |i| i + 1);

        f.write_str(&self.game)?;
        for field in &fields[..used] {
            write!(f, ":{}", field.as_deref().unwrap_or(""))?;
        }
        Ok(())
    }
}
