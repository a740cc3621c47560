//! Deterministic names for artifacts and run directories.
//!
//! The name of an artifact directory is the only record of a finished build,
//! and run directories are named after everything that distinguishes a run.
//! Both can be parsed back, which is how aggregation learns what a directory
//! contains. The eviction width is not part of any name.

use crate::{matrix::Strategy, oram::EngineVariant, oram::OramParameterVector};
use orambench_ingest::size::{format_size, parse_size_str, SizeParseError};
use std::{fmt, path::Path};
use thiserror::Error;

/// prefix of every run directory
pub const RUN_DIR_PREFIX: &str = "Recsys_Sim";

const ARTIFACT_FIELDS: usize = 6;
const RUN_FIELDS: usize = 7 + ARTIFACT_FIELDS;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NamingError {
    #[error("Unknown engine variant '{0}'")]
    UnknownVariant(String),
    #[error("Unknown strategy '{0}'")]
    UnknownStrategy(String),
    #[error("'{name}' is not a valid {kind} name: {reason}")]
    Malformed {
        kind: &'static str,
        name: String,
        reason: String,
    },
    #[error("Field '{field}' of '{name}' is not a size")]
    Size {
        name: String,
        field: &'static str,
        #[source]
        source: SizeParseError,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn from_vector(vector: &OramParameterVector) -> Self {
        let page_term = if vector.levels_per_page > 1 {
            format!("{}B", vector.effective_page_size())
        } else {
            format_size(vector.page_size)
        };

        Self(format!(
            "{}-{}-{}B-{}-{}-{}",
            vector.variant,
            format_size(vector.num_entries),
            vector.entry_size,
            page_term,
            format_size(vector.position_map_size),
            vector.crypto_module.to_lowercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for ArtifactId {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// The fields an artifact name carries
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedArtifactId {
    pub id: ArtifactId,
    pub variant: EngineVariant,
    pub num_entries: u64,
    pub entry_size: u64,
    /// page size, or bucket size for variants packing several levels per page
    pub page_term: u64,
    pub position_map_size: u64,
    pub encryption: String,
}

fn size_field(name: &str, field: &'static str, value: &str) -> Result<u64, NamingError> {
    parse_size_str(value).map_err(|source| NamingError::Size {
        name: name.to_owned(),
        field,
        source,
    })
}

impl ParsedArtifactId {
    pub fn parse(name: &str) -> Result<Self, NamingError> {
        let fields: Vec<&str> = name.split('-').collect();

        let [variant, entries, entry_size, page_term, position_map, encryption] = fields[..] else {
            return Err(NamingError::Malformed {
                kind: "artifact",
                name: name.to_owned(),
                reason: format!("expected {ARTIFACT_FIELDS} fields, found {}", fields.len()),
            });
        };

        Ok(Self {
            id: ArtifactId(name.to_owned()),
            variant: variant.parse()?,
            num_entries: size_field(name, "entries", entries)?,
            entry_size: size_field(name, "entry size", entry_size)?,
            page_term: size_field(name, "page size", page_term)?,
            position_map_size: size_field(name, "position map size", position_map)?,
            // old artifacts were built with a misspelled cipher label
            encryption: encryption.replace("ageis", "aegis"),
        })
    }
}

/// Everything that distinguishes one run, rendered as its directory name
#[derive(Clone, Debug, PartialEq)]
pub struct RunDirName {
    pub size: String,
    pub strategy: Strategy,
    pub dataset: String,
    pub samples_per_round: u64,
    pub num_rounds: u64,
    pub artifact: ArtifactId,
    pub buffer: String,
    pub epsilon: f64,
}

/// `f64` display without exponent. Unscaled whole budgets are written as
/// integers, everything else keeps a decimal point, matching the directories
/// existing runs left behind.
fn format_epsilon(strategy: Strategy, epsilon: f64) -> String {
    let text = epsilon.to_string();

    if text.contains('.') || (strategy.whole_budget() && epsilon == strategy.base_epsilon()) {
        text
    } else {
        format!("{text}.0")
    }
}

impl fmt::Display for RunDirName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{RUN_DIR_PREFIX}-{}-{}-{}-{}-{}-{}-{}-{}",
            self.size,
            self.strategy,
            self.dataset,
            self.samples_per_round,
            self.num_rounds,
            self.artifact,
            self.buffer,
            format_epsilon(self.strategy, self.epsilon)
        )
    }
}

impl RunDirName {
    pub fn parse(name: &str) -> Result<Self, NamingError> {
        let malformed = |reason: String| NamingError::Malformed {
            kind: "run directory",
            name: name.to_owned(),
            reason,
        };

        let rest = name
            .strip_prefix(RUN_DIR_PREFIX)
            .and_then(|rest| rest.strip_prefix('-'))
            .ok_or_else(|| malformed(format!("missing '{RUN_DIR_PREFIX}-' prefix")))?;

        let fields: Vec<&str> = rest.split('-').collect();
        if fields.len() != RUN_FIELDS {
            return Err(malformed(format!(
                "expected {RUN_FIELDS} fields, found {}",
                fields.len()
            )));
        }

        let artifact = fields[5..5 + ARTIFACT_FIELDS].join("-");
        ParsedArtifactId::parse(&artifact)?;

        Ok(Self {
            size: fields[0].to_owned(),
            strategy: fields[1].parse()?,
            dataset: fields[2].to_owned(),
            samples_per_round: size_field(name, "samples per round", fields[3])?,
            num_rounds: size_field(name, "rounds", fields[4])?,
            artifact: ArtifactId(artifact),
            buffer: fields[11].to_owned(),
            epsilon: fields[12]
                .parse()
                .map_err(|_| malformed(format!("epsilon '{}' is not a number", fields[12])))?,
        })
    }
}
