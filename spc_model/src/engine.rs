//! Engine Registry
//!
//! The closed set of database engines a data source can target, and the one
//! table holding each engine's label and default port. Adding an engine means
//! a new variant, a new [`ENGINES`] entry, and a new connector branch on the
//! server; every dispatch site is an exhaustive `match`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Engine {
    #[default]
    Mssql,
    Postgres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSpec {
    pub engine: Engine,
    pub label: &'static str,
    pub default_port: u16,
}

pub const ENGINES: &[EngineSpec] = &[
    EngineSpec {
        engine: Engine::Mssql,
        label: "Microsoft SQL Server",
        default_port: 1433,
    },
    EngineSpec {
        engine: Engine::Postgres,
        label: "PostgreSQL",
        default_port: 5432,
    },
];

impl Engine {
    pub fn spec(&self) -> &'static EngineSpec {
        match self {
            Engine::Mssql => &ENGINES[0],
            Engine::Postgres => &ENGINES[1],
        }
    }

    pub fn default_port(&self) -> u16 {
        self.spec().default_port
    }

    pub fn label(&self) -> &'static str {
        self.spec().label
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Mssql => "MSSQL",
            Engine::Postgres => "POSTGRES",
        }
    }

    pub fn all() -> impl Iterator<Item = Engine> {
        ENGINES.iter().map(|spec| spec.engine)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEngine(pub String);

impl std::fmt::Display for UnknownEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\" is not a valid choice.", self.0)
    }
}

impl std::error::Error for UnknownEngine {}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Engine {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MSSQL" => Ok(Engine::Mssql),
            "POSTGRES" => Ok(Engine::Postgres),
            _ => Err(UnknownEngine(s.to_string())),
        }
    }
}

impl TryFrom<String> for Engine {
    type Error = UnknownEngine;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
