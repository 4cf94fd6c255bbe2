use super::{
    CentrifugoStrategy, GenericStrategy, NatsStrategy, PostgresStrategy, ProvisioningStrategy,
    RedisStrategy, TemporalStrategy,
};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Technologies with a dedicated strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Technology {
    Postgresql,
    Redis,
    Nats,
    Centrifugo,
    Temporal,
    /// Applications and anything without a dedicated strategy.
    Generic,
}

impl Technology {
    pub fn id(self) -> &'static str {
        match self {
            Technology::Postgresql => "postgresql",
            Technology::Redis => "redis",
            Technology::Nats => "nats",
            Technology::Centrifugo => "centrifugo",
            Technology::Temporal => "temporal",
            Technology::Generic => "generic",
        }
    }

    pub fn all() -> [Technology; 6] {
        [
            Technology::Postgresql,
            Technology::Redis,
            Technology::Nats,
            Technology::Centrifugo,
            Technology::Temporal,
            Technology::Generic,
        ]
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Technology {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Technology::Postgresql),
            "redis" | "cache" => Ok(Technology::Redis),
            "nats" | "nats-jetstream" | "queue" => Ok(Technology::Nats),
            "centrifugo" | "relay" => Ok(Technology::Centrifugo),
            "temporal" | "temporalio" | "workflow" => Ok(Technology::Temporal),
            "generic" | "application" | "app" => Ok(Technology::Generic),
            _ => Err(Error::UnknownTechnology(s.to_string())),
        }
    }
}

/// All strategies, built once per run.
pub struct StrategyRegistry {
    strategies: BTreeMap<Technology, Box<dyn ProvisioningStrategy>>,
    generic: GenericStrategy,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        let mut strategies: BTreeMap<Technology, Box<dyn ProvisioningStrategy>> = BTreeMap::new();
        strategies.insert(Technology::Postgresql, Box::new(PostgresStrategy));
        strategies.insert(Technology::Redis, Box::new(RedisStrategy));
        strategies.insert(Technology::Nats, Box::new(NatsStrategy));
        strategies.insert(Technology::Centrifugo, Box::new(CentrifugoStrategy));
        strategies.insert(Technology::Temporal, Box::new(TemporalStrategy));
        Self {
            strategies,
            generic: GenericStrategy,
        }
    }

    pub fn get(&self, technology: Technology) -> &dyn ProvisioningStrategy {
        match self.strategies.get(&technology) {
            Some(strategy) => strategy.as_ref(),
            None => &self.generic,
        }
    }

    /// Case-insensitive lookup by id or alias.
    pub fn create(&self, id: &str) -> Result<&dyn ProvisioningStrategy> {
        let technology: Technology = id.parse()?;
        Ok(self.get(technology))
    }

    /// Like [`create`](Self::create), but unknown ids get the generic strategy.
    pub fn create_or_generic(&self, id: &str) -> &dyn ProvisioningStrategy {
        match self.create(id) {
            Ok(strategy) => strategy,
            Err(_) => {
                tracing::warn!(
                    "Unknown technology '{}', falling back to the generic strategy",
                    id
                );
                &self.generic
            }
        }
    }

    /// Canonical id for known technologies; unknown ids are kept (lowercased)
    /// so the generic strategy can derive an image name from them.
    pub fn canonical_id(&self, id: &str) -> String {
        match id.parse::<Technology>() {
            Ok(technology) => technology.id().to_string(),
            Err(_) => id.trim().to_ascii_lowercase(),
        }
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
