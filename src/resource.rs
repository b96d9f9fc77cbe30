//! Process-wide resource limits (`-limit`, `-cache`).
//!
//! The wand only configures limits; it never enforces them. The registry is a
//! trait so tests can hand a wand a private instance instead of the global one.

use crate::geometry::parse_si_size;
use crate::keywords::ResourceType;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Limit {
    Unlimited,
    Amount(f64),
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Unlimited => f.write_str("unlimited"),
            Limit::Amount(v) => write!(f, "{}", format_si(*v)),
        }
    }
}

impl Limit {
    /// `unlimited` or an SI size (`256MiB`, `2G`, `50%` of 100).
    pub fn parse(text: &str) -> Option<Limit> {
        if text.trim().eq_ignore_ascii_case("unlimited") {
            return Some(Limit::Unlimited);
        }
        parse_si_size(text, 100.0).map(Limit::Amount)
    }
}

/// Human form with binary prefixes, e.g. `256MiB`.
fn format_si(value: f64) -> String {
    const UNITS: [&str; 6] = ["", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut v = value;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 && (v / 1024.0).fract() == 0.0 {
        v /= 1024.0;
        unit += 1;
    }
    format!("{v}{}", UNITS[unit])
}

/// Quota configuration service.
pub trait ResourceRegistry: Send + Sync {
    fn set_limit(&self, kind: ResourceType, limit: Limit);
    fn limit(&self, kind: ResourceType) -> Limit;
}

/// In-memory registry; the process-wide instance is [`global`].
#[derive(Debug, Default)]
pub struct LimitTable {
    limits: Mutex<HashMap<ResourceType, Limit>>,
}

impl LimitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every resource with its current limit, in `-list resource` order.
    pub fn snapshot(registry: &dyn ResourceRegistry) -> Vec<(ResourceType, Limit)> {
        ResourceType::NAMES
            .iter()
            .filter_map(|name| name.parse::<ResourceType>().ok())
            .map(|kind| (kind, registry.limit(kind)))
            .collect()
    }
}

impl ResourceRegistry for LimitTable {
    fn set_limit(&self, kind: ResourceType, limit: Limit) {
        tracing::debug!(resource = %kind, %limit, "set resource limit");
        if let Ok(mut limits) = self.limits.lock() {
            limits.insert(kind, limit);
        }
    }

    fn limit(&self, kind: ResourceType) -> Limit {
        self.limits
            .lock()
            .ok()
            .and_then(|limits| limits.get(&kind).copied())
            .unwrap_or(Limit::Unlimited)
    }
}

static GLOBAL: LazyLock<Arc<LimitTable>> = LazyLock::new(|| Arc::new(LimitTable::new()));

/// The process-wide registry.
pub fn global() -> Arc<dyn ResourceRegistry> {
    GLOBAL.clone()
}
