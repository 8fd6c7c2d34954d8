//! Entity categories and their TTL tiers.

use crate::CacheError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Expiry tier. Every category is bound to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlTier {
    /// 5 minutes: orders, order lists, sessions.
    Short,
    /// 30 minutes: users, menus, items, search results.
    Medium,
    /// 1 hour: restaurants, restaurant lists, analytics.
    Long,
    /// 24 hours: aggregate stats.
    Daily,
}

impl TtlTier {
    /// TTL in seconds.
    #[must_use]
    pub const fn seconds(self) -> u64 {
        match self {
            Self::Short => 300,
            Self::Medium => 1800,
            Self::Long => 3600,
            Self::Daily => 86_400,
        }
    }

    /// TTL as a Duration.
    #[must_use]
    pub const fn duration(self) -> Duration {
        Duration::from_secs(self.seconds())
    }
}

/// Cached entity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheCategory {
    User,
    Restaurant,
    RestaurantList,
    Menu,
    Item,
    Order,
    OrderList,
    Analytics,
    Session,
    Search,
    Stats,
}

impl CacheCategory {
    /// Every category, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::User,
        Self::Restaurant,
        Self::RestaurantList,
        Self::Menu,
        Self::Item,
        Self::Order,
        Self::OrderList,
        Self::Analytics,
        Self::Session,
        Self::Search,
        Self::Stats,
    ];

    /// Category name as used in configuration and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Restaurant => "restaurant",
            Self::RestaurantList => "restaurant-list",
            Self::Menu => "menu",
            Self::Item => "item",
            Self::Order => "order",
            Self::OrderList => "order-list",
            Self::Analytics => "analytics",
            Self::Session => "session",
            Self::Search => "search",
            Self::Stats => "stats",
        }
    }

    /// First key segment. List categories share their parent's namespace.
    #[must_use]
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Restaurant | Self::RestaurantList => "restaurant",
            Self::Menu => "menu",
            Self::Item => "item",
            Self::Order | Self::OrderList => "order",
            Self::Analytics => "analytics",
            Self::Session => "session",
            Self::Search => "search",
            Self::Stats => "stats",
        }
    }

    /// List categories only ever hold `<namespace>:list:<query>` keys.
    #[must_use]
    pub const fn is_list(self) -> bool {
        matches!(self, Self::RestaurantList | Self::OrderList)
    }

    /// Categories whose list keys go stale when one entity changes.
    #[must_use]
    pub const fn has_list_dependents(self) -> bool {
        matches!(self, Self::Restaurant | Self::Analytics)
    }

    /// The fixed TTL tier of this category.
    #[must_use]
    pub const fn tier(self) -> TtlTier {
        match self {
            Self::Order | Self::OrderList | Self::Session => TtlTier::Short,
            Self::User | Self::Menu | Self::Item | Self::Search => TtlTier::Medium,
            Self::Restaurant | Self::RestaurantList | Self::Analytics => TtlTier::Long,
            Self::Stats => TtlTier::Daily,
        }
    }

    /// TTL in seconds for entries of this category.
    #[must_use]
    pub const fn ttl_seconds(self) -> u64 {
        self.tier().seconds()
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheCategory {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == wanted)
            .ok_or_else(|| CacheError::UnknownCategory(s.to_string()))
    }
}
