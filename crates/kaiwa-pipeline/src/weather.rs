use async_trait::async_trait;

/// External weather lookup.
///
/// The provider decides itself whether the turn needs weather at all;
/// `None` means "no weather context for this turn" whether because the
/// question does not involve weather or because the lookup failed. Either
/// way the turn proceeds.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// A ready-to-embed context block, e.g. current conditions at the
    /// farm's location.
    async fn lookup(&self, query: &str) -> Option<String>;
}
