use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::store::ReconcilePolicy;

const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";

#[derive(Clone, Debug)]
pub struct Settings {
    pub port: u16,
    pub addr: SocketAddr,
    pub graphql_url: String,
    pub api_timeout: Duration,
    pub reconcile_policy: ReconcilePolicy,
}

impl Settings {
    pub fn new() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port: u16 = lookup("PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let graphql_url =
            lookup("GITHUB_GRAPHQL_URL").unwrap_or_else(|| DEFAULT_GRAPHQL_URL.to_string());

        let api_timeout = lookup("API_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let reconcile_policy = match lookup("RECONCILE_POLICY").map(|s| s.parse::<ReconcilePolicy>()) {
            Some(Ok(policy)) => policy,
            Some(Err(e)) => {
                tracing::warn!("{}; falling back to rollback", e);
                ReconcilePolicy::default()
            }
            None => ReconcilePolicy::default(),
        };

        Self {
            port,
            addr,
            graphql_url,
            api_timeout,
            reconcile_policy,
        }
    }
}
