//! Job discovery sources.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::traits::BaseJobSource;

pub mod himalayas;
pub mod remoteok;
pub mod weworkremotely;

pub use himalayas::HimalayasSource;
pub use remoteok::RemoteOkSource;
pub use weworkremotely::WeWorkRemotelySource;

/// HTTP client shared by the source implementations.
fn http_client(source: &str, user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .with_context(|| format!("Failed to build {} HTTP client", source))
}

/// Every source `build` knows, in default polling order.
pub const SOURCE_NAMES: &[&str] = &[
    RemoteOkSource::NAME,
    HimalayasSource::NAME,
    WeWorkRemotelySource::NAME,
];

/// Construct a source by name.
pub fn build(name: &str, user_agent: &str, timeout: Duration) -> Result<Arc<dyn BaseJobSource>> {
    let source: Arc<dyn BaseJobSource> = match name {
        RemoteOkSource::NAME => Arc::new(RemoteOkSource::new(user_agent, timeout)?),
        HimalayasSource::NAME => Arc::new(HimalayasSource::new(user_agent, timeout)?),
        WeWorkRemotelySource::NAME => Arc::new(WeWorkRemotelySource::new(user_agent, timeout)?),
        other => bail!("Unknown source {:?}", other),
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_knows_every_listed_source() {
        for name in SOURCE_NAMES {
            let source = build(name, "test-agent", Duration::from_secs(5)).unwrap();
            assert_eq!(source.name(), *name);
        }
        assert!(build("linkedin", "test-agent", Duration::from_secs(5)).is_err());
    }
}
