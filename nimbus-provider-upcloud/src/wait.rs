//! Readiness polling for managed databases

use std::time::Duration;

use log::debug;
use tokio::time::{Instant, sleep};

use crate::client::{ApiError, ManagedDatabase, UpcloudApi};

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(
        "timed out after {timeout:?} waiting for managed database {uuid} to reach state {}",
        .states.join(" or ")
    )]
    Timeout {
        uuid: String,
        states: Vec<String>,
        timeout: Duration,
    },
}

/// Poll the database until its state is one of `states`
///
/// The database is queried at least once. Returns its details as of the
/// matching poll.
pub async fn wait_for_managed_database_state<C: UpcloudApi + ?Sized>(
    client: &C,
    uuid: &str,
    timeout: Duration,
    poll_interval: Duration,
    states: &[&str],
) -> Result<ManagedDatabase, WaitError> {
    let deadline = Instant::now() + timeout;

    loop {
        let details = client.get_managed_database(uuid).await?;
        if states.contains(&details.state.as_str()) {
            return Ok(details);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::Timeout {
                uuid: uuid.to_string(),
                states: states.iter().map(|s| s.to_string()).collect(),
                timeout,
            });
        }

        debug!(
            "managed database {} is {}, waiting for {:?}",
            uuid, details.state, states
        );
        sleep(poll_interval.min(deadline - now)).await;
    }
}
