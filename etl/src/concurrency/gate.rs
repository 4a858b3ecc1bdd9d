use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Bounds the number of requests in flight against the remote API.
///
/// A single gate is shared by every session of a process run, so concurrent sessions draw from
/// the same budget. A permit is released when it is dropped, including on error paths.
#[derive(Debug, Clone)]
pub struct ConnectionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConnectionGate {
    /// Creates a gate admitting at most `capacity` concurrent holders, never less than one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits until a slot is free and returns the permit holding it.
    pub async fn acquire(&self) -> EtlResult<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.map_err(|err| {
            etl_error!(
                ErrorKind::InvalidState,
                "Could not acquire a connection gate permit",
                err.to_string()
            )
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let gate = ConnectionGate::new(2);

        let first = gate.acquire().await.unwrap();
        let second = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);

        drop(first);
        assert_eq!(gate.available(), 1);

        drop(second);
        assert_eq!(gate.available(), gate.capacity());
    }

    #[tokio::test]
    async fn clones_share_capacity() {
        let gate = ConnectionGate::new(1);
        let other = gate.clone();

        let _permit = gate.acquire().await.unwrap();

        assert_eq!(other.available(), 0);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        assert_eq!(ConnectionGate::new(0).capacity(), 1);
    }
}
