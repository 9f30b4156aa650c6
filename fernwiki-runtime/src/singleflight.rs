//! Render de-duplication: at most one concurrent render per fingerprint.
//!
//! The first caller for a fingerprint renders; everyone else blocks on the
//! flight's condvar and observes the same result as a cache hit.

use crate::display::DisplayResult;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;

struct Flight {
    result: Mutex<Option<DisplayResult>>,
    done: Condvar,
}

#[derive(Default)]
pub(crate) struct SingleFlight {
    inflight: Mutex<HashMap<String, Arc<Flight>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `render` for the fingerprint, or wait for the caller already
    /// running it. Followers get the leader's result marked `from_cache`.
    pub fn run<F>(&self, fingerprint: &str, render: F) -> DisplayResult
    where
        F: FnOnce() -> DisplayResult,
    {
        let (flight, leader) = {
            let mut inflight = self.inflight.lock();
            match inflight.get(fingerprint) {
                Some(flight) => (Arc::clone(flight), false),
                None => {
                    let flight = Arc::new(Flight {
                        result: Mutex::new(None),
                        done: Condvar::new(),
                    });
                    inflight.insert(fingerprint.to_string(), Arc::clone(&flight));
                    (flight, true)
                }
            }
        };

        if !leader {
            let mut result = flight.result.lock();
            while result.is_none() {
                flight.done.wait(&mut result);
            }
            return result
                .clone()
                .expect("flight result is set before notify")
                .mark_from_cache();
        }

        let outcome = render();
        *flight.result.lock() = Some(outcome.clone());
        flight.done.notify_all();
        self.inflight.lock().remove(fingerprint);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DisplayRedirect, DisplayResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn result() -> DisplayResult {
        DisplayResult::Redirect(DisplayRedirect {
            redirect: "/x".to_string(),
        })
    }

    #[test]
    fn test_single_caller_renders() {
        let flights = SingleFlight::new();
        let mut ran = false;
        flights.run("a:1", || {
            ran = true;
            result()
        });
        assert!(ran);
    }

    #[test]
    fn test_concurrent_callers_share_one_render() {
        let flights = Arc::new(SingleFlight::new());
        let renders = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flights = Arc::clone(&flights);
                let renders = Arc::clone(&renders);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    flights.run("page:1", || {
                        renders.fetch_add(1, Ordering::SeqCst);
                        // hold the flight open long enough for followers
                        std::thread::sleep(std::time::Duration::from_millis(50));
                        result()
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // distinct fingerprints may render again later, but within the
        // overlap window there was exactly one render
        assert_eq!(renders.load(Ordering::SeqCst), 1);
    }
}
