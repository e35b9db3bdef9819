// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Request Coalescer
//!
//! Concurrent calls that share a key run the supplied future once; every
//! caller that joined while it was in flight receives a clone of the same
//! result. The group lives only as long as the call: once it resolves, the
//! next call under the key starts a fresh execution. The group is also
//! dropped when its leader is cancelled, so a half-run call is never joined
//! by a later caller.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

type SharedCall<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct Group<T, E> {
    id: u64,
    call: SharedCall<T, E>,
    joiners: Arc<AtomicUsize>,
}

pub struct Coalescer<T, E> {
    groups: Mutex<HashMap<String, Group<T, E>>>,
    next_id: AtomicU64,
}

impl<T, E> Default for Coalescer<T, E> {
    fn default() -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T, E> Coalescer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` under `key`, or join the call already in flight.
    ///
    /// Returns the result and whether it was delivered to more than one
    /// caller. `f` is only invoked when no call for `key` is in flight.
    pub async fn run<F, Fut>(&self, key: &str, f: F) -> (Result<T, E>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (id, call, joiners, leader) = {
            let mut groups = self.groups.lock();
            match groups.get(key) {
                Some(group) => {
                    group.joiners.fetch_add(1, Ordering::SeqCst);
                    (group.id, group.call.clone(), group.joiners.clone(), false)
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let call = f().boxed().shared();
                    let joiners = Arc::new(AtomicUsize::new(0));
                    groups.insert(
                        key.to_string(),
                        Group {
                            id,
                            call: call.clone(),
                            joiners: joiners.clone(),
                        },
                    );
                    (id, call, joiners, true)
                }
            }
        };

        // The leader owns the group: if it is dropped mid-call the group goes
        // with it, and callers still joined keep driving their clone.
        let guard = leader.then(|| LeaderGuard {
            coalescer: self,
            key,
            id,
        });

        let result = call.await;
        drop(guard);
        self.release(key, id);

        let shared = !leader || joiners.load(Ordering::SeqCst) > 0;
        (result, shared)
    }

    /// Drop the group for `key` if it is still the one identified by `id`.
    fn release(&self, key: &str, id: u64) {
        remove_group(&mut self.groups.lock(), key, id);
    }

    /// Number of keys with a call in flight.
    pub fn in_flight(&self) -> usize {
        self.groups.lock().len()
    }
}

struct LeaderGuard<'a, T, E> {
    coalescer: &'a Coalescer<T, E>,
    key: &'a str,
    id: u64,
}

impl<T, E> Drop for LeaderGuard<'_, T, E> {
    fn drop(&mut self) {
        remove_group(&mut self.coalescer.groups.lock(), self.key, self.id);
    }
}

fn remove_group<T, E>(groups: &mut HashMap<String, Group<T, E>>, key: &str, id: u64) {
    if groups.get(key).map(|g| g.id == id).unwrap_or(false) {
        groups.remove(key);
    }
}
