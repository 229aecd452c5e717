//! Walking independent chains on a pool of threads.
use std::thread;

use crossbeam_channel as chan;

use crate::fetch::{self, ChainEntry, Fetcher};
use crate::ledger::ChainId;

/// Result of walking one chain.
pub type Walk<E> = Result<Vec<ChainEntry>, fetch::Error<E>>;

/// Walk job sent to a worker thread.
struct Task {
    /// Position of the chain in the caller's list.
    index: usize,
    chain: ChainId,
}

/// Worker response.
struct TaskResult<E> {
    index: usize,
    result: Walk<E>,
}

/// A worker that walks chains until the task queue is drained.
struct Worker<'a, F: Fetcher + ?Sized> {
    id: usize,
    fetcher: &'a F,
    tasks: chan::Receiver<Task>,
    results: chan::Sender<TaskResult<F::Error>>,
}

impl<'a, F: Fetcher + ?Sized> Worker<'a, F> {
    fn run(self) {
        while let Ok(task) = self.tasks.recv() {
            self.process(task);
        }
        log::trace!(target: "worker", "Worker#{} exiting: task queue drained", self.id);
    }

    fn process(&self, Task { index, chain }: Task) {
        log::debug!(target: "worker", "Worker#{} walking chain {chain}..", self.id);

        let result = fetch::chain_entries(self.fetcher, &chain);
        if let Err(e) = &result {
            log::debug!(target: "worker", "Worker#{} failed to walk chain {chain}: {e}", self.id);
        }
        if self.results.send(TaskResult { index, result }).is_err() {
            log::error!(target: "worker", "Unable to report walk result: result channel disconnected");
        }
    }
}

/// A bounded pool of threads walking chains.
#[derive(Debug, Clone, Copy)]
pub struct Pool {
    capacity: usize,
}

impl Pool {
    /// Create a pool of `capacity` threads. A capacity of zero or one walks
    /// on the caller's thread.
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Walk every chain in `chains`, returning the results in the same
    /// order. Each chain is walked by a single thread.
    pub fn walk<F>(&self, fetcher: &F, chains: &[ChainId]) -> Vec<Walk<F::Error>>
    where
        F: Fetcher + Sync + ?Sized,
    {
        let capacity = self.capacity.min(chains.len());
        if capacity <= 1 {
            return chains
                .iter()
                .map(|c| fetch::chain_entries(fetcher, c))
                .collect();
        }

        let (task_send, task_recv) = chan::unbounded::<Task>();
        let (result_send, result_recv) = chan::unbounded::<TaskResult<F::Error>>();

        for (index, chain) in chains.iter().enumerate() {
            // The receiver is alive until the end of this function.
            let _ = task_send.send(Task {
                index,
                chain: *chain,
            });
        }
        drop(task_send);

        thread::scope(|s| {
            for id in 0..capacity {
                let worker = Worker {
                    id,
                    fetcher,
                    tasks: task_recv.clone(),
                    results: result_send.clone(),
                };
                s.spawn(move || worker.run());
            }
        });
        drop(result_send);

        let mut slots: Vec<Option<Walk<F::Error>>> = chains.iter().map(|_| None).collect();
        for TaskResult { index, result } in result_recv.iter() {
            slots[index] = Some(result);
        }
        slots.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::fetch::InMemory;
    use crate::ledger::Entry;
    use crate::test::fixtures::chain;

    fn ledger(chains: &[ChainId]) -> InMemory {
        let mut ledger = InMemory::default();
        for round in 0..3u8 {
            ledger.seal(
                chains
                    .iter()
                    .map(|c| Entry::new(*c, vec![vec![0], vec![round]], vec![])),
            );
        }
        ledger
    }

    #[test]
    fn test_walk_preserves_order() {
        let chains: Vec<_> = (0..9).map(|i| chain(&format!("chain-{i}"))).collect();
        let ledger = ledger(&chains);

        let sequential = Pool::new(1).walk(&ledger, &chains);
        let concurrent = Pool::new(4).walk(&ledger, &chains);

        assert_eq!(concurrent.len(), chains.len());
        for ((c, a), b) in chains.iter().zip(&sequential).zip(&concurrent) {
            let a = a.as_ref().unwrap();
            let b = b.as_ref().unwrap();

            assert_eq!(a, b);
            assert_eq!(a.len(), 3);
            assert!(b.iter().all(|e| e.entry.chain == *c));
        }
    }

    #[test]
    fn test_walk_reports_failures_per_chain() {
        let chains = [chain("a"), chain("b"), chain("c")];
        let mut ledger = ledger(&chains);
        let head = ledger.blocks(&chains[1])[0];
        ledger.remove_block(&head);

        let results = Pool::new(3).walk(&ledger, &chains);

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert_eq!(ledger.walks(&chains[1]), 1);
    }

    #[test]
    fn test_walk_stops_on_looping_chain() {
        let chains = [chain("a"), chain("b")];
        let mut ledger = ledger(&chains);
        let blocks = ledger.blocks(&chains[0]);
        let mut genesis = ledger.block(&blocks[2]).unwrap();
        genesis.prev = blocks[0];
        ledger.insert_block(genesis);

        let results = Pool::new(2).walk(&ledger, &chains);

        assert!(matches!(
            &results[0],
            Err(fetch::Error::Cycle { chain, block }) if *chain == chains[0] && *block == blocks[0]
        ));
        assert_eq!(results[1].as_ref().unwrap().len(), 3);
    }

    #[test]
    fn test_walk_nothing() {
        let ledger = InMemory::default();

        assert!(Pool::new(8).walk(&ledger, &[]).is_empty());
    }
}
