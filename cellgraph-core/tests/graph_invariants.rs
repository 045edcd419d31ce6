//! Graph Invariant Property Tests
//!
//! Drives the runtime with arbitrary sequences of create, write, run, stop
//! and flush operations over cells, derived values, a reactive list and a
//! reactive map, and checks after every step that:
//!
//! - every link sits on both its producer's and its subscriber's list
//! - the live link count equals the dependencies of live subscribers
//! - container key nodes exist only while a live effect reads the key
//! - stopped effects hold no links and never run again
//! - after a flush, every live effect has seen the current values
//! - an effect allowed to recurse runs at most twice per flush
//! - dropping every handle empties the graph

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

use cellgraph_core::collections::{ReactiveMap, ReactiveVec};
use cellgraph_core::graph::scheduler::flush;
use cellgraph_core::reactive::{Effect, EffectOptions, Memo, Runtime, Signal};
use proptest::prelude::*;

const CELLS: usize = 4;
const KEYS: usize = 4;

/// Graph operation for property testing
#[derive(Debug, Clone)]
enum GraphOp {
    /// An effect reading `sources[0]`, then the rest if that value is even,
    /// then optionally every derived value existing at creation.
    CreateEffect { sources: Vec<usize>, read_derived: bool },
    /// A derived value summing its sources.
    CreateDerived { sources: Vec<usize> },
    /// An effect allowed to recurse: reads a cell and bumps its own counter.
    CreateRecursing { cell: usize },
    Write { cell: usize, value: i32 },
    Container(ContainerOp),
    Run { index: usize },
    Stop { index: usize },
    Flush,
}

/// Reads and writes on the shared list and map.
#[derive(Debug, Clone)]
enum ContainerOp {
    ReadList { index: usize, read_len: bool },
    ReadMap { key: usize },
    Push { value: i32 },
    Set { index: usize, value: i32 },
    Pop,
    Insert { key: usize, value: i32 },
    Remove { key: usize },
}

fn arb_container_op() -> impl Strategy<Value = ContainerOp> {
    prop_oneof![
        2 => (0..KEYS, any::<bool>()).prop_map(|(index, read_len)| ContainerOp::ReadList { index, read_len }),
        2 => (0..KEYS).prop_map(|key| ContainerOp::ReadMap { key }),
        2 => (-3i32..4).prop_map(|value| ContainerOp::Push { value }),
        2 => (0..KEYS + 2, -3i32..4).prop_map(|(index, value)| ContainerOp::Set { index, value }),
        1 => Just(ContainerOp::Pop),
        2 => (0..KEYS, -3i32..4).prop_map(|(key, value)| ContainerOp::Insert { key, value }),
        1 => (0..KEYS).prop_map(|key| ContainerOp::Remove { key }),
    ]
}

/// Generate random graph operations
fn arb_graph_op() -> impl Strategy<Value = GraphOp> {
    prop_oneof![
        3 => (prop::collection::vec(0..CELLS, 1..4), any::<bool>())
            .prop_map(|(sources, read_derived)| GraphOp::CreateEffect { sources, read_derived }),
        1 => prop::collection::vec(0..CELLS, 1..3).prop_map(|sources| GraphOp::CreateDerived { sources }),
        1 => (0..CELLS).prop_map(|cell| GraphOp::CreateRecursing { cell }),
        4 => (0..CELLS, -3i32..4).prop_map(|(cell, value)| GraphOp::Write { cell, value }),
        4 => arb_container_op().prop_map(GraphOp::Container),
        1 => any::<usize>().prop_map(|index| GraphOp::Run { index }),
        2 => any::<usize>().prop_map(|index| GraphOp::Stop { index }),
        2 => Just(GraphOp::Flush),
    ]
}

/// A container key an effect depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum KeyRead {
    ListIndex(usize),
    ListLength,
    MapKey(usize),
}

struct Harness {
    cells: Vec<Signal<i32>>,
    derived: Vec<(Memo<i64>, Vec<usize>)>,
    list: ReactiveVec<i32>,
    map: ReactiveMap<usize, i32>,
    effects: Vec<TrackedEffect>,
}

struct TrackedEffect {
    effect: Effect,
    observed: Rc<Cell<i64>>,
    runs: Rc<Cell<usize>>,
    runs_when_stopped: Option<usize>,
    /// Recomputes what the effect should have observed; `None` for effects
    /// whose output is not checked.
    expected: Option<Box<dyn Fn() -> i64>>,
    keys: Vec<KeyRead>,
    /// Private counter of a recursing effect.
    counter: Option<Signal<i64>>,
}

fn effect_total(cells: &[Signal<i32>], sources: &[usize], derived: &[i64]) -> i64 {
    let gate = cells[sources[0]].get();
    let mut total = i64::from(gate);
    if gate % 2 == 0 {
        for &source in &sources[1..] {
            total += i64::from(cells[source].get());
        }
    }
    total + derived.iter().sum::<i64>()
}

fn list_total(list: &ReactiveVec<i32>, index: usize, read_len: bool) -> i64 {
    let item = list.get(index).map_or(-10, i64::from);
    if read_len {
        item + 100 * list.len() as i64
    } else {
        item
    }
}

fn map_total(map: &ReactiveMap<usize, i32>, key: usize) -> i64 {
    let value = map.get(&key).map_or(-10, i64::from);
    if map.contains_key(&key) {
        value + 1_000
    } else {
        value
    }
}

impl Harness {
    fn new() -> Self {
        Self {
            cells: (0..CELLS).map(|i| Signal::new(i as i32)).collect(),
            derived: Vec::new(),
            list: ReactiveVec::new(vec![1, 2]),
            map: [(0, 5), (2, 7)].into_iter().collect(),
            effects: Vec::new(),
        }
    }

    /// Track an effect whose body stores `read()` and whose expectation is
    /// `expected()`.
    fn observe(
        &mut self,
        read: impl Fn() -> i64 + 'static,
        expected: Box<dyn Fn() -> i64>,
        keys: Vec<KeyRead>,
    ) {
        let observed = Rc::new(Cell::new(0));
        let runs = Rc::new(Cell::new(0));
        let (observed_clone, runs_clone) = (observed.clone(), runs.clone());
        let effect = Effect::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            observed_clone.set(read());
        });
        self.effects.push(TrackedEffect {
            effect,
            observed,
            runs,
            runs_when_stopped: None,
            expected: Some(expected),
            keys,
            counter: None,
        });
    }

    fn apply(&mut self, op: &GraphOp) -> Result<(), TestCaseError> {
        match op {
            GraphOp::CreateEffect { sources, read_derived } => {
                let (memos, derived): (Vec<Memo<i64>>, Vec<Vec<usize>>) = if *read_derived {
                    self.derived.iter().cloned().unzip()
                } else {
                    (Vec::new(), Vec::new())
                };
                let cells = self.cells.clone();
                let body_sources = sources.clone();
                let read = move || {
                    let values: Vec<i64> = memos.iter().map(Memo::get).collect();
                    effect_total(&cells, &body_sources, &values)
                };
                let cells = self.cells.clone();
                let sources = sources.clone();
                let expected = move || {
                    let values: Vec<i64> = derived
                        .iter()
                        .map(|sources| sources.iter().map(|&i| i64::from(cells[i].get_untracked())).sum())
                        .collect();
                    effect_total(&cells, &sources, &values)
                };
                self.observe(read, Box::new(expected), Vec::new());
            }
            GraphOp::CreateDerived { sources } => {
                let cells = self.cells.clone();
                let body_sources = sources.clone();
                let memo = Memo::new(move || body_sources.iter().map(|&i| i64::from(cells[i].get())).sum());
                self.derived.push((memo, sources.clone()));
            }
            GraphOp::CreateRecursing { cell } => {
                let counter = Signal::new(0i64);
                let runs = Rc::new(Cell::new(0));
                let (source, count, runs_clone) = (self.cells[*cell].clone(), counter.clone(), runs.clone());
                let effect = Effect::with_options(
                    move || {
                        runs_clone.set(runs_clone.get() + 1);
                        source.get();
                        count.set(count.get() + 1);
                    },
                    EffectOptions {
                        allow_recurse: true,
                        ..EffectOptions::default()
                    },
                );
                self.effects.push(TrackedEffect {
                    effect,
                    observed: Rc::new(Cell::new(0)),
                    runs,
                    runs_when_stopped: None,
                    expected: None,
                    keys: Vec::new(),
                    counter: Some(counter),
                });
            }
            GraphOp::Write { cell, value } => {
                self.cells[*cell].set(*value);
            }
            GraphOp::Container(op) => self.apply_container(op),
            GraphOp::Run { index } => {
                if let Some(tracked) = self.pick(*index) {
                    tracked.effect.run();
                }
            }
            GraphOp::Stop { index } => {
                if let Some(tracked) = self.pick(*index) {
                    tracked.effect.stop();
                    tracked.runs_when_stopped.get_or_insert(tracked.runs.get());
                }
            }
            GraphOp::Flush => {
                let before: Vec<usize> = self.effects.iter().map(|t| t.runs.get()).collect();
                flush().map_err(|err| TestCaseError::fail(err.to_string()))?;
                for (tracked, before) in self.effects.iter().zip(before) {
                    if tracked.counter.is_some() {
                        prop_assert!(tracked.runs.get() - before <= 2);
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_container(&mut self, op: &ContainerOp) {
        match *op {
            ContainerOp::ReadList { index, read_len } => {
                let list = self.list.clone();
                let check = self.list.clone();
                let mut keys = vec![KeyRead::ListIndex(index)];
                if read_len {
                    keys.push(KeyRead::ListLength);
                }
                self.observe(
                    move || list_total(&list, index, read_len),
                    Box::new(move || list_total(&check, index, read_len)),
                    keys,
                );
            }
            ContainerOp::ReadMap { key } => {
                let map = self.map.clone();
                let check = self.map.clone();
                self.observe(
                    move || map_total(&map, key),
                    Box::new(move || map_total(&check, key)),
                    vec![KeyRead::MapKey(key)],
                );
            }
            ContainerOp::Push { value } => self.list.push(value),
            ContainerOp::Set { index, value } => {
                self.list.set(index, value);
            }
            ContainerOp::Pop => {
                self.list.pop();
            }
            ContainerOp::Insert { key, value } => {
                self.map.insert(key, value);
            }
            ContainerOp::Remove { key } => {
                self.map.remove(&key);
            }
        }
    }

    fn pick(&mut self, index: usize) -> Option<&mut TrackedEffect> {
        if self.effects.is_empty() {
            return None;
        }
        let len = self.effects.len();
        self.effects.get_mut(index % len)
    }

    fn live_links(&self) -> usize {
        let effects: usize = self.effects.iter().map(|t| t.effect.dependency_count()).sum();
        let memos: usize = self.derived.iter().map(|(memo, _)| memo.dependency_count()).sum();
        effects + memos
    }

    fn live_subscribers(&self) -> usize {
        self.effects.iter().filter(|t| t.effect.is_active()).count() + self.derived.len()
    }

    /// Signals, memo outputs and the container keys live effects read.
    fn live_nodes(&self) -> usize {
        let counters = self.effects.iter().filter(|t| t.counter.is_some()).count();
        let keys: HashSet<KeyRead> = self
            .effects
            .iter()
            .filter(|t| t.effect.is_active())
            .flat_map(|t| t.keys.iter().copied())
            .collect();
        CELLS + self.derived.len() + counters + keys.len()
    }

    fn check(&self, flushed: bool) -> Result<(), TestCaseError> {
        let stats = Runtime::verify_graph().map_err(|err| TestCaseError::fail(err.to_string()))?;
        prop_assert_eq!(stats.links, self.live_links());
        prop_assert_eq!(stats.subscribers, self.live_subscribers());
        prop_assert_eq!(stats.nodes, self.live_nodes());

        for tracked in &self.effects {
            match (tracked.runs_when_stopped, &tracked.expected) {
                (Some(runs), _) => {
                    prop_assert_eq!(tracked.effect.dependency_count(), 0);
                    prop_assert_eq!(tracked.runs.get(), runs);
                }
                (None, Some(expected)) if flushed => {
                    prop_assert_eq!(tracked.observed.get(), expected());
                }
                _ => {}
            }
        }
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Link symmetry, link and node accounting, and effect freshness hold
    /// after every operation.
    #[test]
    fn graph_stays_consistent(ops in prop::collection::vec(arb_graph_op(), 1..60)) {
        Runtime::reset();
        let mut harness = Harness::new();

        for op in &ops {
            harness.apply(op)?;
            harness.check(matches!(op, GraphOp::Flush))?;
        }

        harness.apply(&GraphOp::Flush)?;
        harness.check(true)?;
    }

    /// Stopping everything and dropping every handle leaves an empty graph.
    #[test]
    fn dropping_everything_empties_the_graph(ops in prop::collection::vec(arb_graph_op(), 1..40)) {
        Runtime::reset();
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op)?;
        }
        flush().unwrap();

        for tracked in &harness.effects {
            tracked.effect.stop();
        }
        let stats = Runtime::stats();
        prop_assert_eq!(stats.links, 0);
        prop_assert_eq!(stats.nodes, harness.live_nodes());

        drop(harness);
        let stats = Runtime::stats();
        prop_assert_eq!(stats.links, 0);
        prop_assert_eq!(stats.subscribers, 0);
        prop_assert_eq!(stats.nodes, 0);
    }
}
