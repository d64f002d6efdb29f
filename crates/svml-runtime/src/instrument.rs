//! Per-function instrumentation
//!
//! The compiler records, for every function it emits, the names it
//! calls and whether it stores into an outer scope. After all
//! functions exist, `analyze` derives recursion (Tarjan SCC over the
//! name-based call graph) and the memoization flags the VM consults
//! at `NEWC` time.
//!
//! Cycle detection runs only when `enable_recursion_detection` is
//! set, and its output feeds memoization only when
//! `enable_memoization` is also set.

use crate::config::CompileOptions;
use serde::Serialize;
use std::collections::BTreeSet;

/// Everything recorded about one compiled function.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionInfo {
    /// Declared name; `<main>` for the entry, `<lambda>` for lambdas.
    pub name: String,
    pub function_index: usize,
    pub parameters: Vec<String>,
    /// Names this function's body calls.
    pub calls: BTreeSet<String>,
    /// True when the function can reach itself through the call graph.
    pub is_recursive: bool,
    /// True when the VM should attach a memo cache at `NEWC`.
    pub needs_memoization: bool,
    /// True when the body stores through a parent environment; such a
    /// function cannot be proven pure and is never memoized.
    pub has_outer_store: bool,
}

impl FunctionInfo {
    pub fn new(name: impl Into<String>, function_index: usize, parameters: Vec<String>) -> Self {
        Self {
            name: name.into(),
            function_index,
            parameters,
            calls: BTreeSet::new(),
            is_recursive: false,
            needs_memoization: false,
            has_outer_store: false,
        }
    }
}

/// Instrumentation for a whole program, indexed by function index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Instrumentation {
    pub functions: Vec<FunctionInfo>,
}

impl Instrumentation {
    /// The record for a function index.
    pub fn function(&self, index: usize) -> Option<&FunctionInfo> {
        self.functions.get(index)
    }

    /// First record with the given declared name.
    pub fn lookup(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Whether closures over `index` carry a memo cache.
    pub fn needs_memoization(&self, index: usize) -> bool {
        self.functions
            .get(index)
            .is_some_and(|f| f.needs_memoization)
    }

    /// Derive `is_recursive` and `needs_memoization` per the options.
    pub fn analyze(&mut self, options: &CompileOptions) {
        if !options.enable_recursion_detection {
            return;
        }
        let cyclic = self.cyclic_functions();
        for (index, info) in self.functions.iter_mut().enumerate() {
            info.is_recursive = cyclic[index];
        }
        if !options.enable_memoization {
            return;
        }
        for info in &mut self.functions {
            info.needs_memoization = info.is_recursive
                && info.parameters.len() <= options.memo_param_threshold
                && !info.has_outer_store;
        }
    }

    /// Call-graph adjacency: function `f` has an edge to every
    /// function whose declared name `f` calls.
    fn call_edges(&self) -> Vec<Vec<usize>> {
        let n = self.functions.len();
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (from, info) in self.functions.iter().enumerate() {
            for callee in &info.calls {
                for (to, target) in self.functions.iter().enumerate() {
                    if &target.name == callee {
                        edges[from].push(to);
                    }
                }
            }
        }
        edges
    }

    fn run_tarjan(edges: &[Vec<usize>]) -> Tarjan<'_> {
        let n = edges.len();
        let mut state = Tarjan {
            edges,
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next_index: 0,
            scc_of: vec![0; n],
            scc_sizes: Vec::new(),
        };
        for v in 0..n {
            if state.index[v].is_none() {
                state.strongconnect(v);
            }
        }
        state
    }

    /// A function is cyclic when its SCC has more than one member, or
    /// it calls its own name directly.
    fn cyclic_functions(&self) -> Vec<bool> {
        let edges = self.call_edges();
        let state = Self::run_tarjan(&edges);
        (0..edges.len())
            .map(|v| state.scc_sizes[state.scc_of[v]] > 1 || edges[v].contains(&v))
            .collect()
    }

    /// Function indices grouped by strongly connected component, for
    /// inspection and tests. Singleton components are included.
    pub fn sccs(&self) -> Vec<Vec<usize>> {
        let edges = self.call_edges();
        let state = Self::run_tarjan(&edges);
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); state.scc_sizes.len()];
        for v in 0..edges.len() {
            groups[state.scc_of[v]].push(v);
        }
        groups
    }
}

struct Tarjan<'a> {
    edges: &'a [Vec<usize>],
    index: Vec<Option<u32>>,
    lowlink: Vec<u32>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: u32,
    scc_of: Vec<usize>,
    scc_sizes: Vec<usize>,
}

impl Tarjan<'_> {
    fn strongconnect(&mut self, v: usize) {
        self.index[v] = Some(self.next_index);
        self.lowlink[v] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        for &w in &self.edges[v] {
            if self.index[w].is_none() {
                self.strongconnect(w);
                self.lowlink[v] = self.lowlink[v].min(self.lowlink[w]);
            } else if self.on_stack[w] {
                self.lowlink[v] = self.lowlink[v].min(self.index[w].unwrap());
            }
        }

        if Some(self.lowlink[v]) == self.index[v] {
            let scc = self.scc_sizes.len();
            let mut size = 0;
            loop {
                let w = self.stack.pop().expect("tarjan stack");
                self.on_stack[w] = false;
                self.scc_of[w] = scc;
                size += 1;
                if w == v {
                    break;
                }
            }
            self.scc_sizes.push(size);
        }
    }
}
