use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::addr::TaskAddr;
use crate::error::ProvisionerError;
use crate::reconcile::DynTask;
use crate::task::Task;

/// The declared tasks of one run, keyed by address.
#[derive(Default)]
pub struct TaskGraph {
    nodes: Vec<Arc<dyn DynTask>>,
    index: HashMap<TaskAddr, usize>,
}

/// A validated graph: dependency edges plus a topological order.
pub(crate) struct ExecutionOrder {
    /// Node indices, dependencies before dependents.
    pub order: Vec<usize>,
    pub dependencies: Vec<Vec<usize>>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a task. Addresses must be unique.
    pub fn add<T: Task>(&mut self, task: T) -> Result<TaskAddr, ProvisionerError> {
        let addr = Task::addr(&task).clone();
        if self.index.contains_key(&addr) {
            return Err(ProvisionerError::DuplicateTask(addr));
        }
        self.index.insert(addr.clone(), self.nodes.len());
        self.nodes.push(Arc::new(task));
        Ok(addr)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, addr: &TaskAddr) -> bool {
        self.index.contains_key(addr)
    }

    /// Addresses in declaration order.
    pub fn addrs(&self) -> impl Iterator<Item = &TaskAddr> {
        self.nodes.iter().map(|n| n.addr())
    }

    /// Addresses in execution order. Fails on unknown references or cycles.
    pub fn execution_order(&self) -> Result<Vec<TaskAddr>, ProvisionerError> {
        let order = self.validate()?;
        Ok(order
            .order
            .iter()
            .map(|&i| self.nodes[i].addr().clone())
            .collect())
    }

    pub(crate) fn node(&self, index: usize) -> &Arc<dyn DynTask> {
        &self.nodes[index]
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = &Arc<dyn DynTask>> {
        self.nodes.iter()
    }

    /// Kahn's algorithm over reference edges. Ties go to declaration order,
    /// so the same graph always yields the same order.
    pub(crate) fn validate(&self) -> Result<ExecutionOrder, ProvisionerError> {
        let n = self.nodes.len();

        let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            for reference in node.references() {
                let Some(&j) = self.index.get(&reference) else {
                    return Err(ProvisionerError::UnknownReference {
                        addr: node.addr().clone(),
                        reference,
                    });
                };
                if !dependencies[i].contains(&j) {
                    dependencies[i].push(j);
                }
            }
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, deps) in dependencies.iter().enumerate() {
            for &j in deps {
                dependents[j].push(i);
            }
        }

        let mut remaining: Vec<usize> = dependencies.iter().map(Vec::len).collect();
        let mut ready: VecDeque<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(i) = ready.pop_front() {
            order.push(i);
            for &d in &dependents[i] {
                remaining[d] -= 1;
                if remaining[d] == 0 {
                    ready.push_back(d);
                }
            }
        }

        if order.len() < n {
            let tasks = (0..n)
                .filter(|&i| remaining[i] > 0)
                .map(|i| self.nodes[i].addr().clone())
                .collect();
            return Err(ProvisionerError::DependencyCycle { tasks });
        }

        Ok(ExecutionOrder {
            order,
            dependencies,
        })
    }
}
