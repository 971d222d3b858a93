//! 依赖图与拓扑排序
//!
//! 提供一个泛型的依赖排序结构：节点携带任意值，
//! 边表示"某节点必须排在另一节点之前"。
//!
//! # 主要组件
//!
//! - [`DependencyGraph`] - 泛型依赖图，支持循环检测和拓扑排序
//! - [`CycleError`] - 排序失败时携带循环路径的错误
//!
//! # 示例
//!
//! ```rust
//! use jimu_core::module::graph::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! let engine = graph.add_node("engine");
//! let car = graph.add_node("car");
//!
//! // engine 必须排在 car 之前
//! graph.require_before(engine, car);
//!
//! let order: Vec<_> = graph.sort().unwrap().into_iter().cloned().collect();
//! assert_eq!(order, vec!["engine", "car"]);
//! ```

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

use thiserror::Error;

/// 图节点句柄
///
/// 由 [`DependencyGraph::add_node`] 返回，仅在创建它的图中有效。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// 节点在图中的序号（即插入顺序）
    pub fn index(self) -> usize {
        self.0
    }
}

/// 排序失败错误
///
/// 描述中包含一条确定性提取出的循环路径，方便日志定位。
#[derive(Debug, Error)]
#[error("检测到循环依赖: {description}")]
pub struct CycleError {
    /// 循环路径描述（例如 `a -> b -> a`）
    pub description: String,
}

/// 泛型依赖图
///
/// 每次批量解析构建一张新图，产出顺序后即可丢弃。
/// 没有顺序约束的节点之间按插入顺序稳定排序。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph<T> {
    /// 节点值，下标即插入顺序
    nodes: Vec<T>,
    /// edges[i] = 必须排在节点 i 之后的节点集合
    edges: Vec<Vec<usize>>,
}

impl<T> DependencyGraph<T> {
    /// 创建一个空的依赖图
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// 添加节点
    ///
    /// # 返回
    ///
    /// 节点句柄，用于后续声明顺序约束
    pub fn add_node(&mut self, value: T) -> NodeId {
        self.nodes.push(value);
        self.edges.push(Vec::new());
        NodeId(self.nodes.len() - 1)
    }

    /// 声明顺序约束：`before` 必须排在 `after` 之前
    ///
    /// 自环（`before == after`）是无操作，不视为错误。
    /// 重复声明同一条边只记录一次。
    pub fn require_before(&mut self, before: NodeId, after: NodeId) {
        if before == after {
            return;
        }
        let successors = &mut self.edges[before.0];
        if !successors.contains(&after.0) {
            successors.push(after.0);
        }
    }

    /// 获取节点值
    pub fn value(&self, node: NodeId) -> &T {
        &self.nodes[node.0]
    }

    /// 节点数量
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 图是否为空
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 检测图中是否存在环
    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// 查找一条循环路径
    ///
    /// 深度优先搜索配合递归栈；同一张图上的结果是确定的。
    ///
    /// # 返回
    ///
    /// 存在环时返回参与循环的节点序列（首尾相接），否则返回 `None`
    pub fn find_cycle(&self) -> Option<Vec<NodeId>> {
        let mut visited = vec![false; self.nodes.len()];
        let mut on_stack = vec![false; self.nodes.len()];
        let mut path = Vec::new();

        for start in 0..self.nodes.len() {
            if let Some(cycle) =
                self.find_cycle_util(start, &mut visited, &mut on_stack, &mut path)
            {
                return Some(cycle);
            }
        }

        None
    }

    /// 查找循环的辅助函数
    fn find_cycle_util(
        &self,
        node: usize,
        visited: &mut [bool],
        on_stack: &mut [bool],
        path: &mut Vec<usize>,
    ) -> Option<Vec<NodeId>> {
        if on_stack[node] {
            // 找到循环，截取路径并闭合
            let start = path.iter().position(|&n| n == node)?;
            let mut cycle: Vec<NodeId> = path[start..].iter().map(|&n| NodeId(n)).collect();
            cycle.push(NodeId(node));
            return Some(cycle);
        }

        if visited[node] {
            return None;
        }

        visited[node] = true;
        on_stack[node] = true;
        path.push(node);

        for &next in &self.edges[node] {
            if let Some(cycle) = self.find_cycle_util(next, visited, on_stack, path) {
                return Some(cycle);
            }
        }

        path.pop();
        on_stack[node] = false;
        None
    }
}

impl<T: fmt::Display> DependencyGraph<T> {
    /// 拓扑排序（Kahn 算法）
    ///
    /// 产出一个与所有顺序约束一致的线性序列；互相无约束的节点
    /// 按插入顺序输出（最小下标优先的小顶堆保证稳定性）。
    ///
    /// # 返回
    ///
    /// 成功时返回按序排列的节点值引用
    ///
    /// # 错误
    ///
    /// 图中存在环时返回 [`CycleError`]，其中携带循环路径描述。
    pub fn sort(&self) -> std::result::Result<Vec<&T>, CycleError> {
        // 计算入度：有多少前置节点
        let mut in_degree = vec![0usize; self.nodes.len()];
        for successors in &self.edges {
            for &next in successors {
                in_degree[next] += 1;
            }
        }

        // 小顶堆保证无约束节点按插入顺序输出
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(index, _)| Reverse(index))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);

            for &next in &self.edges[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        // 有节点未能出队，说明存在环
        if order.len() != self.nodes.len() {
            let description = match self.find_cycle() {
                Some(cycle) => cycle
                    .iter()
                    .map(|&n| self.nodes[n.0].to_string())
                    .collect::<Vec<_>>()
                    .join(" -> "),
                None => "无法完成拓扑排序".to_string(),
            };
            return Err(CycleError { description });
        }

        Ok(order.into_iter().map(|n| &self.nodes[n]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_values(graph: &DependencyGraph<&str>) -> Vec<String> {
        graph
            .sort()
            .unwrap()
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_graph_new() {
        let graph: DependencyGraph<&str> = DependencyGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn test_add_node() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");

        assert_eq!(graph.len(), 2);
        assert_eq!(*graph.value(a), "a");
        assert_eq!(*graph.value(b), "b");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
    }

    #[test]
    fn test_sort_simple_chain() {
        let mut graph = DependencyGraph::new();
        let app = graph.add_node("app");
        let service = graph.add_node("service");
        let database = graph.add_node("database");

        // database 先于 service，service 先于 app
        graph.require_before(database, service);
        graph.require_before(service, app);

        assert_eq!(sorted_values(&graph), vec!["database", "service", "app"]);
    }

    #[test]
    fn test_sort_stable_insertion_order() {
        let mut graph = DependencyGraph::new();
        graph.add_node("first");
        graph.add_node("second");
        graph.add_node("third");

        // 没有任何约束时按插入顺序输出
        assert_eq!(sorted_values(&graph), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_sort_diamond() {
        //     app
        //    /   \
        //   a     b
        //    \   /
        //      c
        let mut graph = DependencyGraph::new();
        let app = graph.add_node("app");
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");

        graph.require_before(a, app);
        graph.require_before(b, app);
        graph.require_before(c, a);
        graph.require_before(c, b);

        let order = sorted_values(&graph);
        let pos = |name: &str| order.iter().position(|x| x == name).unwrap();

        assert!(pos("c") < pos("a"));
        assert!(pos("c") < pos("b"));
        assert!(pos("a") < pos("app"));
        assert!(pos("b") < pos("app"));
    }

    #[test]
    fn test_self_edge_is_noop() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");

        graph.require_before(a, a);

        assert!(!graph.has_cycle());
        assert_eq!(sorted_values(&graph), vec!["a"]);
    }

    #[test]
    fn test_duplicate_edge() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");

        graph.require_before(a, b);
        graph.require_before(a, b);

        assert_eq!(sorted_values(&graph), vec!["a", "b"]);
    }

    #[test]
    fn test_has_cycle() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");

        graph.require_before(a, b);
        graph.require_before(b, c);
        assert!(!graph.has_cycle());

        graph.require_before(c, a);
        assert!(graph.has_cycle());
    }

    #[test]
    fn test_find_cycle_path() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");

        graph.require_before(a, b);
        graph.require_before(b, a);

        let cycle = graph.find_cycle().unwrap();
        // 首尾相接的闭合路径
        assert!(cycle.len() >= 3);
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn test_sort_with_cycle_fails() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");

        graph.require_before(a, b);
        graph.require_before(b, c);
        graph.require_before(c, a);

        let err = graph.sort().unwrap_err();
        assert!(err.description.contains("->"));
        assert!(err.to_string().contains("循环依赖"));
    }

    #[test]
    fn test_sort_partial_constraints() {
        let mut graph = DependencyGraph::new();
        let x = graph.add_node("x");
        let y = graph.add_node("y");
        graph.add_node("standalone");
        let z = graph.add_node("z");

        graph.require_before(z, y);
        graph.require_before(y, x);

        let order = sorted_values(&graph);
        let pos = |name: &str| order.iter().position(|v| v == name).unwrap();

        assert!(pos("z") < pos("y"));
        assert!(pos("y") < pos("x"));
        // 无约束节点保持插入位置上的相对顺序
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_empty_graph_sort() {
        let graph: DependencyGraph<&str> = DependencyGraph::new();
        assert!(graph.sort().unwrap().is_empty());
    }
}
