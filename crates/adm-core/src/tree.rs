//! 通用树构建：把带 parent_id 的扁平列表还原成森林。
//!
//! 接口注册表和部门共用同一套算法。构建过程不递归，先建立
//! `parent -> children` 索引，再从根节点做一次迭代深度优先遍历；
//! 遍历结束后仍未访问到的节点必然处在父子环中，以 `CycleDetected` 报告。

use crate::{ApiEntry, Department};
use adm_error::{AdmError, Result};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// 可参与树构建的扁平节点
pub trait TreeNode {
    fn node_id(&self) -> i64;
    fn parent_id(&self) -> i64;
    /// 同级节点按该值降序排列
    fn sort_key(&self) -> i32;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tree<T> {
    #[serde(flatten)]
    pub node: T,
    pub children: Vec<Tree<T>>,
}

impl<T> Tree<T> {
    /// 子树中的节点总数（含自身）
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            count += 1;
            stack.extend(tree.children.iter());
        }
        count
    }
}

/// 从扁平列表构建森林
///
/// - `parent_id == root_parent_id` 的节点为根；
/// - 父节点不存在的节点也作为根返回，并记录告警；
/// - 同级节点按 `sort_key` 降序，相同时保持输入顺序；
/// - 重复 ID 返回 `Validation`，父子成环返回 `CycleDetected`。
pub fn build_tree<T: TreeNode>(nodes: Vec<T>, root_parent_id: i64) -> Result<Vec<Tree<T>>> {
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(node.node_id(), i).is_some() {
            return Err(AdmError::Validation {
                message: format!("重复的节点ID: {}", node.node_id()),
            });
        }
    }

    let mut roots: Vec<usize> = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        let parent = node.parent_id();
        if parent == root_parent_id {
            roots.push(i);
            continue;
        }
        match index.get(&parent) {
            Some(&p) => children[p].push(i),
            None => {
                warn!(
                    node_id = node.node_id(),
                    parent_id = parent,
                    "parent not found, treating node as root"
                );
                roots.push(i);
            }
        }
    }

    let by_sort_desc = |a: &usize, b: &usize| nodes[*b].sort_key().cmp(&nodes[*a].sort_key());
    roots.sort_by(by_sort_desc);
    for group in children.iter_mut() {
        group.sort_by(by_sort_desc);
    }

    // 先序遍历；父节点总在子节点之前
    let mut visited = vec![false; nodes.len()];
    let mut order: Vec<usize> = Vec::with_capacity(nodes.len());
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(i) = stack.pop() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        order.push(i);
        stack.extend(children[i].iter().rev().copied());
    }

    if order.len() < nodes.len() {
        let mut node_ids: Vec<i64> = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| !visited[*i])
            .map(|(_, node)| node.node_id())
            .collect();
        node_ids.sort_unstable();
        return Err(AdmError::CycleDetected { node_ids });
    }

    let mut slots: Vec<Option<T>> = nodes.into_iter().map(Some).collect();
    let mut built: Vec<Option<Tree<T>>> = (0..slots.len()).map(|_| None).collect();
    for &i in order.iter().rev() {
        let Some(node) = slots[i].take() else {
            continue;
        };
        let subtrees = children[i]
            .iter()
            .filter_map(|c| built[*c].take())
            .collect();
        built[i] = Some(Tree {
            node,
            children: subtrees,
        });
    }

    Ok(roots.iter().filter_map(|r| built[*r].take()).collect())
}

impl TreeNode for ApiEntry {
    fn node_id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> i64 {
        self.parent_id
    }

    fn sort_key(&self) -> i32 {
        self.sort
    }
}

impl TreeNode for Department {
    fn node_id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> i64 {
        self.parent_id
    }

    fn sort_key(&self) -> i32 {
        self.sort
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Node {
        id: i64,
        parent: i64,
        sort: i32,
    }

    impl TreeNode for Node {
        fn node_id(&self) -> i64 {
            self.id
        }
        fn parent_id(&self) -> i64 {
            self.parent
        }
        fn sort_key(&self) -> i32 {
            self.sort
        }
    }

    fn n(id: i64, parent: i64, sort: i32) -> Node {
        Node { id, parent, sort }
    }

    fn ids(forest: &[Tree<Node>]) -> Vec<i64> {
        forest.iter().map(|t| t.node.id).collect()
    }

    fn count(forest: &[Tree<Node>]) -> usize {
        forest.iter().map(Tree::node_count).sum()
    }

    fn check_children(forest: &[Tree<Node>], all: &[Node]) {
        for tree in forest {
            let mut expected: Vec<i64> = all
                .iter()
                .filter(|n| n.parent == tree.node.id)
                .map(|n| n.id)
                .collect();
            let mut actual = ids(&tree.children);
            expected.sort_unstable();
            actual.sort_unstable();
            assert_eq!(actual, expected, "children of {}", tree.node.id);
            check_children(&tree.children, all);
        }
    }

    #[test]
    fn test_forest_contains_every_node_once() {
        let nodes = vec![
            n(1, 0, 0),
            n(2, 1, 0),
            n(3, 1, 0),
            n(4, 2, 0),
            n(5, 0, 0),
            n(6, 5, 0),
            n(7, 4, 0),
        ];
        let forest = build_tree(nodes.clone(), 0).unwrap();
        assert_eq!(count(&forest), nodes.len());
        assert_eq!(ids(&forest), vec![1, 5]);
        check_children(&forest, &nodes);
    }

    #[test]
    fn test_siblings_sorted_desc_and_stable() {
        let nodes = vec![n(1, 0, 1), n(2, 0, 5), n(3, 0, 1), n(4, 0, 5), n(5, 0, 3)];
        let forest = build_tree(nodes, 0).unwrap();
        assert_eq!(ids(&forest), vec![2, 4, 5, 1, 3]);
    }

    #[test]
    fn test_orphan_becomes_root() {
        let nodes = vec![n(1, 0, 0), n(2, 99, 0), n(3, 2, 0)];
        let forest = build_tree(nodes, 0).unwrap();
        assert_eq!(count(&forest), 3);
        assert_eq!(ids(&forest), vec![1, 2]);
        assert_eq!(ids(&forest[1].children), vec![3]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let nodes = vec![n(1, 0, 0), n(2, 3, 0), n(3, 2, 0), n(4, 3, 0)];
        let err = build_tree(nodes, 0).unwrap_err();
        match err {
            AdmError::CycleDetected { node_ids } => assert_eq!(node_ids, vec![2, 3, 4]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let err = build_tree(vec![n(1, 1, 0)], 0).unwrap_err();
        assert!(matches!(err, AdmError::CycleDetected { .. }));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = build_tree(vec![n(1, 0, 0), n(1, 0, 0)], 0).unwrap_err();
        assert!(matches!(err, AdmError::Validation { .. }));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let nodes: Vec<Node> = (1..=50_000).map(|i| n(i, i - 1, 0)).collect();
        let forest = build_tree(nodes, 0).unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].node_count(), 50_000);
        // 深链的 Drop 仍是递归的，测试结束前手动拆开
        let mut stack = forest;
        while let Some(mut tree) = stack.pop() {
            stack.append(&mut tree.children);
        }
    }

    #[test]
    fn test_custom_root_parent() {
        let nodes = vec![n(10, 7, 0), n(11, 10, 0), n(12, 0, 0)];
        let forest = build_tree(nodes, 7).unwrap();
        // 12 的父节点 0 不存在，被视为根
        assert_eq!(ids(&forest), vec![10, 12]);
        assert_eq!(count(&forest), 3);
    }

    #[test]
    fn test_serializes_flattened() {
        let forest = build_tree(vec![n(1, 0, 0), n(2, 1, 0)], 0).unwrap();
        let json = serde_json::to_value(&forest).unwrap();
        assert_eq!(json[0]["id"], 1);
        assert_eq!(json[0]["children"][0]["id"], 2);
    }
}
