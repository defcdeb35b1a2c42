//! Hierarchical grouping of test results
//!
//! Results are grouped into a tree either by the values of a list of labels,
//! by their title path (file, suite, ...), or by labels first with the title
//! path nested inside each label group. Group ids are content-addressed so
//! the same inputs always produce the same tree, in any process.

use crate::model::TestResult;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Top level of a tree. Not a group itself: it has no id and no name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TreeRoot {
    pub groups: Vec<String>,
    pub leaves: Vec<String>,
}

/// An inner node of the tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeGroup<G> {
    pub node_id: String,
    pub name: String,
    pub groups: Vec<String>,
    pub leaves: Vec<String>,
    #[serde(flatten)]
    pub data: G,
}

/// A leaf of the tree; `node_id` is the id of the result it was made from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeLeaf<L> {
    pub node_id: String,
    #[serde(flatten)]
    pub data: L,
}

/// A complete tree: the root plus every node indexed by id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeData<L, G> {
    pub root: TreeRoot,
    pub groups_by_id: BTreeMap<String, TreeGroup<G>>,
    pub leaves_by_id: BTreeMap<String, TreeLeaf<L>>,
}

impl<L, G> Default for TreeData<L, G> {
    fn default() -> Self {
        TreeData {
            root: TreeRoot::default(),
            groups_by_id: BTreeMap::new(),
            leaves_by_id: BTreeMap::new(),
        }
    }
}

impl<L, G> TreeData<L, G> {
    pub fn is_empty(&self) -> bool {
        self.root.groups.is_empty() && self.root.leaves.is_empty()
    }

    fn attach_group(&mut self, parent: Option<&str>, node_id: &str) {
        let groups = match parent {
            None => &mut self.root.groups,
            Some(parent) => match self.groups_by_id.get_mut(parent) {
                Some(group) => &mut group.groups,
                None => return,
            },
        };
        push_unique(groups, node_id);
    }

    fn attach_leaf(&mut self, parent: Option<&str>, node_id: &str) {
        let leaves = match parent {
            None => &mut self.root.leaves,
            Some(parent) => match self.groups_by_id.get_mut(parent) {
                Some(group) => &mut group.leaves,
                None => return,
            },
        };
        push_unique(leaves, node_id);
    }
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

/// Id of the group called `name` under `parent_id` (`None` for the root)
///
/// # Examples
///
/// ```
/// use testreport::tree::node_id;
///
/// let suite = node_id(None, "auth");
/// assert_eq!(suite, node_id(None, "auth"));
/// assert_ne!(node_id(Some(&suite), "login"), node_id(None, "login"));
/// ```
pub fn node_id(parent_id: Option<&str>, name: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(parent) = parent_id {
        hasher.update(parent.as_bytes());
        hasher.update(b".");
    }
    hasher.update(name.as_bytes());
    hex::encode(hasher.finalize())
}

/// Core tree construction shared by every grouping.
///
/// `classify` returns the layers a result descends through: each layer is
/// the list of group names at that depth. An empty layer ends the descent.
/// The leaf is attached to every group reached by the last layer, or to the
/// root if none was.
fn build_tree<'a, I, L, G>(
    results: I,
    classify: impl Fn(&TestResult) -> Vec<Vec<String>>,
    leaf_factory: impl Fn(&TestResult) -> L,
    group_factory: impl Fn(Option<&str>, &str) -> G,
    mut merge: impl FnMut(&mut G, &TreeLeaf<L>),
) -> TreeData<L, G>
where
    I: IntoIterator<Item = &'a TestResult>,
{
    let mut tree = TreeData::default();

    for result in results {
        let leaf = TreeLeaf {
            node_id: result.id.to_string(),
            data: leaf_factory(result),
        };

        let mut parents: Vec<Option<String>> = vec![None];
        for layer in classify(result) {
            if layer.is_empty() {
                break;
            }

            let mut reached: Vec<Option<String>> = Vec::new();
            for name in &layer {
                for parent in &parents {
                    let parent = parent.as_deref();
                    let id = node_id(parent, name);
                    if reached.iter().any(|r| r.as_deref() == Some(id.as_str())) {
                        continue;
                    }

                    if !tree.groups_by_id.contains_key(&id) {
                        let group = TreeGroup {
                            node_id: id.clone(),
                            name: name.clone(),
                            groups: Vec::new(),
                            leaves: Vec::new(),
                            data: group_factory(parent, name),
                        };
                        tree.groups_by_id.insert(id.clone(), group);
                    }
                    tree.attach_group(parent, &id);
                    if let Some(group) = tree.groups_by_id.get_mut(&id) {
                        merge(&mut group.data, &leaf);
                    }
                    reached.push(Some(id));
                }
            }
            parents = reached;
        }

        for parent in &parents {
            tree.attach_leaf(parent.as_deref(), &leaf.node_id);
        }
        tree.leaves_by_id.insert(leaf.node_id.clone(), leaf);
    }

    tree
}

fn label_layers<S: AsRef<str>>(result: &TestResult, label_names: &[S]) -> Vec<Vec<String>> {
    label_names
        .iter()
        .map(|name| {
            result
                .label_values(name.as_ref())
                .map(str::to_string)
                .collect()
        })
        .collect()
}

fn title_path_layers(result: &TestResult) -> Vec<Vec<String>> {
    result
        .title_path
        .iter()
        .map(|segment| vec![segment.clone()])
        .collect()
}

/// Group results by the values of `label_names`, in order
///
/// A result with several values for one label appears under one group per
/// value. A result lacking a label stops descending at that level, so it
/// hangs off the deepest group it reached (or the root).
///
/// # Examples
///
/// ```
/// use testreport::model::TestResult;
/// use testreport::tree::group_by_labels;
///
/// let results = vec![
///     TestResult::passed("a").with_label("suite", "api"),
///     TestResult::passed("b").with_label("suite", "api"),
///     TestResult::passed("c").with_label("suite", "ui"),
/// ];
///
/// let tree = group_by_labels(
///     &results,
///     &["suite"],
///     |tr| tr.name.clone(),
///     |_, _| 0usize,
///     |count, _| *count += 1,
/// );
///
/// assert_eq!(tree.root.groups.len(), 2);
/// let api = &tree.groups_by_id[&tree.root.groups[0]];
/// assert_eq!(api.name, "api");
/// assert_eq!(api.data, 2);
/// ```
pub fn group_by_labels<'a, I, S, L, G>(
    results: I,
    label_names: &[S],
    leaf_factory: impl Fn(&TestResult) -> L,
    group_factory: impl Fn(Option<&str>, &str) -> G,
    merge: impl FnMut(&mut G, &TreeLeaf<L>),
) -> TreeData<L, G>
where
    I: IntoIterator<Item = &'a TestResult>,
    S: AsRef<str>,
{
    build_tree(
        results,
        |result| label_layers(result, label_names),
        leaf_factory,
        group_factory,
        merge,
    )
}

/// Group results by their title path segments
pub fn group_by_title_path<'a, I, L>(
    results: I,
    leaf_factory: impl Fn(&TestResult) -> L,
) -> TreeData<L, ()>
where
    I: IntoIterator<Item = &'a TestResult>,
{
    build_tree(
        results,
        title_path_layers,
        leaf_factory,
        |_, _| (),
        |_, _| {},
    )
}

/// Group results by labels, then by title path inside each label group
pub fn group_by_labels_then_title_path<'a, I, S, L, G>(
    results: I,
    label_names: &[S],
    leaf_factory: impl Fn(&TestResult) -> L,
    group_factory: impl Fn(Option<&str>, &str) -> G,
    merge: impl FnMut(&mut G, &TreeLeaf<L>),
) -> TreeData<L, G>
where
    I: IntoIterator<Item = &'a TestResult>,
    S: AsRef<str>,
{
    build_tree(
        results,
        |result| {
            let mut layers: Vec<Vec<String>> = label_layers(result, label_names)
                .into_iter()
                .take_while(|layer| !layer.is_empty())
                .collect();
            layers.extend(title_path_layers(result));
            layers
        },
        leaf_factory,
        group_factory,
        merge,
    )
}
