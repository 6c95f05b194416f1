//! Catalog categories and their tree.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use emporium_core::CategoryId;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A category with its nested children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Assemble a flat category list into a forest ordered by `sort_order`, then name.
///
/// Categories whose parent is missing from the list are treated as roots.
#[must_use]
pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let known: std::collections::HashSet<CategoryId> = categories.iter().map(|c| c.id).collect();
    let mut by_parent: HashMap<Option<CategoryId>, Vec<Category>> = HashMap::new();

    for category in categories {
        let parent = category.parent_id.filter(|p| known.contains(p));
        by_parent.entry(parent).or_default().push(category);
    }

    attach(None, &mut by_parent)
}

fn attach(
    parent: Option<CategoryId>,
    by_parent: &mut HashMap<Option<CategoryId>, Vec<Category>>,
) -> Vec<CategoryNode> {
    let mut level = by_parent.remove(&parent).unwrap_or_default();
    level.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));

    level
        .into_iter()
        .map(|category| {
            let children = attach(Some(category.id), by_parent);
            CategoryNode { category, children }
        })
        .collect()
}

/// Whether making `new_parent` the parent of `id` would introduce a cycle.
///
/// Walks up from `new_parent` through `parents` (child -> parent).
#[must_use]
pub fn would_create_cycle(
    id: CategoryId,
    new_parent: CategoryId,
    parents: &HashMap<CategoryId, Option<CategoryId>>,
) -> bool {
    let mut cursor = Some(new_parent);
    let mut steps = 0usize;
    while let Some(current) = cursor {
        if current == id {
            return true;
        }
        steps += 1;
        if steps > parents.len() {
            // Existing data already loops.
            return true;
        }
        cursor = parents.get(&current).copied().flatten();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, parent: Option<CategoryId>, sort_order: i32) -> Category {
        Category {
            id: CategoryId::generate(),
            name: name.to_string(),
            slug: name.to_lowercase(),
            description: None,
            parent_id: parent,
            sort_order,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_tree_nests_and_sorts() {
        let electronics = category("Electronics", None, 1);
        let books = category("Books", None, 0);
        let phones = category("Phones", Some(electronics.id), 0);
        let laptops = category("Laptops", Some(electronics.id), 0);

        let tree = build_tree(vec![phones, electronics, laptops, books]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].category.name, "Books");
        assert_eq!(tree[1].category.name, "Electronics");
        let children: Vec<_> = tree[1].children.iter().map(|n| n.category.name.as_str()).collect();
        assert_eq!(children, vec!["Laptops", "Phones"]);
    }

    #[test]
    fn test_orphans_become_roots() {
        let orphan = category("Orphan", Some(CategoryId::generate()), 0);
        let tree = build_tree(vec![orphan]);
        assert_eq!(tree.len(), 1);
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn test_would_create_cycle() {
        let root = CategoryId::generate();
        let child = CategoryId::generate();
        let grandchild = CategoryId::generate();
        let parents = HashMap::from([
            (root, None),
            (child, Some(root)),
            (grandchild, Some(child)),
        ]);

        assert!(would_create_cycle(root, grandchild, &parents));
        assert!(would_create_cycle(child, child, &parents));
        assert!(!would_create_cycle(grandchild, root, &parents));
    }
}
