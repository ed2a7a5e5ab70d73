//! File-backed JSON database for the portal.
//!
//! One JSON file per table under the database directory, mirrored by an
//! in-memory copy behind a `RwLock`. Every mutation rewrites the table's
//! file before returning, so a restart always sees the last acknowledged
//! write. Reads never touch the filesystem.

use crate::ingest::RowStore;
use crate::model::{AdminRole, Category, Item, Role, UploadedRow};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const CATEGORIES_FILE: &str = "categories.json";
const ITEMS_FILE: &str = "items.json";
const ROWS_FILE: &str = "dashboard_data.json";
const ROLES_FILE: &str = "admin_roles.json";
const CONFIG_FILE: &str = "config.json";

/// Default database directory, relative to the working directory
pub const DATABASE_DIR: &str = "database";

#[derive(Default)]
struct Tables {
    categories: Vec<Category>,
    items: Vec<Item>,
    rows: Vec<UploadedRow>,
    roles: Vec<AdminRole>,
    config: HashMap<String, String>,
}

/// The portal's persistent store
pub struct Database {
    dir: PathBuf,
    tables: RwLock<Tables>,
}

/// Read and parse one table file; a missing file is an empty table
fn load_table<T: DeserializeOwned + Default>(path: &Path) -> Result<T, String> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return Ok(T::default()),
    };

    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_err() {
        return Err(format!("Failed to read {}", path.display()));
    }

    serde_json::from_str(&contents).map_err(|_| format!("Failed to parse {}", path.display()))
}

/// Serialize and write one table file
fn save_table<T: Serialize>(path: &Path, table: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(table)
        .map_err(|_| format!("Failed to serialize {}", path.display()))?;

    let mut file =
        File::create(path).map_err(|_| format!("Failed to create {}", path.display()))?;
    file.write_all(json.as_bytes())
        .map_err(|_| format!("Failed to write {}", path.display()))
}

impl Database {
    /// Open (or initialize) the database in the given directory
    ///
    /// Creates the directory if needed and loads every table; missing
    /// table files start empty.
    ///
    /// # Errors
    /// * Returns an error if the directory cannot be created or a table
    ///   file exists but cannot be read or parsed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, String> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            create_dir_all(&dir).map_err(|_| "Failed to create database directory".to_string())?;
        }

        let tables = Tables {
            categories: load_table(&dir.join(CATEGORIES_FILE))?,
            items: load_table(&dir.join(ITEMS_FILE))?,
            rows: load_table(&dir.join(ROWS_FILE))?,
            roles: load_table(&dir.join(ROLES_FILE))?,
            config: load_table(&dir.join(CONFIG_FILE))?,
        };

        Ok(Self {
            dir,
            tables: RwLock::new(tables),
        })
    }

    // Categories

    /// List categories ordered by their sort position
    pub fn list_categories(&self, include_inactive: bool) -> Vec<Category> {
        let tables = self.tables.read().unwrap();
        let mut categories: Vec<Category> = tables
            .categories
            .iter()
            .filter(|c| include_inactive || c.active)
            .cloned()
            .collect();
        categories.sort_by_key(|c| c.order);
        categories
    }

    pub fn get_category(&self, id: &str) -> Option<Category> {
        let tables = self.tables.read().unwrap();
        tables.categories.iter().find(|c| c.id == id).cloned()
    }

    pub fn insert_category(&self, category: Category) -> Result<(), String> {
        let mut tables = self.tables.write().unwrap();
        tables.categories.push(category);
        save_table(&self.dir.join(CATEGORIES_FILE), &tables.categories)
    }

    /// Replace a stored category by id
    pub fn update_category(&self, category: Category) -> Result<(), String> {
        let mut tables = self.tables.write().unwrap();
        let slot = tables
            .categories
            .iter_mut()
            .find(|c| c.id == category.id)
            .ok_or_else(|| "Category not found".to_string())?;
        *slot = category;
        save_table(&self.dir.join(CATEGORIES_FILE), &tables.categories)
    }

    pub fn delete_category(&self, id: &str) -> Result<(), String> {
        let mut tables = self.tables.write().unwrap();
        let before = tables.categories.len();
        tables.categories.retain(|c| c.id != id);
        if tables.categories.len() == before {
            return Err("Category not found".to_string());
        }
        save_table(&self.dir.join(CATEGORIES_FILE), &tables.categories)
    }

    // Items

    /// List items, optionally filtered by category, ordered by sort
    /// position
    pub fn list_items(&self, category_id: Option<&str>, include_inactive: bool) -> Vec<Item> {
        let tables = self.tables.read().unwrap();
        let mut items: Vec<Item> = tables
            .items
            .iter()
            .filter(|i| include_inactive || i.active)
            .filter(|i| category_id.is_none_or(|c| i.category_id == c))
            .cloned()
            .collect();
        items.sort_by_key(|i| i.order);
        items
    }

    pub fn get_item(&self, id: &str) -> Option<Item> {
        let tables = self.tables.read().unwrap();
        tables.items.iter().find(|i| i.id == id).cloned()
    }

    pub fn insert_item(&self, item: Item) -> Result<(), String> {
        let mut tables = self.tables.write().unwrap();
        tables.items.push(item);
        save_table(&self.dir.join(ITEMS_FILE), &tables.items)
    }

    /// Replace a stored item by id
    pub fn update_item(&self, item: Item) -> Result<(), String> {
        let mut tables = self.tables.write().unwrap();
        let slot = tables
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or_else(|| "Item not found".to_string())?;
        *slot = item;
        save_table(&self.dir.join(ITEMS_FILE), &tables.items)
    }

    pub fn delete_item(&self, id: &str) -> Result<(), String> {
        let mut tables = self.tables.write().unwrap();
        let before = tables.items.len();
        tables.items.retain(|i| i.id != id);
        if tables.items.len() == before {
            return Err("Item not found".to_string());
        }
        save_table(&self.dir.join(ITEMS_FILE), &tables.items)
    }

    // Dashboard rows

    /// Fetch an item's uploaded rows, ordered by sheet name then row
    /// index
    pub fn rows_for_item(&self, item_id: &str) -> Vec<UploadedRow> {
        let tables = self.tables.read().unwrap();
        let mut rows: Vec<UploadedRow> = tables
            .rows
            .iter()
            .filter(|r| r.item_id == item_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.sheet_name
                .cmp(&b.sheet_name)
                .then(a.row_index.cmp(&b.row_index))
        });
        rows
    }

    // Admin roles

    pub fn role_for_user(&self, user_id: &str) -> Option<AdminRole> {
        let tables = self.tables.read().unwrap();
        tables.roles.iter().find(|r| r.user_id == user_id).cloned()
    }

    pub fn list_roles(&self) -> Vec<AdminRole> {
        let tables = self.tables.read().unwrap();
        tables.roles.clone()
    }

    pub fn insert_role(&self, role: AdminRole) -> Result<(), String> {
        let mut tables = self.tables.write().unwrap();
        tables.roles.push(role);
        save_table(&self.dir.join(ROLES_FILE), &tables.roles)
    }

    /// Change an existing role record's granted role
    pub fn update_role(&self, user_id: &str, role: Role) -> Result<(), String> {
        let mut tables = self.tables.write().unwrap();
        let record = tables
            .roles
            .iter_mut()
            .find(|r| r.user_id == user_id)
            .ok_or_else(|| "Role not found".to_string())?;
        record.role = role;
        save_table(&self.dir.join(ROLES_FILE), &tables.roles)
    }

    pub fn delete_role_for_user(&self, user_id: &str) -> Result<(), String> {
        let mut tables = self.tables.write().unwrap();
        tables.roles.retain(|r| r.user_id != user_id);
        save_table(&self.dir.join(ROLES_FILE), &tables.roles)
    }

    // Portal configuration

    pub fn config_pairs(&self) -> Vec<(String, String)> {
        let tables = self.tables.read().unwrap();
        tables
            .config
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn set_config(&self, key: &str, value: &str) -> Result<(), String> {
        let mut tables = self.tables.write().unwrap();
        tables.config.insert(key.to_string(), value.to_string());
        save_table(&self.dir.join(CONFIG_FILE), &tables.config)
    }
}

impl RowStore for Database {
    fn delete_rows_for_item(&self, item_id: &str) -> Result<(), String> {
        let mut tables = self.tables.write().unwrap();
        tables.rows.retain(|r| r.item_id != item_id);
        save_table(&self.dir.join(ROWS_FILE), &tables.rows)
    }

    fn insert_rows(&self, rows: &[UploadedRow]) -> Result<(), String> {
        let mut tables = self.tables.write().unwrap();
        tables.rows.extend_from_slice(rows);
        save_table(&self.dir.join(ROWS_FILE), &tables.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemKind;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn category(name: &str, order: i32, active: bool) -> Category {
        let now = Utc::now();
        Category {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: None,
            icon: "folder".to_string(),
            order,
            active,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(category_id: &str, name: &str, order: i32) -> Item {
        let now = Utc::now();
        Item {
            id: Uuid::new_v4().to_string(),
            category_id: category_id.to_string(),
            name: name.to_string(),
            description: None,
            url: None,
            kind: ItemKind::Dashboard,
            icon: "chart".to_string(),
            order,
            active: true,
            instruction_prompt: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn categories_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            db.insert_category(category("Sistemas", 2, true)).unwrap();
            db.insert_category(category("Manuais", 1, true)).unwrap();
        }

        let db = Database::open(dir.path()).unwrap();
        let categories = db.list_categories(true);
        assert_eq!(categories.len(), 2);
        // Ordered by sort position, not insertion order.
        assert_eq!(categories[0].name, "Manuais");
        assert_eq!(categories[1].name, "Sistemas");
    }

    #[test]
    fn inactive_records_are_filtered_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        db.insert_category(category("Ativa", 1, true)).unwrap();
        db.insert_category(category("Oculta", 2, false)).unwrap();

        assert_eq!(db.list_categories(false).len(), 1);
        assert_eq!(db.list_categories(true).len(), 2);
    }

    #[test]
    fn item_filtering_by_category() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let cat_a = category("A", 1, true);
        let cat_b = category("B", 2, true);
        db.insert_item(item(&cat_a.id, "Painel", 1)).unwrap();
        db.insert_item(item(&cat_b.id, "Relatório", 1)).unwrap();

        assert_eq!(db.list_items(Some(&cat_a.id), true).len(), 1);
        assert_eq!(db.list_items(None, true).len(), 2);
    }

    #[test]
    fn update_missing_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        assert!(db.update_category(category("Fantasma", 1, true)).is_err());
        assert!(db.delete_item("nope").is_err());
    }

    #[test]
    fn rows_are_ordered_by_sheet_then_index() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let now = Utc::now();

        let mut rows = Vec::new();
        for (sheet, index) in [("B", 1), ("A", 2), ("A", 1)] {
            let mut columns = BTreeMap::new();
            columns.insert("col_A".to_string(), json!("x"));
            rows.push(UploadedRow {
                id: Uuid::new_v4().to_string(),
                item_id: "item-1".to_string(),
                sheet_name: sheet.to_string(),
                row_index: index,
                columns,
                created_at: now,
            });
        }
        db.insert_rows(&rows).unwrap();

        let fetched = db.rows_for_item("item-1");
        let order: Vec<(String, i64)> = fetched
            .iter()
            .map(|r| (r.sheet_name.clone(), r.row_index))
            .collect();
        assert_eq!(
            order,
            vec![
                ("A".to_string(), 1),
                ("A".to_string(), 2),
                ("B".to_string(), 1)
            ]
        );

        db.delete_rows_for_item("item-1").unwrap();
        assert!(db.rows_for_item("item-1").is_empty());
    }

    #[test]
    fn config_pairs_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        db.set_config("primary_color", "#123456").unwrap();

        let pairs = db.config_pairs();
        assert!(pairs
            .iter()
            .any(|(k, v)| k == "primary_color" && v == "#123456"));
    }
}
