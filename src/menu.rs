//! Restaurant menu catalog
//!
//! Item deltas are resolved against the menu during output validation, so the
//! order never holds an item the kitchen doesn't sell.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::state_machine::state::format_cents;

#[derive(Error, Debug)]
pub enum MenuError {
    #[error("Failed to read menu file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid menu file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Menu has no items")]
    Empty,
    #[error("Duplicate menu item: {0}")]
    Duplicate(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub price_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    pub name: String,
    pub items: Vec<MenuItem>,
}

impl Default for Menu {
    fn default() -> Self {
        let item = |name: &str, price_cents| MenuItem {
            name: name.to_string(),
            price_cents,
        };
        Self {
            name: "Fresh Burger".to_string(),
            items: vec![
                item("King Burger", 999),
                item("Mini Burger", 799),
                item("French Fries", 299),
                item("Onion Rings", 399),
                item("Large Fountain Drink", 399),
                item("Medium Fountain Drink", 299),
            ],
        }
    }
}

impl Menu {
    /// Load a menu from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MenuError> {
        let text = std::fs::read_to_string(path)?;
        let menu: Menu = serde_json::from_str(&text)?;
        menu.validate()?;
        Ok(menu)
    }

    fn validate(&self) -> Result<(), MenuError> {
        if self.items.is_empty() {
            return Err(MenuError::Empty);
        }
        for (i, item) in self.items.iter().enumerate() {
            if self.items[..i]
                .iter()
                .any(|other| names_match(&other.name, &item.name))
            {
                return Err(MenuError::Duplicate(item.name.clone()));
            }
        }
        Ok(())
    }

    /// Case- and whitespace-insensitive lookup
    pub fn lookup(&self, name: &str) -> Option<&MenuItem> {
        self.items.iter().find(|item| names_match(&item.name, name))
    }

    /// Menu rendered for handler instructions
    pub fn describe(&self) -> String {
        let mut out = format!("{}\n", self.name);
        for item in &self.items {
            out.push_str(&format!("- {}: {}\n", item.name, format_cents(item.price_cents)));
        }
        out
    }
}

fn names_match(a: &str, b: &str) -> bool {
    let normalize = |s: &str| {
        s.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    };
    normalize(a) == normalize(b)
}
