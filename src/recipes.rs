//! Recipe Catalog - Read-Only Style Presets
//!
//! Loaded once at start-up, then shared behind an `Arc` by every request.
//! Nothing mutates a catalog after construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::ENGINE_VERSION;

pub const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub layout_rules: Vec<String>,
    #[serde(default)]
    pub typography_rules: Vec<String>,
    #[serde(default = "default_min_version")]
    pub engine_min_version: String,
}

fn default_min_version() -> String { "1.0.0".to_string() }

impl Recipe {
    fn general() -> Self {
        Self {
            id: "general-swiss".to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            name: "General Purpose".to_string(),
            layout_rules: vec!["Use Swiss Grid".to_string(), "Apply Golden Ratio".to_string()],
            typography_rules: vec!["Header: H1 Bold".to_string(), "Body: Sans-serif Regular".to_string()],
            engine_min_version: default_min_version(),
        }
    }

    /// Whether this engine is new enough for the recipe.
    pub fn is_supported(&self) -> bool {
        match (
            semver::Version::parse(ENGINE_VERSION),
            semver::Version::parse(&self.engine_min_version),
        ) {
            (Ok(engine), Ok(min)) => engine >= min,
            _ => false,
        }
    }
}

/// Recipe catalog - keyed by category
#[derive(Debug, Clone)]
pub struct RecipeCatalog {
    recipes: HashMap<String, Recipe>,
    fallback: Recipe,
}

impl RecipeCatalog {
    /// Catalog holding only the built-in `general` recipe.
    pub fn new() -> Self {
        let mut catalog = Self {
            recipes: HashMap::new(),
            fallback: Recipe::general(),
        };
        catalog.register(Recipe::general());
        catalog
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self, std::io::Error> {
        let mut catalog = Self::new();
        if !dir.exists() {
            tracing::warn!(dir = %dir.display(), "recipe directory missing, using built-ins");
            return Ok(catalog);
        }

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            let recipe = match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|content| serde_json::from_str::<Recipe>(&content).map_err(|e| e.to_string()))
            {
                Ok(recipe) => recipe,
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "skipping unreadable recipe");
                    continue;
                }
            };
            if !recipe.is_supported() {
                tracing::warn!(
                    id = %recipe.id,
                    required = %recipe.engine_min_version,
                    engine = ENGINE_VERSION,
                    "skipping recipe for newer engine"
                );
                continue;
            }
            catalog.register(recipe);
        }
        Ok(catalog)
    }

    /// Recipe for a category, falling back to `general`.
    pub fn get(&self, category: &str) -> &Recipe {
        self.recipes
            .get(&category.to_ascii_lowercase())
            .or_else(|| self.recipes.get(DEFAULT_CATEGORY))
            .unwrap_or(&self.fallback)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.recipes.contains_key(&category.to_ascii_lowercase())
    }

    pub fn list(&self) -> Vec<&Recipe> {
        let mut recipes: Vec<_> = self.recipes.values().collect();
        recipes.sort_by(|a, b| a.category.cmp(&b.category));
        recipes
    }

    pub fn register(&mut self, recipe: Recipe) {
        self.recipes.insert(recipe.category.to_ascii_lowercase(), recipe);
    }
}

impl Default for RecipeCatalog {
    fn default() -> Self {
        Self::new()
    }
}
