//! Renders filtered results into the grounding text the model sees.
//!
//! Output is a pure function of the results and the configured budgets. Every
//! free-text field is flattened to one line and cut to a fixed length, so a
//! block's size does not depend on how long the catalog's texts are.

use crate::config::ContextConfig;
use crate::retriever::RetrievalResult;
use crate::text::{single_line, truncate};

/// Returned instead of an empty string when there is nothing to show.
pub const NO_MATCHES: &str = "No matching products were found in the catalog.";

pub const HEADER: &str = "=== AVAILABLE PRODUCTS ===";

const NAME_CHARS: usize = 120;
const CATEGORY_CHARS: usize = 60;
const MATERIAL_CHARS: usize = 40;

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    description_chars: usize,
    max_materials: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(&ContextConfig::default())
    }
}

impl ContextBuilder {
    pub fn new(cfg: &ContextConfig) -> Self {
        Self {
            description_chars: cfg.description_chars,
            max_materials: cfg.max_materials,
        }
    }

    /// One numbered block per result, in the given order. Never empty.
    pub fn build(&self, results: &[RetrievalResult]) -> String {
        if results.is_empty() {
            return NO_MATCHES.to_string();
        }
        let mut parts = Vec::with_capacity(results.len() + 1);
        parts.push(HEADER.to_string());
        for (i, result) in results.iter().enumerate() {
            parts.push(self.block(i + 1, result));
        }
        parts.join("\n\n")
    }

    fn block(&self, n: usize, result: &RetrievalResult) -> String {
        let r = &result.record;
        let category = r
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map_or_else(|| "N/A".to_string(), |c| bounded(c, CATEGORY_CHARS));

        let mut lines = vec![
            format!("[Product {n}]"),
            format!("- Name: {}", bounded(&r.name, NAME_CHARS)),
            format!("- ID: {}", r.id),
            format!("- Category: {category}"),
            format!("- Price: {}", r.price_label()),
        ];
        if let Some(desc) = r.description.as_deref().filter(|d| !d.trim().is_empty()) {
            lines.push(format!(
                "- Description: {}",
                bounded(desc, self.description_chars)
            ));
        }
        if let Some(materials) = self.materials(&r.materials) {
            lines.push(format!("- Materials: {materials}"));
        }
        lines.push(format!("- Status: {}", r.stock_label()));
        if r.review_count > 0 {
            lines.push(format!(
                "- Rating: {:.1}/5 ({} reviews)",
                r.avg_rating.unwrap_or_default(),
                r.review_count
            ));
        }
        lines.push(format!("- Relevance: {:.2}", result.score));
        lines.join("\n")
    }

    /// First `max_materials` entries, with a count of what was left out.
    fn materials(&self, materials: &[String]) -> Option<String> {
        let shown: Vec<String> = materials
            .iter()
            .filter(|m| !m.trim().is_empty())
            .take(self.max_materials)
            .map(|m| bounded(m, MATERIAL_CHARS))
            .collect();
        if shown.is_empty() {
            return None;
        }
        let hidden = materials.iter().filter(|m| !m.trim().is_empty()).count() - shown.len();
        let mut out = shown.join(", ");
        if hidden > 0 {
            out.push_str(&format!(" (+{hidden} more)"));
        }
        Some(out)
    }
}

fn bounded(text: &str, max_chars: usize) -> String {
    truncate(&single_line(text), max_chars)
}
