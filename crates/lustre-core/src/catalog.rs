//! Product records and where they come from.
//!
//! The catalog is read in bulk at index-build time and frozen into a
//! [`CatalogSnapshot`] that sits positionally parallel to the vector index.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One catalog item as it was when the index was built. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Lowest realized price (base price plus the cheapest variant delta).
    pub min_price: f64,
    /// Highest realized price. Absent means the product has a single price.
    #[serde(default)]
    pub max_price: Option<f64>,
    /// Stock summed over all variants.
    #[serde(default)]
    pub total_stock: u32,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub avg_rating: Option<f32>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ProductRecord {
    /// `(min, max)` with `max` never below `min`.
    pub fn price_range(&self) -> (f64, f64) {
        let max = self.max_price.unwrap_or(self.min_price);
        (self.min_price, max.max(self.min_price))
    }

    pub fn in_stock(&self) -> bool {
        self.total_stock > 0
    }

    /// Single price when min == max, otherwise `min - max`.
    pub fn price_label(&self) -> String {
        let (min, max) = self.price_range();
        if min == max {
            format_vnd(min)
        } else {
            format!("{} - {} VND", group_thousands(min), group_thousands(max))
        }
    }

    pub fn stock_label(&self) -> &'static str {
        if self.in_stock() {
            "In stock"
        } else {
            "Out of stock"
        }
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |reason: &'static str| CatalogError::InvalidRecord { id: self.id, reason };
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if !self.min_price.is_finite() || self.min_price < 0.0 {
            return Err(invalid("min_price must be a non-negative number"));
        }
        if let Some(max) = self.max_price {
            if !max.is_finite() || max < self.min_price {
                return Err(invalid("max_price must be a number not below min_price"));
            }
        }
        Ok(())
    }
}

/// Text fed to the embedding model for a product. Every field that helps a
/// shopper describe what they want goes in; identifiers and images do not.
pub fn embedding_text(record: &ProductRecord) -> String {
    let mut parts = vec![format!("Product: {}", record.name)];
    if let Some(category) = record.category.as_deref().filter(|c| !c.is_empty()) {
        parts.push(format!("Category: {category}"));
    }
    if let Some(description) = record.description.as_deref().filter(|d| !d.is_empty()) {
        parts.push(format!("Description: {description}"));
    }
    let (min, max) = record.price_range();
    if min == max {
        parts.push(format!("Price: {}", format_vnd(min)));
    } else {
        parts.push(format!("Price range: {}", record.price_label()));
    }
    if !record.materials.is_empty() {
        parts.push(format!("Materials: {}", record.materials.join(", ")));
    }
    parts.push(record.stock_label().to_string());
    if record.review_count > 0 {
        let rating = record.avg_rating.unwrap_or_default();
        parts.push(format!("Rating: {rating:.1}/5 ({} reviews)", record.review_count));
    }
    parts.join(" | ")
}

/// `15000000.0` → `"15,000,000 VND"`.
pub fn format_vnd(amount: f64) -> String {
    format!("{} VND", group_thousands(amount))
}

fn group_thousands(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Records frozen at build time. Position `i` belongs to vector `i` of the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogSnapshot {
    records: Vec<ProductRecord>,
}

impl CatalogSnapshot {
    /// Validates every record and rejects duplicate identifiers. Order is kept.
    pub fn new(records: Vec<ProductRecord>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            record.validate()?;
            if !seen.insert(record.id) {
                return Err(CatalogError::DuplicateId(record.id));
            }
        }
        Ok(Self { records })
    }

    pub fn get(&self, position: usize) -> Option<&ProductRecord> {
        self.records.get(position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductRecord> {
        self.records.iter()
    }
}

/// Supplies the full, ordered product list in one bulk read.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load_products(&self) -> Result<Vec<ProductRecord>, CatalogError>;
}

/// Catalog exported as a JSON array of product rows.
#[derive(Debug, Clone)]
pub struct JsonCatalogSource {
    path: PathBuf,
}

impl JsonCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CatalogSource for JsonCatalogSource {
    async fn load_products(&self) -> Result<Vec<ProductRecord>, CatalogError> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| CatalogError::Read(self.path.clone(), e))?;
        serde_json::from_str(&raw).map_err(|e| CatalogError::Parse(self.path.clone(), e))
    }
}

/// A fixed list of records; handy for callers that already hold the rows.
#[async_trait]
impl CatalogSource for Vec<ProductRecord> {
    async fn load_products(&self) -> Result<Vec<ProductRecord>, CatalogError> {
        Ok(self.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("invalid catalog json in {0}: {1}")]
    Parse(PathBuf, serde_json::Error),
    #[error("duplicate product id {0}")]
    DuplicateId(i64),
    #[error("invalid product {id}: {reason}")]
    InvalidRecord { id: i64, reason: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    #[test]
    fn formats_prices_with_separators() {
        assert_eq!(format_vnd(15_000_000.0), "15,000,000 VND");
        assert_eq!(format_vnd(999.0), "999 VND");
        assert_eq!(format_vnd(1_000.0), "1,000 VND");
    }

    #[test]
    fn price_label_single_and_range() {
        let mut r = record(1, "Gold Ring", "Rings", 15_000_000.0);
        assert_eq!(r.price_label(), "15,000,000 VND");
        r.max_price = Some(18_200_000.0);
        assert_eq!(r.price_label(), "15,000,000 - 18,200,000 VND");
    }

    #[test]
    fn embedding_text_lists_fields_in_order() {
        let mut r = record(7, "Pearl Necklace", "Necklaces", 4_500_000.0);
        r.description = Some("Freshwater pearls".into());
        r.materials = vec!["Silver".into(), "Pearl".into()];
        r.review_count = 3;
        r.avg_rating = Some(4.67);
        assert_eq!(
            embedding_text(&r),
            "Product: Pearl Necklace | Category: Necklaces | Description: Freshwater pearls \
             | Price: 4,500,000 VND | Materials: Silver, Pearl | In stock | Rating: 4.7/5 (3 reviews)"
        );
    }

    #[test]
    fn snapshot_rejects_duplicates_and_bad_prices() {
        let a = record(1, "A", "Rings", 1.0);
        let b = record(1, "B", "Rings", 2.0);
        assert!(matches!(
            CatalogSnapshot::new(vec![a.clone(), b]),
            Err(CatalogError::DuplicateId(1))
        ));
        let mut bad = record(2, "C", "Rings", 5.0);
        bad.max_price = Some(1.0);
        assert!(matches!(
            CatalogSnapshot::new(vec![a, bad]),
            Err(CatalogError::InvalidRecord { id: 2, .. })
        ));
    }

    #[tokio::test]
    async fn json_source_reads_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "name": "Gold Ring", "category": "Rings", "min_price": 15000000,
                 "total_stock": 4, "materials": ["Gold 18K"]}]"#,
        )
        .unwrap();
        let rows = JsonCatalogSource::new(&path).load_products().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Gold Ring");
        assert_eq!(rows[0].price_range(), (15_000_000.0, 15_000_000.0));
        assert!(rows[0].description.is_none());
    }
}
