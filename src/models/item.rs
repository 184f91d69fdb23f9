use serde::{Deserialize, Serialize};

/// Gender value that matches every gender filter
pub const UNIVERSAL_GENDER: &str = "alle";

/// A catalog item that can be recommended
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub context: ItemContext,
    /// Precomputed embedding, same vector space as the tag embeddings
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Context attributes checked by the hard filters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemContext {
    #[serde(default)]
    pub gender: Option<String>,
    /// Age ranges the item is suitable for (e.g. "barn", "voksen")
    #[serde(default)]
    pub age: Vec<String>,
    pub price: f64,
}

impl Item {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl ItemContext {
    /// True if the item fits a recipient of the given gender
    pub fn fits_gender(&self, gender: &str) -> bool {
        match self.gender.as_deref() {
            Some(g) => g == gender || g == UNIVERSAL_GENDER,
            None => false,
        }
    }

    /// True if one of the declared age ranges matches
    pub fn fits_age(&self, age: &str) -> bool {
        self.age.iter().any(|a| a == age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_deserialization_defaults() {
        let json = r#"{
            "id": "p1",
            "name": "Fodbold",
            "context": { "gender": "alle", "price": 199.0 }
        }"#;

        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "p1");
        assert!(item.tags.is_empty());
        assert!(item.embedding.is_empty());
        assert!(item.context.age.is_empty());
        assert_eq!(item.context.price, 199.0);
    }

    #[test]
    fn test_fits_gender() {
        let context = ItemContext {
            gender: Some("kvinde".to_string()),
            age: vec![],
            price: 100.0,
        };
        assert!(context.fits_gender("kvinde"));
        assert!(!context.fits_gender("mand"));

        let universal = ItemContext {
            gender: Some(UNIVERSAL_GENDER.to_string()),
            ..context
        };
        assert!(universal.fits_gender("mand"));
    }
}
