// src/models/category.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A registered question category. Questions refer to it by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    /// URL-safe identifier, e.g. "intelligence-artificielle".
    pub slug: String,
    pub description: Option<String>,
    /// Hex colour such as "#FF5733".
    pub color: Option<String>,
    pub display_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create and full-replace payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CategoryPayload {
    #[validate(custom(function = validate_name))]
    pub name: String,
    #[validate(custom(function = validate_slug))]
    pub slug: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(custom(function = validate_color))]
    pub color: Option<String>,
    #[validate(range(min = 0, max = 10000))]
    pub display_order: Option<i32>,
    pub is_active: Option<bool>,
}

fn validate_name(name: &str) -> Result<(), validator::ValidationError> {
    let len = name.trim().chars().count();
    if (1..=100).contains(&len) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("length")
            .with_message("Name length must be between 1 and 100 characters.".into()))
    }
}

/// Lowercase ASCII letters, digits and inner dashes.
fn validate_slug(slug: &str) -> Result<(), validator::ValidationError> {
    let well_formed = !slug.is_empty()
        && slug.len() <= 100
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if well_formed {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_slug")
            .with_message("Slug may only contain a-z, 0-9 and inner dashes.".into()))
    }
}

fn validate_color(color: &str) -> Result<(), validator::ValidationError> {
    match color.strip_prefix('#') {
        Some(hex) if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_color")
            .with_message("Colour must be a hex value like #FF5733.".into())),
    }
}

/// Category plus the number of active questions filed under it.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryResponse {
    #[serde(flatten)]
    pub category: Category,
    pub question_count: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryListParams {
    pub include_inactive: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(slug: &str, color: Option<&str>) -> CategoryPayload {
        CategoryPayload {
            name: "Intelligence artificielle".to_string(),
            slug: slug.to_string(),
            description: None,
            color: color.map(str::to_string),
            display_order: None,
            is_active: None,
        }
    }

    #[test]
    fn slugs_are_url_safe() {
        assert!(payload("intelligence-artificielle", None).validate().is_ok());
        assert!(payload("IA", None).validate().is_err());
        assert!(payload("-ia", None).validate().is_err());
        assert!(payload("r&d", None).validate().is_err());
    }

    #[test]
    fn colours_are_hex() {
        assert!(payload("ia", Some("#FF5733")).validate().is_ok());
        assert!(payload("ia", Some("FF5733")).validate().is_err());
        assert!(payload("ia", Some("#FF57")).validate().is_err());
    }
}
