use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(ItemId);
id_newtype!(UserId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
    #[serde(other)]
    Unknown,
}

/// Identity of the logged-in user as persisted next to the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub roles: BTreeSet<Role>,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// Inventory item snapshot as served by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub quantity: u32,
    #[serde(default, with = "timestamp")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, with = "timestamp")]
    pub updated_at: Option<NaiveDateTime>,
}

impl Item {
    pub fn is_available(&self) -> bool {
        self.quantity > 0
    }
}

/// Body of the create and update calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    pub category: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftPurpose {
    Create,
    Update,
}

impl ItemDraft {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        price: f64,
        quantity: u32,
    ) -> Self {
        Self {
            name: name.into().trim().to_string(),
            category: category.into().trim().to_string(),
            price,
            quantity,
        }
    }

    /// Form-side checks mirroring the server's create/update rules.
    pub fn validate(&self, purpose: DraftPurpose) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        check_label(&mut errors, "name", &self.name, 3);
        check_label(&mut errors, "category", &self.category, 2);

        if !self.price.is_finite() || self.price <= 0.0 {
            errors.insert("price", "Price must be greater than 0");
        }
        if purpose == DraftPurpose::Create && self.quantity < 1 {
            errors.insert("quantity", "Quantity must be at least 1");
        }

        errors.into_result()
    }
}

fn check_label(errors: &mut ValidationErrors, field: &'static str, value: &str, min_len: usize) {
    let value = value.trim();
    if value.is_empty() {
        errors.insert(field, format!("{} is required", capitalize(field)));
        return;
    }
    let len = value.chars().count();
    if len < min_len || len > 50 {
        errors.insert(
            field,
            format!(
                "{} must be between {min_len} and 50 characters",
                capitalize(field)
            ),
        );
        return;
    }
    if !value
        .chars()
        .all(|c| c.is_alphabetic() || c.is_whitespace() || matches!(c, '-' | '\'' | '&'))
    {
        errors.insert(
            field,
            format!(
                "{} must not contain numbers or special characters",
                capitalize(field)
            ),
        );
    }
}

fn capitalize(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Non-search list selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    #[default]
    All,
    Available,
    NotAvailable,
}

impl FilterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Available => "available",
            Self::NotAvailable => "not-available",
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "available" => Ok(Self::Available),
            "not-available" | "not_available" | "unavailable" => Ok(Self::NotAvailable),
            other => Err(format!(
                "unknown filter mode '{other}' (expected all, available or not-available)"
            )),
        }
    }
}

/// User-supplied search constraints. A predicate with every field blank is
/// treated as "no active search".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPredicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<String>,
}

impl SearchPredicate {
    pub fn by_category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, value)| value.is_none())
    }

    /// Trims every field and drops the blank ones. Returns `None` when
    /// nothing is left.
    pub fn normalized(&self) -> Option<Self> {
        let trimmed = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let normalized = Self {
            name: trimmed(&self.name),
            category: trimmed(&self.category),
            min_price: trimmed(&self.min_price),
            max_price: trimmed(&self.max_price),
        };
        (!normalized.is_empty()).then_some(normalized)
    }

    /// Query-string pairs for the non-empty fields, keyed by wire name.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        self.fields()
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| (key, v.to_string()))
            })
            .collect()
    }

    fn fields(&self) -> [(&'static str, Option<&str>); 4] {
        [
            ("name", non_blank(&self.name)),
            ("category", non_blank(&self.category)),
            ("minPrice", non_blank(&self.min_price)),
            ("maxPrice", non_blank(&self.max_price)),
        ]
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(WIRE_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        NaiveDateTime::parse_from_str(&raw, WIRE_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(&raw, ISO_FORMAT))
            .map(Some)
            .map_err(|err| de::Error::custom(format!("invalid timestamp '{raw}': {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_item_with_wire_timestamps() {
        let item: Item = serde_json::from_str(
            r#"{
                "id": "059fb0f7-99cd-4aac-bb34-baa7c9fc3032",
                "name": "Jalebi",
                "category": "Milk",
                "price": 130.07,
                "quantity": 635,
                "createdAt": "2024-10-18 11:08:23",
                "updatedAt": "2025-07-17T07:14:10.125"
            }"#,
        )
        .expect("item");
        assert_eq!(item.id.as_str(), "059fb0f7-99cd-4aac-bb34-baa7c9fc3032");
        assert_eq!(item.quantity, 635);
        assert!(item.created_at.is_some());
        assert!(item.updated_at.is_some());
        assert!(item.is_available());
    }

    #[test]
    fn item_timestamps_are_optional() {
        let item: Item = serde_json::from_str(
            r#"{"id":"x","name":"Barfi","category":"Milk","price":10.0,"quantity":0}"#,
        )
        .expect("item");
        assert_eq!(item.created_at, None);
        assert!(!item.is_available());
    }

    #[test]
    fn unknown_roles_do_not_break_identity_decoding() {
        let user: SessionUser = serde_json::from_str(
            r#"{"userId":"u-1","username":"alice","roles":["ADMIN","AUDITOR"]}"#,
        )
        .expect("user");
        assert!(user.is_admin());
        assert!(user.roles.contains(&Role::Unknown));
    }

    #[test]
    fn blank_predicate_normalizes_to_none() {
        let predicate = SearchPredicate {
            name: Some("   ".into()),
            category: Some(String::new()),
            min_price: None,
            max_price: Some("\t".into()),
        };
        assert!(predicate.is_empty());
        assert_eq!(predicate.normalized(), None);
    }

    #[test]
    fn predicate_query_uses_wire_names_and_trims() {
        let predicate = SearchPredicate {
            name: Some("  Cake ".into()),
            category: None,
            min_price: Some("200".into()),
            max_price: Some(" ".into()),
        };
        let normalized = predicate.normalized().expect("non-empty");
        assert_eq!(normalized.name.as_deref(), Some("Cake"));
        assert_eq!(normalized.max_price, None);
        assert_eq!(
            normalized.query_pairs(),
            vec![("name", "Cake".to_string()), ("minPrice", "200".to_string())]
        );
    }

    #[test]
    fn filter_mode_parses_cli_spellings() {
        assert_eq!("available".parse::<FilterMode>(), Ok(FilterMode::Available));
        assert_eq!(
            "Not-Available".parse::<FilterMode>(),
            Ok(FilterMode::NotAvailable)
        );
        assert!("sold".parse::<FilterMode>().is_err());
    }

    #[test]
    fn draft_validation_reports_each_field() {
        let draft = ItemDraft::new("K2", "", 0.0, 0);
        let errors = draft
            .validate(DraftPurpose::Create)
            .expect_err("invalid draft");
        assert!(errors.get("name").is_some());
        assert_eq!(errors.get("category"), Some("Category is required"));
        assert_eq!(errors.get("price"), Some("Price must be greater than 0"));
        assert_eq!(errors.get("quantity"), Some("Quantity must be at least 1"));
    }

    #[test]
    fn update_drafts_accept_zero_quantity() {
        let draft = ItemDraft::new(" Gulab Jamun ", "Festival", 45.5, 0);
        assert_eq!(draft.name, "Gulab Jamun");
        draft.validate(DraftPurpose::Update).expect("valid update");
        assert!(draft.validate(DraftPurpose::Create).is_err());
    }
}
