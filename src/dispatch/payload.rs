use serde::Serialize;
use zeroize::Zeroizing;

/// Product names that already end in a plural-looking suffix.
pub const PLURAL_LOOKING_ITEMS: &[&str] = &[
    "Ülker Salty Pretzels",
    "Doğadan Sage 20s",
    "Capri-Sun Safari Fruits",
];

/// Wire payload for the stock decrease endpoint.
///
/// Serializes to `{"cashierId": .., "itemName": ..}`; the token travels in the
/// `Authorization` header only.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub cashier_id: i64,
    pub item_name: String,
    #[serde(skip_serializing)]
    pub auth_token: Zeroizing<String>,
}

impl NotificationRequest {
    pub fn new(cashier_id: i64, item_name: impl Into<String>, auth_token: &str) -> Self {
        Self {
            cashier_id,
            item_name: item_name.into(),
            auth_token: Zeroizing::new(auth_token.to_string()),
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.auth_token.as_str())
    }
}

impl std::fmt::Debug for NotificationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRequest")
            .field("cashier_id", &self.cashier_id)
            .field("item_name", &self.item_name)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// Crude singularization applied before dispatch.
///
/// Allow-listed names only lose a character when they end in `ss`, which none
/// of them do, so they pass through unchanged. Every other name loses its
/// final character unconditionally.
pub fn normalize_item_name(name: &str) -> String {
    if PLURAL_LOOKING_ITEMS.contains(&name) {
        if name.ends_with("ss") {
            return drop_last_char(name);
        }
        return name.to_string();
    }
    drop_last_char(name)
}

fn drop_last_char(name: &str) -> String {
    let mut chars = name.chars();
    chars.next_back();
    chars.as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_character_from_unlisted_names() {
        assert_eq!(normalize_item_name("Rexona Roll Ons"), "Rexona Roll On");
        assert_eq!(normalize_item_name("Flormar HC28 Urban Escapes"), "Flormar HC28 Urban Escape");
    }

    #[test]
    fn allow_listed_names_pass_through() {
        assert_eq!(
            normalize_item_name("Capri-Sun Safari Fruits"),
            "Capri-Sun Safari Fruits"
        );
        assert_eq!(normalize_item_name("Ülker Salty Pretzels"), "Ülker Salty Pretzels");
        assert_eq!(normalize_item_name("Doğadan Sage 20s"), "Doğadan Sage 20s");
    }

    #[test]
    fn handles_multibyte_and_empty_names() {
        assert_eq!(normalize_item_name("Çay ğ"), "Çay ");
        assert_eq!(normalize_item_name(""), "");
    }

    #[test]
    fn body_omits_token() {
        let req = NotificationRequest::new(42, "Rexona Roll On", "secret-token");
        let body = serde_json::to_value(&req).expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({"cashierId": 42, "itemName": "Rexona Roll On"})
        );
        assert_eq!(req.bearer(), "Bearer secret-token");
        assert!(!format!("{:?}", req).contains("secret-token"));
    }
}
